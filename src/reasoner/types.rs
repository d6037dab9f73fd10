use serde::{Deserialize, Serialize};

use crate::types::clamp_unit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonerName {
    Viability,
    Timing,
    Fatigue,
    Risk,
    Counterfactual,
}

impl ReasonerName {
    pub const ALL: [ReasonerName; 5] = [
        ReasonerName::Viability,
        ReasonerName::Timing,
        ReasonerName::Fatigue,
        ReasonerName::Risk,
        ReasonerName::Counterfactual,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Viability => "viability",
            Self::Timing => "timing",
            Self::Fatigue => "fatigue",
            Self::Risk => "risk",
            Self::Counterfactual => "counterfactual",
        }
    }
}

impl std::fmt::Display for ReasonerName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViabilitySignal {
    /// Relative viability in [0,1]; only meaningful next to the other dimensions.
    pub score: f64,
    #[serde(default)]
    pub supporting: Vec<String>,
    #[serde(default)]
    pub opposing: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingWindow {
    pub weekday: String,
    pub hour_utc: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingSignal {
    pub best_window: PostingWindow,
    #[serde(default)]
    pub alternatives: Vec<PostingWindow>,
    pub sample_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FatigueLevel {
    Fresh,
    Moderate,
    Saturated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FatigueSignal {
    pub level: FatigueLevel,
    pub similar_recent_posts: u32,
    #[serde(default)]
    pub days_since_topic: Option<i64>,
    pub weekly_load: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskBand {
    pub level: RiskLevel,
    #[serde(default)]
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterfactualOption {
    pub label: String,
    /// Outlook relative to the baseline, in [-1,1].
    pub relative_outlook: f64,
    pub tradeoff: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterfactualComparison {
    pub baseline: String,
    pub alternatives: Vec<CounterfactualOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Signal {
    Viability(ViabilitySignal),
    Timing(TimingSignal),
    Fatigue(FatigueSignal),
    Risk(RiskBand),
    Counterfactual(CounterfactualComparison),
    InsufficientData,
}

impl Signal {
    /// The reasoner a concrete signal belongs to; `None` for `InsufficientData`.
    pub fn owner(&self) -> Option<ReasonerName> {
        match self {
            Self::Viability(_) => Some(ReasonerName::Viability),
            Self::Timing(_) => Some(ReasonerName::Timing),
            Self::Fatigue(_) => Some(ReasonerName::Fatigue),
            Self::Risk(_) => Some(ReasonerName::Risk),
            Self::Counterfactual(_) => Some(ReasonerName::Counterfactual),
            Self::InsufficientData => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputOrigin {
    Evaluated,
    TimedOut,
    Failed,
    Disabled,
}

impl OutputOrigin {
    pub fn is_degraded(self) -> bool {
        matches!(self, Self::TimedOut | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasonerOutput {
    pub reasoner_name: ReasonerName,
    pub signal: Signal,
    pub confidence: f64,
    pub unknown: bool,
    pub origin: OutputOrigin,
}

impl ReasonerOutput {
    /// Wraps an evaluated signal, downgrading it to `InsufficientData` when the
    /// confidence is below `floor`.
    pub fn from_estimate(name: ReasonerName, signal: Signal, confidence: f64, floor: f64) -> Self {
        Self {
            reasoner_name: name,
            signal,
            confidence: clamp_unit(confidence),
            unknown: false,
            origin: OutputOrigin::Evaluated,
        }
        .enforce_floor(floor)
    }

    pub fn insufficient(name: ReasonerName, confidence: f64) -> Self {
        Self {
            reasoner_name: name,
            signal: Signal::InsufficientData,
            confidence: clamp_unit(confidence),
            unknown: true,
            origin: OutputOrigin::Evaluated,
        }
    }

    /// Placeholder for a reasoner that produced nothing usable.
    pub fn synthetic(name: ReasonerName, origin: OutputOrigin) -> Self {
        Self {
            reasoner_name: name,
            signal: Signal::InsufficientData,
            confidence: 0.0,
            unknown: true,
            origin,
        }
    }

    pub fn enforce_floor(mut self, floor: f64) -> Self {
        self.confidence = clamp_unit(self.confidence);
        if self.confidence < floor || matches!(self.signal, Signal::InsufficientData) {
            self.signal = Signal::InsufficientData;
            self.unknown = true;
        } else if self.unknown {
            self.signal = Signal::InsufficientData;
        }
        self
    }
}
