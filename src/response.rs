//! Renders a [`DecisionBundle`] into the comparative answer handed back to the
//! caller. Every dimension keeps its own explanation and confidence; nothing
//! here folds them into one score or verdict.

use serde::{Deserialize, Serialize};

use crate::{
    orchestrator::DecisionBundle,
    reasoner::types::{
        CounterfactualOption, FatigueLevel, OutputOrigin, ReasonerName, ReasonerOutput, RiskLevel,
        Signal,
    },
    types::{CorrelationId, RequestId},
};

const CORE_DIMENSIONS: [ReasonerName; 4] = [
    ReasonerName::Viability,
    ReasonerName::Timing,
    ReasonerName::Fatigue,
    ReasonerName::Risk,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLabel {
    Low,
    Medium,
    High,
    Unknown,
}

impl RiskLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AssembleOptions {
    #[serde(default)]
    pub include_counterfactual: bool,
    #[serde(default)]
    pub detailed_explanations: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionView {
    pub dimension: ReasonerName,
    pub explanation: String,
    pub confidence: f64,
    pub unknown: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterfactualView {
    pub explanation: String,
    pub confidence: f64,
    pub unknown: bool,
    #[serde(default)]
    pub baseline: Option<String>,
    #[serde(default)]
    pub alternatives: Vec<CounterfactualOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparativeResponse {
    pub request_id: RequestId,
    pub correlation_id: CorrelationId,
    pub dimensions: Vec<DimensionView>,
    pub risk: RiskLabel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterfactual: Option<CounterfactualView>,
    pub degraded: bool,
    pub context_partial: bool,
    #[serde(default)]
    pub caveats: Vec<String>,
}

pub fn assemble(bundle: &DecisionBundle, options: AssembleOptions) -> ComparativeResponse {
    let dimensions = CORE_DIMENSIONS
        .into_iter()
        .map(|name| match bundle.output(name) {
            Some(output) => DimensionView {
                dimension: name,
                explanation: explain(output, options.detailed_explanations),
                confidence: output.confidence,
                unknown: output.unknown,
            },
            None => DimensionView {
                dimension: name,
                explanation: format!("no {name} assessment was produced"),
                confidence: 0.0,
                unknown: true,
            },
        })
        .collect();

    let counterfactual = options
        .include_counterfactual
        .then(|| counterfactual_view(bundle.output(ReasonerName::Counterfactual), options));

    let mut caveats = Vec::new();
    if bundle.context_partial {
        caveats.push(
            "creator context was only partially available; confidence is reduced".to_string(),
        );
    }
    for name in bundle.degraded_reasoners() {
        caveats.push(format!("{name} fell back to a placeholder for this request"));
    }

    ComparativeResponse {
        request_id: bundle.request_id.clone(),
        correlation_id: bundle.correlation_id.clone(),
        dimensions,
        risk: risk_label(bundle.output(ReasonerName::Risk)),
        counterfactual,
        degraded: bundle.degraded,
        context_partial: bundle.context_partial,
        caveats,
    }
}

pub fn risk_label(output: Option<&ReasonerOutput>) -> RiskLabel {
    let Some(output) = output.filter(|output| !output.unknown) else {
        return RiskLabel::Unknown;
    };
    match &output.signal {
        Signal::Risk(band) => match band.level {
            RiskLevel::Low => RiskLabel::Low,
            RiskLevel::Medium => RiskLabel::Medium,
            RiskLevel::High => RiskLabel::High,
        },
        _ => RiskLabel::Unknown,
    }
}

fn explain(output: &ReasonerOutput, detailed: bool) -> String {
    let name = output.reasoner_name;
    match &output.signal {
        Signal::InsufficientData => match output.origin {
            OutputOrigin::TimedOut => format!("{name} did not answer in time; treat as unknown"),
            OutputOrigin::Failed => format!("{name} failed for this request; treat as unknown"),
            OutputOrigin::Disabled => format!("{name} is switched off"),
            OutputOrigin::Evaluated => {
                format!("not enough evidence to assess {name}")
            }
        },
        Signal::Viability(signal) => {
            let strength = if signal.score >= 0.65 {
                "strong"
            } else if signal.score >= 0.45 {
                "moderate"
            } else {
                "weak"
            };
            let mut text = format!("{strength} fit with the creator's audience and history");
            if detailed {
                append_list(&mut text, "in favour", &signal.supporting);
                append_list(&mut text, "against", &signal.opposing);
            }
            text
        }
        Signal::Timing(signal) => {
            let mut text = format!(
                "historically strongest slot is {} around {:02}:00 UTC",
                signal.best_window.weekday, signal.best_window.hour_utc
            );
            if detailed {
                let alternatives: Vec<String> = signal
                    .alternatives
                    .iter()
                    .map(|window| format!("{} {:02}:00", window.weekday, window.hour_utc))
                    .collect();
                append_list(&mut text, "also good", &alternatives);
                text.push_str(&format!(" (based on {} posts)", signal.sample_size));
            }
            text
        }
        Signal::Fatigue(signal) => {
            let level = match signal.level {
                FatigueLevel::Fresh => "audience is fresh for this content",
                FatigueLevel::Moderate => "some audience fatigue on this content",
                FatigueLevel::Saturated => "audience looks saturated on this content",
            };
            let mut text = level.to_string();
            if detailed {
                text.push_str(&format!(
                    "; {} similar posts in the last two weeks, {} posts this week",
                    signal.similar_recent_posts, signal.weekly_load
                ));
                if let Some(days) = signal.days_since_topic {
                    text.push_str(&format!(", last similar post {days} days ago"));
                }
            }
            text
        }
        Signal::Risk(band) => {
            let label = risk_label(Some(output));
            let mut text = format!("risk band {}", label.as_str());
            if detailed {
                append_list(&mut text, "flags", &band.flags);
            } else if !band.flags.is_empty() {
                text.push_str(&format!(" ({} flag(s))", band.flags.len()));
            }
            text
        }
        Signal::Counterfactual(comparison) => format!(
            "{} alternative(s) compared against '{}'",
            comparison.alternatives.len(),
            comparison.baseline
        ),
    }
}

fn counterfactual_view(
    output: Option<&ReasonerOutput>,
    options: AssembleOptions,
) -> CounterfactualView {
    match output {
        Some(output) => {
            let (baseline, alternatives) = match &output.signal {
                Signal::Counterfactual(comparison) => (
                    Some(comparison.baseline.clone()),
                    comparison.alternatives.clone(),
                ),
                _ => (None, Vec::new()),
            };
            CounterfactualView {
                explanation: explain(output, options.detailed_explanations),
                confidence: output.confidence,
                unknown: output.unknown,
                baseline,
                alternatives,
            }
        }
        None => CounterfactualView {
            explanation: "no counterfactual comparison was produced".to_string(),
            confidence: 0.0,
            unknown: true,
            baseline: None,
            alternatives: Vec::new(),
        },
    }
}

fn append_list(text: &mut String, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    text.push_str(&format!("; {heading}: {}", items.join(", ")));
}
