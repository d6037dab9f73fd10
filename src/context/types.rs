use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::CreatorId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthStage {
    Emerging,
    Growing,
    Established,
    Plateau,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentitySnapshot {
    pub creator_id: CreatorId,
    #[serde(default)]
    pub platforms: Vec<String>,
    #[serde(default)]
    pub formats: Vec<String>,
    /// Posts per week the creator habitually publishes.
    #[serde(default)]
    pub cadence_per_week: f64,
    #[serde(default)]
    pub topic_clusters: Vec<String>,
    #[serde(default)]
    pub tone: Option<String>,
    pub growth_stage: GrowthStage,
}

impl IdentitySnapshot {
    pub fn covers_topic(&self, topic: &str) -> bool {
        self.topic_clusters
            .iter()
            .any(|cluster| cluster.eq_ignore_ascii_case(topic))
    }

    pub fn uses_format(&self, format: &str) -> bool {
        self.formats.iter().any(|known| known.eq_ignore_ascii_case(format))
    }
}

/// Identity graph answer: the snapshot plus how sure the graph is about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub snapshot: IdentitySnapshot,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SoftConstraint {
    AvoidTopic { topic: String, weight: f64 },
    PreferTopic { topic: String, weight: f64 },
    AvoidFormat { format: String, weight: f64 },
    PreferFormat { format: String, weight: f64 },
    MaxPostsPerWeek { limit: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    /// Normalized engagement in [0,1] when the outcome is known.
    #[serde(default)]
    pub engagement: Option<f64>,
    #[serde(default)]
    pub note: Option<String>,
}

impl MemoryRecord {
    pub fn matches_topic(&self, topic: &str) -> bool {
        self.topic
            .as_deref()
            .is_some_and(|known| known.eq_ignore_ascii_case(topic))
    }

    pub fn matches_format(&self, format: &str) -> bool {
        self.format
            .as_deref()
            .is_some_and(|known| known.eq_ignore_ascii_case(format))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextWindow {
    pub lookback_days: u32,
    pub max_records: usize,
}

impl Default for ContextWindow {
    fn default() -> Self {
        Self {
            lookback_days: 90,
            max_records: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatorContext {
    pub identity_snapshot: IdentitySnapshot,
    pub confidence: f64,
    pub preference_modifiers: Vec<SoftConstraint>,
    pub memory_slices: Vec<MemoryRecord>,
    pub partial: bool,
    #[serde(default)]
    pub missing_sources: Vec<ContextSource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextSource {
    IdentityGraph,
    PreferenceEngine,
    MemoryService,
}

impl ContextSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IdentityGraph => "identity_graph",
            Self::PreferenceEngine => "preference_engine",
            Self::MemoryService => "memory_service",
        }
    }
}
