use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    context::ContextWindow,
    reasoner::types::{ReasonerName, ReasonerOutput},
    types::{CorrelationId, CreatorId, IntentType, RequestId},
};

fn default_reasoner_timeout_ms() -> u64 {
    2_000
}

fn default_context_fetch_timeout_ms() -> u64 {
    2_000
}

fn default_confidence_floor() -> f64 {
    0.4
}

fn default_max_concurrency() -> usize {
    5
}

fn default_degradation_factor() -> f64 {
    0.7
}

fn default_memory_lookback_days() -> u32 {
    90
}

fn default_memory_max_records() -> usize {
    200
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_reasoner_timeout_ms")]
    pub reasoner_timeout_ms: u64,
    #[serde(default = "default_context_fetch_timeout_ms")]
    pub context_fetch_timeout_ms: u64,
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Confidence multiplier applied once per optional context source that failed.
    #[serde(default = "default_degradation_factor")]
    pub degradation_factor: f64,
    /// How many degraded reasoners a bundle may carry and still pass the gates.
    #[serde(default)]
    pub degradation_tolerance: usize,
    #[serde(default = "default_memory_lookback_days")]
    pub memory_lookback_days: u32,
    #[serde(default = "default_memory_max_records")]
    pub memory_max_records: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            reasoner_timeout_ms: default_reasoner_timeout_ms(),
            context_fetch_timeout_ms: default_context_fetch_timeout_ms(),
            confidence_floor: default_confidence_floor(),
            max_concurrency: default_max_concurrency(),
            degradation_factor: default_degradation_factor(),
            degradation_tolerance: 0,
            memory_lookback_days: default_memory_lookback_days(),
            memory_max_records: default_memory_max_records(),
        }
    }
}

impl OrchestratorConfig {
    pub fn memory_window(&self) -> ContextWindow {
        ContextWindow {
            lookback_days: self.memory_lookback_days,
            max_records: self.memory_max_records,
        }
    }
}

/// The merged result of one orchestration. Built once and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionBundle {
    pub request_id: RequestId,
    pub correlation_id: CorrelationId,
    pub creator_id: CreatorId,
    pub intent_type: IntentType,
    pub outputs: BTreeMap<ReasonerName, ReasonerOutput>,
    pub degraded: bool,
    pub context_partial: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
}

impl DecisionBundle {
    pub fn output(&self, name: ReasonerName) -> Option<&ReasonerOutput> {
        self.outputs.get(&name)
    }

    /// Reasoners whose slot holds a timeout or failure placeholder.
    pub fn degraded_reasoners(&self) -> Vec<ReasonerName> {
        self.outputs
            .iter()
            .filter(|(_, output)| output.origin.is_degraded())
            .map(|(name, _)| *name)
            .collect()
    }

    /// Equality that ignores `generated_at`.
    pub fn same_outcome(&self, other: &DecisionBundle) -> bool {
        self.request_id == other.request_id
            && self.correlation_id == other.correlation_id
            && self.creator_id == other.creator_id
            && self.intent_type == other.intent_type
            && self.outputs == other.outputs
            && self.degraded == other.degraded
            && self.context_partial == other.context_partial
    }
}
