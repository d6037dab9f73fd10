use serde::{Deserialize, Serialize};

use crate::{
    orchestrator::DecisionBundle,
    types::{CorrelationId, RequestId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateStage {
    Strategy,
    Generation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDecision {
    pub stage: GateStage,
    pub allowed: bool,
    pub reason: String,
}

impl GateDecision {
    fn allow(stage: GateStage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            allowed: true,
            reason: reason.into(),
        }
    }

    fn deny(stage: GateStage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            allowed: false,
            reason: reason.into(),
        }
    }
}

/// Output of the external strategy stage, registered so generation can be gated on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyArtifact {
    pub request_id: RequestId,
    pub correlation_id: CorrelationId,
    pub label: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Stateless contract checks in front of the strategy and generation stages.
#[derive(Debug, Clone, Copy, Default)]
pub struct GateEnforcer {
    degradation_tolerance: usize,
}

impl GateEnforcer {
    pub fn new(degradation_tolerance: usize) -> Self {
        Self {
            degradation_tolerance,
        }
    }

    pub fn check(
        &self,
        stage: GateStage,
        request_id: &str,
        bundle: Option<&DecisionBundle>,
        strategy: Option<&StrategyArtifact>,
    ) -> GateDecision {
        let strategy_gate = self.check_strategy(request_id, bundle);
        match stage {
            GateStage::Strategy => strategy_gate,
            GateStage::Generation => {
                if !strategy_gate.allowed {
                    return GateDecision::deny(GateStage::Generation, strategy_gate.reason);
                }
                match strategy {
                    None => GateDecision::deny(
                        GateStage::Generation,
                        format!("no strategy artifact recorded for request {request_id}"),
                    ),
                    Some(artifact) if artifact.request_id != request_id => GateDecision::deny(
                        GateStage::Generation,
                        format!(
                            "strategy artifact belongs to request {}, not {request_id}",
                            artifact.request_id
                        ),
                    ),
                    Some(artifact) => GateDecision::allow(
                        GateStage::Generation,
                        format!("decision context and strategy '{}' present", artifact.label),
                    ),
                }
            }
        }
    }

    fn check_strategy(&self, request_id: &str, bundle: Option<&DecisionBundle>) -> GateDecision {
        let Some(bundle) = bundle else {
            return GateDecision::deny(
                GateStage::Strategy,
                format!("no decision bundle exists for request {request_id}"),
            );
        };
        if bundle.request_id != request_id {
            return GateDecision::deny(
                GateStage::Strategy,
                format!(
                    "decision bundle belongs to request {}, not {request_id}",
                    bundle.request_id
                ),
            );
        }

        let degraded = bundle.degraded_reasoners();
        if degraded.len() > self.degradation_tolerance {
            let names: Vec<&str> = degraded.iter().map(|name| name.as_str()).collect();
            return GateDecision::deny(
                GateStage::Strategy,
                format!(
                    "decision bundle is degraded ({}) beyond tolerance {}",
                    names.join(", "),
                    self.degradation_tolerance
                ),
            );
        }

        GateDecision::allow(GateStage::Strategy, "decision bundle present")
    }
}
