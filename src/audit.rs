use std::{
    collections::{BTreeMap, VecDeque},
    sync::Mutex,
};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use crate::{
    orchestrator::DecisionBundle,
    reasoner::types::{OutputOrigin, ReasonerName},
    types::{CorrelationId, CreatorId, IntentType, RequestId},
};

const GENESIS_HASH: &str = "genesis";

fn default_audit_capacity() -> usize {
    10_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_audit_capacity")]
    pub capacity: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            capacity: default_audit_capacity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSummary {
    pub confidence: f64,
    pub unknown: bool,
    pub origin: OutputOrigin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub audit_id: String,
    pub sequence: u64,
    pub request_id: RequestId,
    pub correlation_id: CorrelationId,
    pub creator_id: CreatorId,
    pub intent_type: IntentType,
    pub outputs: BTreeMap<ReasonerName, OutputSummary>,
    pub degraded: bool,
    pub context_partial: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
    pub previous_hash: String,
    pub hash: String,
}

impl AuditRecord {
    fn content_hash(&self) -> String {
        let canonical = serde_json::json!({
            "audit_id": self.audit_id,
            "sequence": self.sequence,
            "request_id": self.request_id,
            "correlation_id": self.correlation_id,
            "creator_id": self.creator_id,
            "intent_type": self.intent_type,
            "outputs": self.outputs,
            "degraded": self.degraded,
            "context_partial": self.context_partial,
            "recorded_at": self.recorded_at.unix_timestamp_nanos().to_string(),
            "previous_hash": self.previous_hash,
        });
        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Answer to "why did the system produce this bundle".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTrace {
    pub record: AuditRecord,
    pub hash_valid: bool,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("audit chain broken at sequence {sequence}: {detail}")]
pub struct AuditChainBroken {
    pub sequence: u64,
    pub detail: String,
}

#[derive(Debug)]
struct TrailState {
    records: VecDeque<AuditRecord>,
    /// Hash of the newest record evicted by the capacity bound.
    anchor_hash: String,
    next_sequence: u64,
}

/// Append-only, hash-chained record of completed orchestrations. The oldest
/// records are evicted past `capacity`; the chain stays verifiable from the
/// last evicted hash.
#[derive(Debug)]
pub struct AuditTrail {
    capacity: usize,
    state: Mutex<TrailState>,
}

impl AuditTrail {
    pub fn new(config: &AuditConfig) -> Self {
        Self {
            capacity: config.capacity.max(1),
            state: Mutex::new(TrailState {
                records: VecDeque::new(),
                anchor_hash: GENESIS_HASH.to_string(),
                next_sequence: 1,
            }),
        }
    }

    pub fn append(&self, bundle: &DecisionBundle) -> AuditRecord {
        let mut state = self.lock();
        let previous_hash = state
            .records
            .back()
            .map(|record| record.hash.clone())
            .unwrap_or_else(|| state.anchor_hash.clone());
        let sequence = state.next_sequence;
        state.next_sequence += 1;

        let mut record = AuditRecord {
            audit_id: format!("aud:{}", uuid::Uuid::now_v7()),
            sequence,
            request_id: bundle.request_id.clone(),
            correlation_id: bundle.correlation_id.clone(),
            creator_id: bundle.creator_id.clone(),
            intent_type: bundle.intent_type,
            outputs: bundle
                .outputs
                .iter()
                .map(|(name, output)| {
                    (
                        *name,
                        OutputSummary {
                            confidence: output.confidence,
                            unknown: output.unknown,
                            origin: output.origin,
                        },
                    )
                })
                .collect(),
            degraded: bundle.degraded,
            context_partial: bundle.context_partial,
            recorded_at: OffsetDateTime::now_utc(),
            previous_hash,
            hash: String::new(),
        };
        record.hash = record.content_hash();

        state.records.push_back(record.clone());
        while state.records.len() > self.capacity {
            if let Some(evicted) = state.records.pop_front() {
                state.anchor_hash = evicted.hash;
            }
        }

        tracing::debug!(
            target: "audit",
            audit_id = %record.audit_id,
            request_id = %record.request_id,
            correlation_id = %record.correlation_id,
            sequence = record.sequence,
            "audit_record_appended"
        );
        record
    }

    pub fn get(&self, audit_id: &str) -> Option<AuditRecord> {
        self.lock()
            .records
            .iter()
            .find(|record| record.audit_id == audit_id)
            .cloned()
    }

    pub fn find_by_request(&self, request_id: &str) -> Option<AuditRecord> {
        self.lock()
            .records
            .iter()
            .rev()
            .find(|record| record.request_id == request_id)
            .cloned()
    }

    /// Newest first.
    pub fn query_by_creator(&self, creator_id: &str, limit: usize) -> Vec<AuditRecord> {
        self.lock()
            .records
            .iter()
            .rev()
            .filter(|record| record.creator_id == creator_id)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn reconstruct(&self, audit_id: &str) -> Option<DecisionTrace> {
        let record = self.get(audit_id)?;
        let hash_valid = record.content_hash() == record.hash;

        let mut reasons = Vec::new();
        reasons.push(format!(
            "{:?} request {} for creator {} (correlation {})",
            record.intent_type, record.request_id, record.creator_id, record.correlation_id
        ));
        if record.context_partial {
            reasons.push(
                "creator context was partial; confidences were reduced accordingly".to_string(),
            );
        }
        for (name, summary) in &record.outputs {
            let line = match summary.origin {
                OutputOrigin::TimedOut => format!("{name}: timed out, placeholder used"),
                OutputOrigin::Failed => format!("{name}: failed, placeholder used"),
                OutputOrigin::Disabled => format!("{name}: disabled by feature flag"),
                OutputOrigin::Evaluated if summary.unknown => format!(
                    "{name}: evaluated, confidence {:.2} below floor, reported as unknown",
                    summary.confidence
                ),
                OutputOrigin::Evaluated => {
                    format!("{name}: evaluated with confidence {:.2}", summary.confidence)
                }
            };
            reasons.push(line);
        }
        if record.degraded {
            reasons.push("bundle marked degraded".to_string());
        }

        Some(DecisionTrace {
            record,
            hash_valid,
            reasons,
        })
    }

    pub fn verify_chain(&self) -> Result<(), AuditChainBroken> {
        let state = self.lock();
        let mut expected_previous = state.anchor_hash.as_str();
        for record in &state.records {
            if record.previous_hash != expected_previous {
                return Err(AuditChainBroken {
                    sequence: record.sequence,
                    detail: "previous hash does not match predecessor".to_string(),
                });
            }
            if record.content_hash() != record.hash {
                return Err(AuditChainBroken {
                    sequence: record.sequence,
                    detail: "content hash mismatch".to_string(),
                });
            }
            expected_previous = record.hash.as_str();
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrailState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[cfg(test)]
    fn tamper(&self, index: usize, degraded: bool) {
        if let Some(record) = self.lock().records.get_mut(index) {
            record.degraded = degraded;
        }
    }
}
