use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};

use crate::{gate::StrategyArtifact, orchestrator::DecisionBundle, types::RequestId};

fn default_ledger_capacity() -> usize {
    1_024
}

fn default_ledger_ttl_ms() -> u64 {
    3_600_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_capacity")]
    pub capacity: usize,
    #[serde(default = "default_ledger_ttl_ms")]
    pub ttl_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            capacity: default_ledger_capacity(),
            ttl_ms: default_ledger_ttl_ms(),
        }
    }
}

#[derive(Debug)]
struct LedgerEntry {
    seq: u64,
    stored_at: Instant,
    bundle: Arc<DecisionBundle>,
    strategy: Option<Arc<StrategyArtifact>>,
}

#[derive(Debug, Default)]
struct LedgerState {
    entries: HashMap<RequestId, LedgerEntry>,
    by_age: BTreeMap<u64, RequestId>,
    next_seq: u64,
}

impl LedgerState {
    fn remove(&mut self, request_id: &str) -> Option<LedgerEntry> {
        let entry = self.entries.remove(request_id)?;
        self.by_age.remove(&entry.seq);
        Some(entry)
    }
}

/// Bounded, expiring store of the bundles and strategy artifacts the gates
/// consult. A strategy artifact lives and dies with its bundle.
#[derive(Debug)]
pub struct DecisionLedger {
    capacity: usize,
    ttl: Duration,
    state: Mutex<LedgerState>,
}

impl DecisionLedger {
    pub fn new(config: &LedgerConfig) -> Self {
        Self {
            capacity: config.capacity.max(1),
            ttl: Duration::from_millis(config.ttl_ms.max(1)),
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub fn record_bundle(&self, bundle: DecisionBundle) -> Arc<DecisionBundle> {
        self.record_bundle_at(bundle, Instant::now())
    }

    pub fn bundle(&self, request_id: &str) -> Option<Arc<DecisionBundle>> {
        self.bundle_at(request_id, Instant::now())
    }

    /// Attaches a strategy artifact to the bundle of the same request. Returns
    /// `false` when no live bundle exists for it.
    pub fn record_strategy(&self, artifact: StrategyArtifact) -> bool {
        self.record_strategy_at(artifact, Instant::now())
    }

    pub fn strategy(&self, request_id: &str) -> Option<Arc<StrategyArtifact>> {
        self.strategy_at(request_id, Instant::now())
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn record_bundle_at(&self, bundle: DecisionBundle, now: Instant) -> Arc<DecisionBundle> {
        let bundle = Arc::new(bundle);
        let mut state = self.lock();
        self.purge_expired(&mut state, now);

        let request_id = bundle.request_id.clone();
        state.remove(&request_id);
        let seq = state.next_seq;
        state.next_seq += 1;
        state.by_age.insert(seq, request_id.clone());
        state.entries.insert(
            request_id,
            LedgerEntry {
                seq,
                stored_at: now,
                bundle: Arc::clone(&bundle),
                strategy: None,
            },
        );

        while state.entries.len() > self.capacity {
            let Some((_, oldest)) = state.by_age.pop_first() else {
                break;
            };
            state.entries.remove(&oldest);
            tracing::debug!(
                target: "ledger",
                request_id = %oldest,
                "ledger_entry_evicted"
            );
        }

        bundle
    }

    fn bundle_at(&self, request_id: &str, now: Instant) -> Option<Arc<DecisionBundle>> {
        let mut state = self.lock();
        self.purge_expired(&mut state, now);
        state
            .entries
            .get(request_id)
            .map(|entry| Arc::clone(&entry.bundle))
    }

    fn record_strategy_at(&self, artifact: StrategyArtifact, now: Instant) -> bool {
        let mut state = self.lock();
        self.purge_expired(&mut state, now);
        match state.entries.get_mut(&artifact.request_id) {
            Some(entry) => {
                entry.strategy = Some(Arc::new(artifact));
                true
            }
            None => false,
        }
    }

    fn strategy_at(&self, request_id: &str, now: Instant) -> Option<Arc<StrategyArtifact>> {
        let mut state = self.lock();
        self.purge_expired(&mut state, now);
        state
            .entries
            .get(request_id)
            .and_then(|entry| entry.strategy.clone())
    }

    fn purge_expired(&self, state: &mut LedgerState, now: Instant) {
        let expired: Vec<RequestId> = state
            .entries
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.stored_at) >= self.ttl)
            .map(|(request_id, _)| request_id.clone())
            .collect();
        for request_id in expired {
            state.remove(&request_id);
            tracing::debug!(
                target: "ledger",
                request_id = %request_id,
                "ledger_entry_expired"
            );
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
