use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};

fn default_breaker_failure_threshold() -> u32 {
    5
}

fn default_breaker_open_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityConfig {
    #[serde(default = "default_breaker_failure_threshold")]
    pub breaker_failure_threshold: u32,
    #[serde(default = "default_breaker_open_ms")]
    pub breaker_open_ms: u64,
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            breaker_failure_threshold: default_breaker_failure_threshold(),
            breaker_open_ms: default_breaker_open_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerPhase {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("circuit breaker is open for '{dependency}'")]
pub struct CircuitOpen {
    pub dependency: String,
}

/// Per-dependency circuit breakers shared by every outbound adapter.
#[derive(Clone)]
pub struct CircuitBreakers {
    config: ReliabilityConfig,
    breakers: Arc<Mutex<HashMap<String, BreakerState>>>,
}

#[derive(Debug, Clone, Default)]
struct BreakerState {
    failure_streak: u32,
    open_until: Option<Instant>,
    trial_in_flight: bool,
}

impl CircuitBreakers {
    pub fn new(config: ReliabilityConfig) -> Self {
        Self {
            config,
            breakers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &ReliabilityConfig {
        &self.config
    }

    fn states(&self) -> MutexGuard<'_, HashMap<String, BreakerState>> {
        self.breakers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Admits one call to `dependency`. The returned permit must be settled
    /// with [`BreakerPermit::succeed`] or [`BreakerPermit::fail`]; a permit
    /// dropped unsettled releases its half-open trial slot.
    pub fn ensure_allowed(&self, dependency: &str) -> Result<BreakerPermit, CircuitOpen> {
        let now = Instant::now();
        let mut states = self.states();
        let state = states.entry(dependency.to_string()).or_default();

        let mut trial = false;
        if let Some(open_until) = state.open_until {
            if now < open_until || state.trial_in_flight {
                return Err(CircuitOpen {
                    dependency: dependency.to_string(),
                });
            }

            tracing::info!(
                target: "reliability",
                dependency = dependency,
                "breaker_half_open_trial"
            );
            state.trial_in_flight = true;
            trial = true;
        }

        Ok(BreakerPermit {
            breakers: self.clone(),
            dependency: dependency.to_string(),
            trial,
            settled: false,
        })
    }

    fn record_success(&self, dependency: &str) {
        let mut states = self.states();
        let state = states.entry(dependency.to_string()).or_default();
        if state.open_until.is_some() {
            tracing::info!(
                target: "reliability",
                dependency = dependency,
                "breaker_closed_recovered"
            );
        }
        state.failure_streak = 0;
        state.open_until = None;
        state.trial_in_flight = false;
    }

    fn record_failure(&self, dependency: &str, count_toward_breaker: bool) {
        let mut states = self.states();
        let state = states.entry(dependency.to_string()).or_default();

        if !count_toward_breaker {
            state.trial_in_flight = false;
            return;
        }

        state.failure_streak = state.failure_streak.saturating_add(1);
        let was_trial = state.trial_in_flight;
        state.trial_in_flight = false;

        if was_trial || state.failure_streak >= self.config.breaker_failure_threshold.max(1) {
            state.open_until =
                Some(Instant::now() + Duration::from_millis(self.config.breaker_open_ms.max(1)));
            tracing::warn!(
                target: "reliability",
                dependency = dependency,
                failure_streak = state.failure_streak,
                open_ms = self.config.breaker_open_ms,
                "breaker_opened"
            );
        }
    }

    /// The breaker stays half-open; the next caller becomes the trial.
    fn abandon_trial(&self, dependency: &str) {
        let mut states = self.states();
        if let Some(state) = states.get_mut(dependency) {
            state.trial_in_flight = false;
        }
        tracing::info!(
            target: "reliability",
            dependency = dependency,
            "breaker_trial_abandoned"
        );
    }

    pub fn phase(&self, dependency: &str) -> BreakerPhase {
        match self.states().get(dependency).and_then(|state| state.open_until) {
            None => BreakerPhase::Closed,
            Some(open_until) if Instant::now() < open_until => BreakerPhase::Open,
            Some(_) => BreakerPhase::HalfOpen,
        }
    }
}

/// One admitted call through a breaker.
#[must_use = "a permit must be settled with succeed() or fail()"]
pub struct BreakerPermit {
    breakers: CircuitBreakers,
    dependency: String,
    trial: bool,
    settled: bool,
}

impl BreakerPermit {
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn succeed(mut self) {
        self.settled = true;
        self.breakers.record_success(&self.dependency);
    }

    pub fn fail(mut self, count_toward_breaker: bool) {
        self.settled = true;
        self.breakers
            .record_failure(&self.dependency, count_toward_breaker);
    }
}

impl Drop for BreakerPermit {
    fn drop(&mut self) {
        if self.trial && !self.settled {
            self.breakers.abandon_trial(&self.dependency);
        }
    }
}
