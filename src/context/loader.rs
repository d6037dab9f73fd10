use std::{future::Future, sync::Arc};

use tokio::time::{Duration, timeout};
use tokio_util::sync::CancellationToken;

use crate::{
    context::{
        error::{ContextError, ContextErrorKind, cancelled, timeout as timeout_error},
        ports::{IdentityGraphPort, MemoryServicePort, PreferenceEnginePort},
        types::{ContextSource, ContextWindow, CreatorContext, MemoryRecord},
    },
    reliability::CircuitBreakers,
    types::{CallContext, CreatorId, clamp_unit},
};

#[derive(Debug, Clone)]
pub struct ContextLoaderSettings {
    pub fetch_timeout: Duration,
    pub degradation_factor: f64,
    pub window: ContextWindow,
    /// Skip the preference and memory fetches entirely (degraded mode).
    pub skip_optional_sources: bool,
}

impl Default for ContextLoaderSettings {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_millis(2_000),
            degradation_factor: 0.7,
            window: ContextWindow::default(),
            skip_optional_sources: false,
        }
    }
}

/// Loads a fresh [`CreatorContext`] per request from the three context stores.
///
/// The identity snapshot is mandatory. Preference modifiers and memory slices
/// are optional: when either is missing the context is marked partial and its
/// confidence is multiplied by the degradation factor once per missing source.
#[derive(Clone)]
pub struct ContextLoader {
    identity: Arc<dyn IdentityGraphPort>,
    preferences: Arc<dyn PreferenceEnginePort>,
    memory: Arc<dyn MemoryServicePort>,
    breakers: CircuitBreakers,
    settings: ContextLoaderSettings,
}

impl ContextLoader {
    pub fn new(
        identity: Arc<dyn IdentityGraphPort>,
        preferences: Arc<dyn PreferenceEnginePort>,
        memory: Arc<dyn MemoryServicePort>,
        breakers: CircuitBreakers,
        settings: ContextLoaderSettings,
    ) -> Self {
        Self {
            identity,
            preferences,
            memory,
            breakers,
            settings,
        }
    }

    pub fn settings(&self) -> &ContextLoaderSettings {
        &self.settings
    }

    #[tracing::instrument(
        name = "context_load",
        target = "context",
        skip(self, call, cancel),
        fields(request_id = %call.request_id, correlation_id = %call.correlation_id)
    )]
    pub async fn load(
        &self,
        call: &CallContext,
        creator_id: &CreatorId,
        cancel: &CancellationToken,
    ) -> Result<CreatorContext, ContextError> {
        let skip_optional = self.settings.skip_optional_sources;

        let identity_fetch = self.guarded(
            ContextSource::IdentityGraph,
            self.identity.get_snapshot(call, creator_id),
        );
        let preference_fetch = async {
            if skip_optional {
                return Ok::<_, ContextError>(None);
            }
            Ok(Some(
                self.guarded(
                    ContextSource::PreferenceEngine,
                    self.preferences.get_modifiers(call, creator_id),
                )
                .await,
            ))
        };
        let memory_fetch = async {
            if skip_optional {
                return Ok::<_, ContextError>(None);
            }
            Ok(Some(
                self.guarded(
                    ContextSource::MemoryService,
                    self.memory
                        .get_relevant_slices(call, creator_id, self.settings.window),
                )
                .await,
            ))
        };

        let (identity, preferences, memory) = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(cancelled("context load cancelled by caller"));
            }
            joined = async {
                tokio::try_join!(identity_fetch, preference_fetch, memory_fetch)
            } => joined?,
        };

        let mut missing_sources = Vec::new();
        let preference_modifiers = self.optional_or_missing(
            call,
            ContextSource::PreferenceEngine,
            preferences,
            &mut missing_sources,
        );
        let mut memory_slices: Vec<MemoryRecord> = self.optional_or_missing(
            call,
            ContextSource::MemoryService,
            memory,
            &mut missing_sources,
        );
        normalize_memory(&mut memory_slices, self.settings.window.max_records);

        let penalty = self
            .settings
            .degradation_factor
            .powi(missing_sources.len() as i32);
        let confidence = clamp_unit(clamp_unit(identity.confidence) * penalty);
        let partial = !missing_sources.is_empty();

        if partial {
            tracing::warn!(
                target: "context",
                request_id = %call.request_id,
                correlation_id = %call.correlation_id,
                creator_id = %creator_id,
                missing_sources = ?missing_sources,
                confidence = confidence,
                "context_loaded_partial"
            );
        } else {
            tracing::debug!(
                target: "context",
                request_id = %call.request_id,
                correlation_id = %call.correlation_id,
                creator_id = %creator_id,
                confidence = confidence,
                memory_slices = memory_slices.len(),
                "context_loaded"
            );
        }

        Ok(CreatorContext {
            identity_snapshot: identity.snapshot,
            confidence,
            preference_modifiers,
            memory_slices,
            partial,
            missing_sources,
        })
    }

    fn optional_or_missing<T: Default>(
        &self,
        call: &CallContext,
        source: ContextSource,
        result: Option<Result<T, ContextError>>,
        missing_sources: &mut Vec<ContextSource>,
    ) -> T {
        match result {
            Some(Ok(value)) => value,
            Some(Err(err)) => {
                tracing::warn!(
                    target: "context",
                    request_id = %call.request_id,
                    correlation_id = %call.correlation_id,
                    source = source.as_str(),
                    error = %err,
                    "optional_source_failed"
                );
                missing_sources.push(source);
                T::default()
            }
            None => {
                missing_sources.push(source);
                T::default()
            }
        }
    }

    async fn guarded<T>(
        &self,
        source: ContextSource,
        fetch: impl Future<Output = Result<T, ContextError>>,
    ) -> Result<T, ContextError> {
        let dependency = source.as_str();
        let permit = self.breakers.ensure_allowed(dependency).map_err(|open| {
            ContextError::new(ContextErrorKind::CircuitOpen, open.to_string()).with_source(source)
        })?;

        let result = match timeout(self.settings.fetch_timeout, fetch).await {
            Ok(result) => result,
            Err(_) => Err(timeout_error(format!(
                "{} did not answer within {}ms",
                dependency,
                self.settings.fetch_timeout.as_millis()
            ))),
        };

        match &result {
            Ok(_) => permit.succeed(),
            Err(err) => permit.fail(err.counts_toward_breaker()),
        }

        result.map_err(|err| err.with_source(source))
    }
}

fn normalize_memory(records: &mut Vec<MemoryRecord>, max_records: usize) {
    records.sort_by_key(|record| record.recorded_at);
    if records.len() > max_records {
        let excess = records.len() - max_records;
        records.drain(..excess);
    }
}
