use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use time::OffsetDateTime;
use tokio::{
    sync::Semaphore,
    task::JoinSet,
    time::{Duration, Instant, timeout_at},
};
use tokio_util::sync::CancellationToken;

use crate::{
    context::{ContextLoader, CreatorContext},
    orchestrator::{
        error::{
            OrchestrationError, OrchestrationErrorKind, cancelled, invalid_request,
            missing_correlation_id,
        },
        types::{DecisionBundle, OrchestratorConfig},
    },
    reasoner::{
        error::{ReasonerError, ReasonerErrorKind, contract_violation},
        ports::{Reasoner, ReasonerInput},
        registry::ReasonerRegistry,
        types::{OutputOrigin, ReasonerName, ReasonerOutput},
    },
    types::{Request, is_blank},
};

#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorEvent {
    Started {
        request_id: String,
    },
    ReasonerFallback {
        request_id: String,
        reasoner: ReasonerName,
        origin: OutputOrigin,
    },
    Completed {
        request_id: String,
        degraded: bool,
        context_partial: bool,
    },
    Cancelled {
        request_id: String,
    },
}

pub type OrchestratorHook = Arc<dyn Fn(OrchestratorEvent) + Send + Sync>;

#[derive(Debug, Clone)]
struct FanOutSettings {
    reasoner_timeout: Duration,
    confidence_floor: f64,
    evaluated_at: OffsetDateTime,
}

/// Runs one orchestration per request: load the creator context, fan out to
/// every registered reasoner and merge the results into a [`DecisionBundle`].
#[derive(Clone)]
pub struct Orchestrator {
    loader: ContextLoader,
    registry: ReasonerRegistry,
    config: OrchestratorConfig,
    disabled: BTreeSet<ReasonerName>,
    hook: Option<OrchestratorHook>,
}

impl Orchestrator {
    pub fn new(
        loader: ContextLoader,
        registry: ReasonerRegistry,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            loader,
            registry,
            config,
            disabled: BTreeSet::new(),
            hook: None,
        }
    }

    /// Reasoners listed here are not dispatched and report `InsufficientData`.
    pub fn with_disabled(mut self, disabled: impl IntoIterator<Item = ReasonerName>) -> Self {
        self.disabled = disabled.into_iter().collect();
        self
    }

    pub fn with_hook(mut self, hook: OrchestratorHook) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    #[tracing::instrument(
        name = "orchestrate",
        target = "orchestrator",
        skip(self, request, cancel),
        fields(
            request_id = %request.request_id,
            correlation_id = %request.correlation_id,
            intent = ?request.intent_type
        )
    )]
    pub async fn orchestrate(
        &self,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<DecisionBundle, OrchestrationError> {
        validate_request(&request)?;
        if cancel.is_cancelled() {
            return Err(cancelled("orchestration cancelled before start"));
        }
        self.emit(OrchestratorEvent::Started {
            request_id: request.request_id.clone(),
        });

        let evaluated_at = OffsetDateTime::now_utc();
        let call = request.call_context();
        let context = match self.loader.load(&call, &request.creator_id, cancel).await {
            Ok(context) => context,
            Err(err) => {
                let err = OrchestrationError::from(err);
                tracing::warn!(
                    target: "orchestrator",
                    request_id = %request.request_id,
                    correlation_id = %request.correlation_id,
                    kind = %err.kind,
                    error = %err,
                    "orchestration_aborted"
                );
                if err.kind == OrchestrationErrorKind::Cancelled {
                    self.emit(OrchestratorEvent::Cancelled {
                        request_id: request.request_id.clone(),
                    });
                }
                return Err(err);
            }
        };

        let request = Arc::new(request);
        let context = Arc::new(context);
        let outputs = self
            .fan_out(Arc::clone(&request), Arc::clone(&context), evaluated_at, cancel)
            .await?;

        let degraded = outputs.values().any(|output| output.origin.is_degraded());
        let bundle = DecisionBundle {
            request_id: request.request_id.clone(),
            correlation_id: request.correlation_id.clone(),
            creator_id: request.creator_id.clone(),
            intent_type: request.intent_type,
            outputs,
            degraded,
            context_partial: context.partial,
            generated_at: OffsetDateTime::now_utc(),
        };

        tracing::info!(
            target: "orchestrator",
            request_id = %bundle.request_id,
            correlation_id = %bundle.correlation_id,
            degraded = bundle.degraded,
            context_partial = bundle.context_partial,
            unknown = bundle.outputs.values().filter(|output| output.unknown).count(),
            "bundle_assembled"
        );
        self.emit(OrchestratorEvent::Completed {
            request_id: bundle.request_id.clone(),
            degraded: bundle.degraded,
            context_partial: bundle.context_partial,
        });

        Ok(bundle)
    }

    async fn fan_out(
        &self,
        request: Arc<Request>,
        context: Arc<CreatorContext>,
        evaluated_at: OffsetDateTime,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<ReasonerName, ReasonerOutput>, OrchestrationError> {
        let settings = FanOutSettings {
            reasoner_timeout: Duration::from_millis(self.config.reasoner_timeout_ms.max(1)),
            confidence_floor: self.config.confidence_floor,
            evaluated_at,
        };
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut outputs = BTreeMap::new();
        let mut tasks = JoinSet::new();

        for (name, reasoner) in self.registry.iter() {
            if self.disabled.contains(&name) {
                outputs.insert(name, ReasonerOutput::synthetic(name, OutputOrigin::Disabled));
                continue;
            }
            tasks.spawn(run_reasoner(
                Arc::clone(reasoner),
                Arc::clone(&semaphore),
                Arc::clone(&request),
                Arc::clone(&context),
                settings.clone(),
            ));
        }

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let in_flight = tasks.len();
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    tracing::warn!(
                        target: "orchestrator",
                        request_id = %request.request_id,
                        correlation_id = %request.correlation_id,
                        in_flight = in_flight,
                        "orchestration_cancelled"
                    );
                    self.emit(OrchestratorEvent::Cancelled {
                        request_id: request.request_id.clone(),
                    });
                    return Err(cancelled("orchestration cancelled by caller"));
                }
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok((name, output))) => {
                        outputs.insert(name, output);
                    }
                    Some(Err(err)) => {
                        tracing::error!(
                            target: "orchestrator",
                            request_id = %request.request_id,
                            correlation_id = %request.correlation_id,
                            panicked = err.is_panic(),
                            error = %err,
                            "reasoner_task_lost"
                        );
                    }
                }
            }
        }

        // A task that panicked never reported its name; its slot is still empty.
        for name in ReasonerName::ALL {
            outputs
                .entry(name)
                .or_insert_with(|| ReasonerOutput::synthetic(name, OutputOrigin::Failed));
        }
        for output in outputs.values() {
            if output.origin.is_degraded() {
                self.emit(OrchestratorEvent::ReasonerFallback {
                    request_id: request.request_id.clone(),
                    reasoner: output.reasoner_name,
                    origin: output.origin,
                });
            }
        }

        Ok(outputs)
    }

    fn emit(&self, event: OrchestratorEvent) {
        if let Some(hook) = &self.hook {
            hook(event);
        }
    }
}

fn validate_request(request: &Request) -> Result<(), OrchestrationError> {
    if is_blank(&request.correlation_id) {
        return Err(missing_correlation_id(
            "request carries no correlation id; refusing to call downstream services",
        ));
    }
    if is_blank(&request.request_id) {
        return Err(invalid_request("request_id cannot be blank"));
    }
    if is_blank(&request.creator_id) {
        return Err(invalid_request("creator_id cannot be blank"));
    }
    Ok(())
}

async fn run_reasoner(
    reasoner: Arc<dyn Reasoner>,
    semaphore: Arc<Semaphore>,
    request: Arc<Request>,
    context: Arc<CreatorContext>,
    settings: FanOutSettings,
) -> (ReasonerName, ReasonerOutput) {
    let name = reasoner.name();
    let Ok(_permit) = semaphore.acquire_owned().await else {
        return (name, ReasonerOutput::synthetic(name, OutputOrigin::Failed));
    };

    let deadline = Instant::now() + settings.reasoner_timeout;
    let input = ReasonerInput {
        request: Arc::clone(&request),
        context,
        deadline,
        confidence_floor: settings.confidence_floor,
        evaluated_at: settings.evaluated_at,
    };

    let output = match timeout_at(deadline, reasoner.evaluate(&input)).await {
        Ok(Ok(output)) => match conform(name, output, settings.confidence_floor) {
            Ok(output) => output,
            Err(err) => fallback(&request, err),
        },
        Ok(Err(err)) => fallback(&request, err),
        Err(_) => {
            tracing::warn!(
                target: "orchestrator",
                request_id = %request.request_id,
                correlation_id = %request.correlation_id,
                reasoner = %name,
                timeout_ms = settings.reasoner_timeout.as_millis() as u64,
                "reasoner_timeout_fallback"
            );
            ReasonerOutput::synthetic(name, OutputOrigin::TimedOut)
        }
    };

    (name, output)
}

/// Re-checks a plug-in's answer: it must speak for its own slot and obey the
/// confidence floor.
fn conform(
    name: ReasonerName,
    output: ReasonerOutput,
    floor: f64,
) -> Result<ReasonerOutput, ReasonerError> {
    if output.reasoner_name != name {
        return Err(contract_violation(
            name,
            format!("output labelled '{}'", output.reasoner_name),
        ));
    }
    if let Some(owner) = output.signal.owner()
        && owner != name
    {
        return Err(contract_violation(
            name,
            format!("signal belongs to '{owner}'"),
        ));
    }

    Ok(ReasonerOutput {
        origin: OutputOrigin::Evaluated,
        ..output
    }
    .enforce_floor(floor))
}

fn fallback(request: &Request, err: ReasonerError) -> ReasonerOutput {
    let origin = match err.kind {
        ReasonerErrorKind::Timeout => OutputOrigin::TimedOut,
        _ => OutputOrigin::Failed,
    };
    tracing::warn!(
        target: "orchestrator",
        request_id = %request.request_id,
        correlation_id = %request.correlation_id,
        reasoner = %err.reasoner,
        kind = ?err.kind,
        error = %err,
        "reasoner_failed_fallback"
    );
    ReasonerOutput::synthetic(err.reasoner, origin)
}
