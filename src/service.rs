use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::{
    audit::{AuditRecord, AuditTrail},
    config::Config,
    context::{
        ContextLoader, ContextLoaderSettings, IdentityGraphPort, MemoryServicePort,
        PreferenceEnginePort,
        adapters::{
            ContextFixtures, HttpIdentityGraph, HttpMemoryService, HttpPreferenceEngine,
            build_http_client,
        },
    },
    flags::FeatureFlags,
    gate::{GateDecision, GateEnforcer, GateStage, StrategyArtifact},
    ledger::DecisionLedger,
    orchestrator::{
        DecisionBundle, OrchestrationError, Orchestrator,
        error::{invalid_request, missing_correlation_id, unknown_request},
    },
    reasoner::{ReasonerName, ReasonerRegistry},
    reliability::CircuitBreakers,
    response::{AssembleOptions, ComparativeResponse, assemble},
    types::{Request, is_blank},
};

/// The single entry point of the decision core. Built once per process with
/// its collaborators injected; cloning shares the same ledger and audit trail.
#[derive(Clone)]
pub struct DecisionService {
    orchestrator: Orchestrator,
    gate: GateEnforcer,
    ledger: Arc<DecisionLedger>,
    audit: Arc<AuditTrail>,
    flags: FeatureFlags,
    shutdown: CancellationToken,
}

impl DecisionService {
    pub fn new(
        orchestrator: Orchestrator,
        ledger: Arc<DecisionLedger>,
        audit: Arc<AuditTrail>,
        flags: FeatureFlags,
    ) -> Self {
        let gate = GateEnforcer::new(orchestrator.config().degradation_tolerance);
        let orchestrator = if flags.counterfactual_enabled {
            orchestrator
        } else {
            orchestrator.with_disabled([ReasonerName::Counterfactual])
        };
        Self {
            orchestrator,
            gate,
            ledger,
            audit,
            flags,
            shutdown: CancellationToken::new(),
        }
    }

    /// Wires context stores, reasoners and the stateful stores from config.
    pub fn from_config(config: &Config) -> Result<Self> {
        let flags = config.flags.with_process_env();
        let breakers = CircuitBreakers::new(config.reliability.clone());
        let http = build_http_client(Duration::from_millis(config.context.http_timeout_ms.max(1)))
            .context("failed to build http client")?;

        let fixtures = match &config.context.fixtures_path {
            Some(path) => ContextFixtures::load(path)?,
            None => ContextFixtures::default(),
        };
        let (fixture_identity, fixture_preferences, fixture_memory) = fixtures.into_ports();

        let identity: Arc<dyn IdentityGraphPort> = match &config.context.identity_graph_url {
            Some(url) => Arc::new(HttpIdentityGraph::new(http.clone(), url.clone())),
            None => fixture_identity,
        };
        let preferences: Arc<dyn PreferenceEnginePort> =
            match &config.context.preference_engine_url {
                Some(url) => Arc::new(HttpPreferenceEngine::new(http.clone(), url.clone())),
                None => fixture_preferences,
            };
        let memory: Arc<dyn MemoryServicePort> = match &config.context.memory_service_url {
            Some(url) => Arc::new(HttpMemoryService::new(http.clone(), url.clone())),
            None => fixture_memory,
        };

        let settings = ContextLoaderSettings {
            fetch_timeout: Duration::from_millis(
                config.orchestrator.context_fetch_timeout_ms.max(1),
            ),
            degradation_factor: config.orchestrator.degradation_factor,
            window: config.orchestrator.memory_window(),
            skip_optional_sources: flags.degraded_mode,
        };
        let loader = ContextLoader::new(identity, preferences, memory, breakers.clone(), settings);
        let registry = ReasonerRegistry::from_config(&config.reasoners, &http, &breakers);
        let orchestrator = Orchestrator::new(loader, registry, config.orchestrator.clone());

        tracing::info!(
            target: "service",
            counterfactual_enabled = flags.counterfactual_enabled,
            detailed_explanations = flags.detailed_explanations,
            degraded_mode = flags.degraded_mode,
            "decision_service_ready"
        );

        Ok(Self::new(
            orchestrator,
            Arc::new(DecisionLedger::new(&config.ledger)),
            Arc::new(AuditTrail::new(&config.audit)),
            flags,
        ))
    }

    pub fn flags(&self) -> FeatureFlags {
        self.flags
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    pub fn ledger(&self) -> &DecisionLedger {
        &self.ledger
    }

    /// Cancels every orchestration started through [`Self::orchestrate`].
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// A token cancelled on shutdown that callers may also cancel on their own,
    /// e.g. when the client that asked for the work goes away.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    pub async fn orchestrate(
        &self,
        request: Request,
    ) -> Result<DecisionBundle, OrchestrationError> {
        let cancel = self.cancellation_token();
        self.orchestrate_with_cancel(request, &cancel).await
    }

    pub async fn orchestrate_with_cancel(
        &self,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<DecisionBundle, OrchestrationError> {
        let bundle = self.orchestrator.orchestrate(request, cancel).await?;
        let record = self.audit.append(&bundle);
        tracing::debug!(
            target: "service",
            request_id = %bundle.request_id,
            correlation_id = %bundle.correlation_id,
            audit_id = %record.audit_id,
            "bundle_recorded"
        );
        self.ledger.record_bundle(bundle.clone());
        Ok(bundle)
    }

    pub fn check_gate(
        &self,
        stage: GateStage,
        request_id: &str,
        correlation_id: &str,
    ) -> Result<GateDecision, OrchestrationError> {
        require_correlation_id(correlation_id)?;
        let bundle = self.ledger.bundle(request_id);
        let strategy = self.ledger.strategy(request_id);
        let decision = self
            .gate
            .check(stage, request_id, bundle.as_deref(), strategy.as_deref());

        if decision.allowed {
            tracing::debug!(
                target: "gate",
                request_id = %request_id,
                correlation_id = %correlation_id,
                stage = ?stage,
                "gate_allowed"
            );
        } else {
            tracing::info!(
                target: "gate",
                request_id = %request_id,
                correlation_id = %correlation_id,
                stage = ?stage,
                reason = %decision.reason,
                "gate_denied"
            );
        }
        Ok(decision)
    }

    /// Registers the strategy stage's output. The strategy gate must hold for
    /// the artifact's request.
    pub fn record_strategy(&self, artifact: StrategyArtifact) -> Result<(), OrchestrationError> {
        require_correlation_id(&artifact.correlation_id)?;
        let gate = self.check_gate(
            GateStage::Strategy,
            &artifact.request_id,
            &artifact.correlation_id,
        )?;
        if !gate.allowed {
            return Err(invalid_request(format!(
                "strategy artifact rejected: {}",
                gate.reason
            )));
        }

        let request_id = artifact.request_id.clone();
        if !self.ledger.record_strategy(artifact) {
            return Err(unknown_request(format!(
                "no decision bundle is held for request {request_id}"
            )));
        }
        Ok(())
    }

    pub fn assemble(
        &self,
        request_id: &str,
        correlation_id: &str,
        options: AssembleOptions,
    ) -> Result<ComparativeResponse, OrchestrationError> {
        require_correlation_id(correlation_id)?;
        let bundle = self.ledger.bundle(request_id).ok_or_else(|| {
            unknown_request(format!("no decision bundle is held for request {request_id}"))
        })?;
        let options = AssembleOptions {
            detailed_explanations: options.detailed_explanations
                && self.flags.detailed_explanations,
            ..options
        };
        Ok(assemble(&bundle, options))
    }

    /// Latest audit record of a request, if it is still retained.
    pub fn audit_record(&self, request_id: &str) -> Option<AuditRecord> {
        self.audit.find_by_request(request_id)
    }
}

fn require_correlation_id(correlation_id: &str) -> Result<(), OrchestrationError> {
    if is_blank(correlation_id) {
        return Err(missing_correlation_id("correlation id is required"));
    }
    Ok(())
}
