#[path = "../support/mod.rs"]
mod support;

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use inflow::{
    context::{
        ContextError, ContextErrorKind, ContextLoader, ContextLoaderSettings, ContextSource,
        IdentityGraphPort, IdentityRecord, PreferenceEnginePort, SoftConstraint,
    },
    flags::FeatureFlags,
    orchestrator::OrchestrationErrorKind,
    reasoner::ReasonerRegistry,
    reliability::BreakerPhase,
    types::{CallContext, CreatorId},
};
use support::{
    CREATOR, UnavailableIdentityGraph, hair_trigger_breakers, identity, identity_graph,
    memory_log, orchestrator, preference_engine, request, service, wait_until,
};

/// Fails on the first call, never answers the second and succeeds afterwards.
#[derive(Default)]
struct FlakyIdentityGraph {
    calls: AtomicUsize,
}

#[async_trait]
impl IdentityGraphPort for FlakyIdentityGraph {
    async fn get_snapshot(
        &self,
        _call: &CallContext,
        _creator_id: &CreatorId,
    ) -> Result<IdentityRecord, ContextError> {
        match self.calls.fetch_add(1, Ordering::SeqCst) {
            0 => Err(ContextError::new(
                ContextErrorKind::Unavailable,
                "identity graph is restarting",
            )),
            1 => std::future::pending().await,
            _ => Ok(identity(CREATOR, 0.9)),
        }
    }
}

#[derive(Default)]
struct HangingIdentityGraph {
    entered: AtomicUsize,
}

#[async_trait]
impl IdentityGraphPort for HangingIdentityGraph {
    async fn get_snapshot(
        &self,
        _call: &CallContext,
        _creator_id: &CreatorId,
    ) -> Result<IdentityRecord, ContextError> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}

#[derive(Default)]
struct FailingPreferenceEngine {
    calls: AtomicUsize,
}

#[async_trait]
impl PreferenceEnginePort for FailingPreferenceEngine {
    async fn get_modifiers(
        &self,
        _call: &CallContext,
        _creator_id: &CreatorId,
    ) -> Result<Vec<SoftConstraint>, ContextError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ContextError::new(
            ContextErrorKind::Transport,
            "preference engine refused the connection",
        ))
    }
}

fn creator() -> CreatorId {
    CREATOR.to_string()
}

#[tokio::test]
async fn cancelled_load_during_half_open_trial_does_not_wedge_breaker() {
    let identity = Arc::new(FlakyIdentityGraph::default());
    let breakers = hair_trigger_breakers(20);
    let loader = ContextLoader::new(
        Arc::clone(&identity) as Arc<dyn IdentityGraphPort>,
        preference_engine(),
        memory_log(),
        breakers.clone(),
        ContextLoaderSettings::default(),
    );
    let call = request("corr-trial").call_context();

    let err = loader
        .load(&call, &creator(), &CancellationToken::new())
        .await
        .expect_err("first identity call fails");
    assert_eq!(err.kind, ContextErrorKind::Unavailable);
    assert_eq!(breakers.phase("identity_graph"), BreakerPhase::Open);

    tokio::time::sleep(Duration::from_millis(40)).await;
    let cancel = CancellationToken::new();
    let trial = {
        let loader = loader.clone();
        let call = call.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { loader.load(&call, &creator(), &cancel).await })
    };
    wait_until("the trial call to reach the identity graph", || {
        identity.calls.load(Ordering::SeqCst) >= 2
    })
    .await;

    cancel.cancel();
    let err = tokio::time::timeout(Duration::from_secs(5), trial)
        .await
        .expect("cancelled load should return promptly")
        .expect("load task should not panic")
        .expect_err("load should be cancelled");
    assert_eq!(err.kind, ContextErrorKind::Cancelled);
    assert_eq!(breakers.phase("identity_graph"), BreakerPhase::HalfOpen);

    let context = loader
        .load(&call, &creator(), &CancellationToken::new())
        .await
        .expect("breaker should admit a new trial after the cancelled one");
    assert!(!context.partial);
    assert_eq!(breakers.phase("identity_graph"), BreakerPhase::Closed);
}

#[tokio::test]
async fn open_identity_breaker_makes_context_unavailable() {
    let breakers = hair_trigger_breakers(60_000);
    let loader = ContextLoader::new(
        Arc::new(UnavailableIdentityGraph),
        preference_engine(),
        memory_log(),
        breakers.clone(),
        ContextLoaderSettings::default(),
    );
    let service = service(
        orchestrator(loader.clone(), ReasonerRegistry::with_builtin()),
        FeatureFlags::default(),
    );

    let first = service
        .orchestrate(request("corr-breaker-1"))
        .await
        .expect_err("identity is mandatory");
    assert_eq!(first.kind, OrchestrationErrorKind::ContextUnavailable);
    assert_eq!(breakers.phase("identity_graph"), BreakerPhase::Open);

    let short_circuited = loader
        .load(
            &request("corr-breaker-2").call_context(),
            &creator(),
            &CancellationToken::new(),
        )
        .await
        .expect_err("open breaker should refuse the call");
    assert_eq!(short_circuited.kind, ContextErrorKind::CircuitOpen);
    assert_eq!(short_circuited.source, Some(ContextSource::IdentityGraph));

    let second = service
        .orchestrate(request("corr-breaker-3"))
        .await
        .expect_err("open breaker still blocks orchestration");
    assert_eq!(second.kind, OrchestrationErrorKind::ContextUnavailable);
    assert!(service.ledger().is_empty());
}

#[tokio::test]
async fn open_preference_breaker_leaves_context_partial() {
    let preferences = Arc::new(FailingPreferenceEngine::default());
    let breakers = hair_trigger_breakers(60_000);
    let loader = ContextLoader::new(
        identity_graph(0.9),
        Arc::clone(&preferences) as Arc<dyn PreferenceEnginePort>,
        memory_log(),
        breakers.clone(),
        ContextLoaderSettings::default(),
    );

    for correlation_id in ["corr-pref-1", "corr-pref-2"] {
        let context = loader
            .load(
                &request(correlation_id).call_context(),
                &creator(),
                &CancellationToken::new(),
            )
            .await
            .expect("optional source failures keep the load alive");
        assert!(context.partial);
        assert_eq!(context.missing_sources, vec![ContextSource::PreferenceEngine]);
        assert!((context.confidence - 0.63).abs() < 1e-9);
    }

    assert_eq!(breakers.phase("preference_engine"), BreakerPhase::Open);
    assert_eq!(
        preferences.calls.load(Ordering::SeqCst),
        1,
        "open breaker should stop calls to the preference engine"
    );
}

#[tokio::test]
async fn cancellation_during_context_fetch_aborts_orchestration() {
    let identity = Arc::new(HangingIdentityGraph::default());
    let loader = ContextLoader::new(
        Arc::clone(&identity) as Arc<dyn IdentityGraphPort>,
        preference_engine(),
        memory_log(),
        hair_trigger_breakers(60_000),
        ContextLoaderSettings {
            fetch_timeout: Duration::from_secs(30),
            ..ContextLoaderSettings::default()
        },
    );
    let service = service(
        orchestrator(loader, ReasonerRegistry::with_builtin()),
        FeatureFlags::default(),
    );
    let cancel = service.cancellation_token();

    let pending = {
        let service = service.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            service
                .orchestrate_with_cancel(request("corr-fetch-cancel"), &cancel)
                .await
        })
    };
    wait_until("the identity fetch to start", || {
        identity.entered.load(Ordering::SeqCst) == 1
    })
    .await;

    cancel.cancel();
    let err = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .expect("cancelled orchestration should return promptly")
        .expect("orchestration task should not panic")
        .expect_err("orchestration should be cancelled");
    assert_eq!(err.kind, OrchestrationErrorKind::Cancelled);
    assert!(service.ledger().is_empty());
    assert!(service.audit().is_empty());
}
