#[path = "../support/mod.rs"]
mod support;

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio_util::sync::CancellationToken;

use inflow::{
    context::ContextLoaderSettings,
    flags::FeatureFlags,
    orchestrator::{Orchestrator, OrchestrationErrorKind, OrchestratorConfig, OrchestratorEvent},
    reasoner::{
        OutputOrigin, Reasoner, ReasonerError, ReasonerName, ReasonerOutput, ReasonerRegistry,
        RiskBand, RiskLevel, Signal, error::failed,
    },
};
use support::{
    HookReasoner, InFlight, UnavailableIdentityGraph, healthy_loader, loader, memory_log,
    orchestrator, preference_engine, registry_with, request, service,
};

fn hanging(name: ReasonerName, in_flight: &Arc<AtomicUsize>) -> Arc<dyn Reasoner> {
    let in_flight = Arc::clone(in_flight);
    HookReasoner::new(name, move |_input| {
        let in_flight = Arc::clone(&in_flight);
        async move {
            let _guard = InFlight::enter(&in_flight);
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(ReasonerOutput::insufficient(name, 0.0))
        }
    })
}

fn explode() -> Result<ReasonerOutput, ReasonerError> {
    panic!("reasoner exploded")
}

#[tokio::test]
async fn bundle_always_holds_one_output_per_reasoner() {
    let failing = HookReasoner::new(ReasonerName::Timing, |input| async move {
        Err(failed(
            ReasonerName::Timing,
            format!("no timing data for {}", input.request.creator_id),
        ))
    });
    let orchestrator = orchestrator(healthy_loader(), registry_with(vec![failing]));

    let bundle = orchestrator
        .orchestrate(request("corr-keys"), &CancellationToken::new())
        .await
        .expect("orchestration should succeed");

    assert_eq!(bundle.outputs.len(), ReasonerName::ALL.len());
    for name in ReasonerName::ALL {
        let output = bundle.output(name).expect("every reasoner has an output");
        assert_eq!(output.reasoner_name, name);
    }
    let timing = bundle
        .output(ReasonerName::Timing)
        .expect("timing output should exist");
    assert_eq!(timing.origin, OutputOrigin::Failed);
    assert!(timing.unknown);
    assert!(bundle.degraded);
    assert_eq!(bundle.degraded_reasoners(), vec![ReasonerName::Timing]);
}

#[tokio::test]
async fn low_confidence_answer_becomes_insufficient_data() {
    let timid = HookReasoner::new(ReasonerName::Risk, |_input| async move {
        Ok(ReasonerOutput {
            reasoner_name: ReasonerName::Risk,
            signal: Signal::Risk(RiskBand {
                level: RiskLevel::High,
                flags: vec!["guess".to_string()],
            }),
            confidence: 0.2,
            unknown: false,
            origin: OutputOrigin::Evaluated,
        })
    });
    let orchestrator = orchestrator(healthy_loader(), registry_with(vec![timid]));

    let bundle = orchestrator
        .orchestrate(request("corr-floor"), &CancellationToken::new())
        .await
        .expect("orchestration should succeed");

    let risk = bundle
        .output(ReasonerName::Risk)
        .expect("risk output should exist");
    assert!(risk.unknown);
    assert_eq!(risk.signal, Signal::InsufficientData);
    assert_eq!(risk.origin, OutputOrigin::Evaluated);
    assert!(!bundle.degraded, "a low-confidence answer is not a failure");
}

#[tokio::test]
async fn slow_reasoner_times_out_and_degrades_bundle() {
    let slow = HookReasoner::new(ReasonerName::Fatigue, |_input| async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(ReasonerOutput::insufficient(ReasonerName::Fatigue, 0.9))
    });
    let config = OrchestratorConfig {
        reasoner_timeout_ms: 100,
        ..OrchestratorConfig::default()
    };
    let orchestrator = Orchestrator::new(healthy_loader(), registry_with(vec![slow]), config);

    let bundle = orchestrator
        .orchestrate(request("corr-timeout"), &CancellationToken::new())
        .await
        .expect("orchestration should succeed");

    let fatigue = bundle
        .output(ReasonerName::Fatigue)
        .expect("fatigue output should exist");
    assert_eq!(fatigue.origin, OutputOrigin::TimedOut);
    assert_eq!(fatigue.signal, Signal::InsufficientData);
    assert!(bundle.degraded);
    assert_eq!(bundle.outputs.len(), ReasonerName::ALL.len());
}

#[tokio::test]
async fn panicking_reasoner_is_reported_as_failed() {
    let broken = HookReasoner::new(ReasonerName::Viability, |_input| async move { explode() });
    let orchestrator = orchestrator(healthy_loader(), registry_with(vec![broken]));

    let bundle = orchestrator
        .orchestrate(request("corr-panic"), &CancellationToken::new())
        .await
        .expect("orchestration should survive a panicking reasoner");

    let viability = bundle
        .output(ReasonerName::Viability)
        .expect("viability slot should be filled");
    assert_eq!(viability.origin, OutputOrigin::Failed);
    assert!(viability.unknown);
    assert!(bundle.degraded);
}

#[tokio::test]
async fn foreign_signal_is_treated_as_failure() {
    let confused = HookReasoner::new(ReasonerName::Timing, |_input| async move {
        Ok(ReasonerOutput {
            reasoner_name: ReasonerName::Timing,
            signal: Signal::Risk(RiskBand {
                level: RiskLevel::Low,
                flags: Vec::new(),
            }),
            confidence: 0.9,
            unknown: false,
            origin: OutputOrigin::Evaluated,
        })
    });
    let orchestrator = orchestrator(healthy_loader(), registry_with(vec![confused]));

    let bundle = orchestrator
        .orchestrate(request("corr-contract"), &CancellationToken::new())
        .await
        .expect("orchestration should succeed");

    let timing = bundle
        .output(ReasonerName::Timing)
        .expect("timing output should exist");
    assert_eq!(timing.origin, OutputOrigin::Failed);
}

#[tokio::test]
async fn identity_failure_aborts_without_bundle() {
    let loader = loader(
        Arc::new(UnavailableIdentityGraph),
        preference_engine(),
        memory_log(),
        ContextLoaderSettings::default(),
    );
    let service = service(
        orchestrator(loader, ReasonerRegistry::with_builtin()),
        FeatureFlags::default(),
    );

    let err = service
        .orchestrate(request("corr-identity"))
        .await
        .expect_err("identity is mandatory");

    assert_eq!(err.kind, OrchestrationErrorKind::ContextUnavailable);
    assert!(service.ledger().is_empty());
    assert!(service.audit().is_empty());
}

#[tokio::test]
async fn missing_correlation_id_is_rejected_before_any_work() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let orchestrator = orchestrator(healthy_loader(), ReasonerRegistry::with_builtin())
        .with_hook(Arc::new(move |event: OrchestratorEvent| {
            sink.lock().expect("event lock should not be poisoned").push(event);
        }));

    let err = orchestrator
        .orchestrate(request("  "), &CancellationToken::new())
        .await
        .expect_err("blank correlation id must be rejected");

    assert_eq!(err.kind, OrchestrationErrorKind::MissingCorrelationId);
    assert!(
        events
            .lock()
            .expect("event lock should not be poisoned")
            .is_empty()
    );
}

#[tokio::test]
async fn cancellation_aborts_every_reasoner_in_flight() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let reasoners = ReasonerName::ALL
        .into_iter()
        .map(|name| hanging(name, &in_flight))
        .collect();
    let orchestrator = orchestrator(healthy_loader(), registry_with(reasoners));
    let cancel = CancellationToken::new();

    let handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { orchestrator.orchestrate(request("corr-cancel"), &cancel).await })
    };

    tokio::time::timeout(Duration::from_secs(5), async {
        while in_flight.load(Ordering::SeqCst) < ReasonerName::ALL.len() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("all reasoners should start");

    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("cancelled orchestration should return promptly")
        .expect("orchestration task should not panic");

    let err = result.expect_err("orchestration should be cancelled");
    assert_eq!(err.kind, OrchestrationErrorKind::Cancelled);
    assert_eq!(in_flight.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancelled_token_short_circuits() {
    let orchestrator = orchestrator(healthy_loader(), ReasonerRegistry::with_builtin());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = orchestrator
        .orchestrate(request("corr-early-cancel"), &cancel)
        .await
        .expect_err("a cancelled token should stop orchestration");
    assert_eq!(err.kind, OrchestrationErrorKind::Cancelled);
}

#[tokio::test]
async fn concurrency_cap_bounds_parallel_reasoners() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let reasoners = ReasonerName::ALL
        .into_iter()
        .map(|name| {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            HookReasoner::new(name, move |_input| {
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                async move {
                    let _guard = InFlight::enter(&in_flight);
                    peak.fetch_max(in_flight.load(Ordering::SeqCst), Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    Ok(ReasonerOutput::insufficient(name, 0.0))
                }
            })
        })
        .collect();
    let config = OrchestratorConfig {
        max_concurrency: 2,
        ..OrchestratorConfig::default()
    };
    let orchestrator = Orchestrator::new(healthy_loader(), registry_with(reasoners), config);

    let bundle = orchestrator
        .orchestrate(request("corr-cap"), &CancellationToken::new())
        .await
        .expect("orchestration should succeed");

    assert_eq!(bundle.outputs.len(), ReasonerName::ALL.len());
    assert!(!bundle.degraded);
    assert!(peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn repeated_orchestration_yields_same_outcome() {
    let orchestrator = orchestrator(healthy_loader(), ReasonerRegistry::with_builtin());
    let request = request("corr-repeat");

    let first = orchestrator
        .orchestrate(request.clone(), &CancellationToken::new())
        .await
        .expect("first orchestration should succeed");
    let second = orchestrator
        .orchestrate(request, &CancellationToken::new())
        .await
        .expect("second orchestration should succeed");

    assert!(first.same_outcome(&second));
}

#[tokio::test]
async fn disabled_counterfactual_reports_insufficient_data() {
    let flags = FeatureFlags {
        counterfactual_enabled: false,
        ..FeatureFlags::default()
    };
    let service = service(
        orchestrator(healthy_loader(), ReasonerRegistry::with_builtin()),
        flags,
    );

    let bundle = service
        .orchestrate(request("corr-flag"))
        .await
        .expect("orchestration should succeed");

    let counterfactual = bundle
        .output(ReasonerName::Counterfactual)
        .expect("disabled reasoner keeps its slot");
    assert_eq!(counterfactual.origin, OutputOrigin::Disabled);
    assert!(counterfactual.unknown);
    assert!(!bundle.degraded);
}

#[tokio::test]
async fn hook_sees_start_and_completion() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let orchestrator = orchestrator(healthy_loader(), ReasonerRegistry::with_builtin())
        .with_hook(Arc::new(move |event: OrchestratorEvent| {
            sink.lock().expect("event lock should not be poisoned").push(event);
        }));

    let bundle = orchestrator
        .orchestrate(request("corr-hook"), &CancellationToken::new())
        .await
        .expect("orchestration should succeed");

    let events = events.lock().expect("event lock should not be poisoned");
    assert_eq!(
        events.first(),
        Some(&OrchestratorEvent::Started {
            request_id: bundle.request_id.clone(),
        })
    );
    assert_eq!(
        events.last(),
        Some(&OrchestratorEvent::Completed {
            request_id: bundle.request_id.clone(),
            degraded: false,
            context_partial: false,
        })
    );
}
