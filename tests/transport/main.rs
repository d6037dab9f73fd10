#[path = "../support/mod.rs"]
mod support;

use std::{sync::Arc, time::Duration};

use tokio::time::Instant;

use inflow::{
    context::{
        ContextErrorKind, ContextWindow, IdentityGraphPort, MemoryServicePort,
        adapters::{HttpIdentityGraph, HttpMemoryService, build_http_client},
    },
    reasoner::{
        HttpReasoner, Reasoner, ReasonerErrorKind, ReasonerInput, ReasonerName, ReasonerOutput,
        RiskBand, RiskLevel, Signal,
    },
    reliability::BreakerPhase,
};
use support::{CREATOR, StubHttp, creator_context, hair_trigger_breakers, identity, request};

fn reasoner_input(correlation_id: &str, budget: Duration) -> ReasonerInput {
    ReasonerInput {
        request: Arc::new(request(correlation_id)),
        context: Arc::new(creator_context(0.9)),
        deadline: Instant::now() + budget,
        confidence_floor: 0.4,
        evaluated_at: time::OffsetDateTime::now_utc(),
    }
}

#[tokio::test]
async fn identity_lookup_carries_trace_headers() {
    let body = serde_json::to_string(&identity(CREATOR, 0.8)).expect("identity should serialize");
    let stub = StubHttp::start(200, body, Duration::ZERO).await;
    let client = build_http_client(Duration::from_secs(2)).expect("client should build");
    let graph = HttpIdentityGraph::new(client, format!("{}/", stub.url));
    let call = request("corr-http-identity").call_context();

    let record = graph
        .get_snapshot(&call, &CREATOR.to_string())
        .await
        .expect("identity should load");
    assert_eq!(record.snapshot.creator_id, CREATOR);
    assert!((record.confidence - 0.8).abs() < 1e-9);

    let heads = stub.heads();
    assert_eq!(heads.len(), 1);
    let head = &heads[0];
    assert!(head.starts_with("get /v1/identity/c1 "), "unexpected head: {head}");
    assert!(head.contains("x-correlation-id: corr-http-identity"));
    assert!(head.contains(&format!("x-request-id: {}", call.request_id.to_ascii_lowercase())));
}

#[tokio::test]
async fn unknown_creator_is_not_found_and_does_not_count_as_outage() {
    let stub = StubHttp::start(404, "{}", Duration::ZERO).await;
    let client = build_http_client(Duration::from_secs(2)).expect("client should build");
    let graph = HttpIdentityGraph::new(client, stub.url.clone());
    let call = request("corr-http-404").call_context();

    let err = graph
        .get_snapshot(&call, &"nobody".to_string())
        .await
        .expect_err("404 should fail");
    assert_eq!(err.kind, ContextErrorKind::NotFound);
    assert!(!err.counts_toward_breaker());
}

#[tokio::test]
async fn slow_memory_service_maps_to_timeout() {
    let stub = StubHttp::start(200, r#"{"records":[]}"#, Duration::from_millis(500)).await;
    let client = build_http_client(Duration::from_millis(50)).expect("client should build");
    let memory = HttpMemoryService::new(client, stub.url.clone());
    let call = request("corr-http-slow").call_context();

    let err = memory
        .get_relevant_slices(&call, &CREATOR.to_string(), ContextWindow::default())
        .await
        .expect_err("slow memory service should time out");
    assert_eq!(err.kind, ContextErrorKind::Timeout);
    assert!(err.counts_toward_breaker());

    let heads = stub.heads();
    let head = heads.first().expect("request should have reached the stub");
    assert!(head.starts_with("get /v1/memory/c1/slices?"), "unexpected head: {head}");
    assert!(head.contains("lookback_days="));
    assert!(head.contains("x-correlation-id: corr-http-slow"));
}

#[tokio::test]
async fn remote_reasoner_answer_is_accepted_with_trace_headers() {
    let output = ReasonerOutput::from_estimate(
        ReasonerName::Risk,
        Signal::Risk(RiskBand {
            level: RiskLevel::Low,
            flags: Vec::new(),
        }),
        0.8,
        0.4,
    );
    let body = serde_json::to_string(&output).expect("output should serialize");
    let stub = StubHttp::start(200, body, Duration::ZERO).await;
    let reasoner = HttpReasoner::new(
        ReasonerName::Risk,
        build_http_client(Duration::from_secs(2)).expect("client should build"),
        format!("{}/evaluate", stub.url),
        hair_trigger_breakers(60_000),
    );

    let answer = reasoner
        .evaluate(&reasoner_input("corr-remote-ok", Duration::from_secs(2)))
        .await
        .expect("remote reasoner should answer");
    assert_eq!(answer, output);

    let heads = stub.heads();
    let head = heads.first().expect("request should have reached the stub");
    assert!(head.starts_with("post /evaluate "), "unexpected head: {head}");
    assert!(head.contains("x-correlation-id: corr-remote-ok"));
    assert!(head.contains("x-request-id: "));
}

#[tokio::test]
async fn remote_reasoner_past_its_deadline_times_out_and_trips_breaker() {
    let stub = StubHttp::start(200, "{}", Duration::from_millis(500)).await;
    let breakers = hair_trigger_breakers(60_000);
    let reasoner = HttpReasoner::new(
        ReasonerName::Timing,
        build_http_client(Duration::from_secs(2)).expect("client should build"),
        format!("{}/evaluate", stub.url),
        breakers.clone(),
    );

    let err = reasoner
        .evaluate(&reasoner_input("corr-remote-slow", Duration::from_millis(50)))
        .await
        .expect_err("slow remote reasoner should time out");
    assert_eq!(err.kind, ReasonerErrorKind::Timeout);
    assert_eq!(breakers.phase("reasoner:timing"), BreakerPhase::Open);

    let refused = reasoner
        .evaluate(&reasoner_input("corr-remote-refused", Duration::from_secs(2)))
        .await
        .expect_err("open breaker should refuse the call");
    assert_eq!(refused.kind, ReasonerErrorKind::CircuitOpen);
    assert_eq!(stub.heads().len(), 1);
}

#[tokio::test]
async fn remote_reasoner_error_status_is_a_transport_failure() {
    let stub = StubHttp::start(503, r#"{"error":"overloaded"}"#, Duration::ZERO).await;
    let reasoner = HttpReasoner::new(
        ReasonerName::Viability,
        build_http_client(Duration::from_secs(2)).expect("client should build"),
        format!("{}/evaluate", stub.url),
        hair_trigger_breakers(60_000),
    );

    let err = reasoner
        .evaluate(&reasoner_input("corr-remote-503", Duration::from_secs(2)))
        .await
        .expect_err("503 should fail");
    assert_eq!(err.kind, ReasonerErrorKind::Transport);
}
