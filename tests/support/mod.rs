#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    future::Future,
    pin::Pin,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

use inflow::{
    audit::{AuditConfig, AuditTrail},
    context::{
        ContextError, ContextErrorKind, ContextLoader, ContextLoaderSettings, CreatorContext,
        GrowthStage, IdentityGraphPort, IdentityRecord, IdentitySnapshot, MemoryRecord,
        MemoryServicePort, PreferenceEnginePort, SoftConstraint,
        adapters::{InMemoryIdentityGraph, InMemoryPreferenceEngine},
    },
    flags::FeatureFlags,
    ledger::{DecisionLedger, LedgerConfig},
    memory::MemoryLog,
    orchestrator::{Orchestrator, OrchestratorConfig},
    reasoner::{
        Reasoner, ReasonerError, ReasonerInput, ReasonerName, ReasonerOutput, ReasonerRegistry,
    },
    reliability::{CircuitBreakers, ReliabilityConfig},
    service::DecisionService,
    types::{CallContext, CreatorId, IntentType, Request},
};

pub const CREATOR: &str = "c1";

pub type ReasonerFuture =
    Pin<Box<dyn Future<Output = Result<ReasonerOutput, ReasonerError>> + Send>>;
pub type ReasonerHook = Arc<dyn Fn(ReasonerInput) -> ReasonerFuture + Send + Sync>;

/// Reasoner whose behaviour is supplied by the test.
pub struct HookReasoner {
    name: ReasonerName,
    hook: ReasonerHook,
}

impl HookReasoner {
    pub fn new<F, Fut>(name: ReasonerName, hook: F) -> Arc<dyn Reasoner>
    where
        F: Fn(ReasonerInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ReasonerOutput, ReasonerError>> + Send + 'static,
    {
        Arc::new(Self {
            name,
            hook: Arc::new(move |input| Box::pin(hook(input))),
        })
    }
}

#[async_trait]
impl Reasoner for HookReasoner {
    fn name(&self) -> ReasonerName {
        self.name
    }

    async fn evaluate(&self, input: &ReasonerInput) -> Result<ReasonerOutput, ReasonerError> {
        (self.hook)(input.clone()).await
    }
}

/// Decrements the shared counter when the owning future is dropped, whether it
/// finished or was aborted.
pub struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    pub fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct SlowPreferenceEngine {
    pub delay: Duration,
}

#[async_trait]
impl PreferenceEnginePort for SlowPreferenceEngine {
    async fn get_modifiers(
        &self,
        _call: &CallContext,
        _creator_id: &CreatorId,
    ) -> Result<Vec<SoftConstraint>, ContextError> {
        tokio::time::sleep(self.delay).await;
        Ok(Vec::new())
    }
}

pub struct UnavailableIdentityGraph;

#[async_trait]
impl IdentityGraphPort for UnavailableIdentityGraph {
    async fn get_snapshot(
        &self,
        _call: &CallContext,
        _creator_id: &CreatorId,
    ) -> Result<IdentityRecord, ContextError> {
        Err(ContextError::new(
            ContextErrorKind::Unavailable,
            "identity graph is down",
        ))
    }
}

#[derive(Default)]
pub struct CountingPreferenceEngine {
    pub calls: AtomicUsize,
}

#[async_trait]
impl PreferenceEnginePort for CountingPreferenceEngine {
    async fn get_modifiers(
        &self,
        _call: &CallContext,
        _creator_id: &CreatorId,
    ) -> Result<Vec<SoftConstraint>, ContextError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

pub fn identity(creator_id: &str, confidence: f64) -> IdentityRecord {
    IdentityRecord {
        snapshot: IdentitySnapshot {
            creator_id: creator_id.to_string(),
            platforms: vec!["instagram".to_string(), "tiktok".to_string()],
            formats: vec!["reel".to_string(), "carousel".to_string()],
            cadence_per_week: 3.0,
            topic_clusters: vec!["cooking".to_string(), "travel".to_string()],
            tone: Some("playful".to_string()),
            growth_stage: GrowthStage::Growing,
        },
        confidence,
    }
}

pub fn identity_graph(confidence: f64) -> Arc<InMemoryIdentityGraph> {
    Arc::new(InMemoryIdentityGraph::new([identity(CREATOR, confidence)]))
}

pub fn preference_engine() -> Arc<InMemoryPreferenceEngine> {
    let mut modifiers = BTreeMap::new();
    modifiers.insert(
        CREATOR.to_string(),
        vec![SoftConstraint::PreferTopic {
            topic: "cooking".to_string(),
            weight: 0.8,
        }],
    );
    Arc::new(InMemoryPreferenceEngine::new(modifiers))
}

/// Recent cooking posts, dated relative to now so they stay inside the window.
pub fn memory_log() -> Arc<MemoryLog> {
    let log = MemoryLog::new();
    let now = OffsetDateTime::now_utc();
    for (days_ago, engagement) in [(3, 0.72), (10, 0.64), (17, 0.81), (24, 0.55)] {
        log.append(
            &CREATOR.to_string(),
            MemoryRecord {
                recorded_at: now - time::Duration::days(days_ago),
                topic: Some("cooking".to_string()),
                format: Some("reel".to_string()),
                platform: Some("instagram".to_string()),
                engagement: Some(engagement),
                note: None,
            },
        );
    }
    Arc::new(log)
}

pub fn loader(
    identity: Arc<dyn IdentityGraphPort>,
    preferences: Arc<dyn PreferenceEnginePort>,
    memory: Arc<dyn MemoryServicePort>,
    settings: ContextLoaderSettings,
) -> ContextLoader {
    ContextLoader::new(
        identity,
        preferences,
        memory,
        CircuitBreakers::new(ReliabilityConfig::default()),
        settings,
    )
}

/// Breakers that open on the first counted failure and stay open for `open_ms`.
pub fn hair_trigger_breakers(open_ms: u64) -> CircuitBreakers {
    CircuitBreakers::new(ReliabilityConfig {
        breaker_failure_threshold: 1,
        breaker_open_ms: open_ms,
    })
}

pub fn healthy_loader() -> ContextLoader {
    loader(
        identity_graph(0.9),
        preference_engine(),
        memory_log(),
        ContextLoaderSettings::default(),
    )
}

pub fn registry_with(reasoners: Vec<Arc<dyn Reasoner>>) -> ReasonerRegistry {
    let mut registry = ReasonerRegistry::with_builtin();
    for reasoner in reasoners {
        registry.replace(reasoner);
    }
    registry
}

pub fn orchestrator(loader: ContextLoader, registry: ReasonerRegistry) -> Orchestrator {
    Orchestrator::new(loader, registry, OrchestratorConfig::default())
}

pub fn service(orchestrator: Orchestrator, flags: FeatureFlags) -> DecisionService {
    DecisionService::new(
        orchestrator,
        Arc::new(DecisionLedger::new(&LedgerConfig::default())),
        Arc::new(AuditTrail::new(&AuditConfig::default())),
        flags,
    )
}

pub fn request(correlation_id: &str) -> Request {
    Request::new(
        CREATOR,
        IntentType::DecisionRequest,
        serde_json::json!({
            "topic": "cooking",
            "format": "reel",
            "platform": "instagram"
        }),
        correlation_id,
    )
}

pub fn creator_context(confidence: f64) -> CreatorContext {
    CreatorContext {
        identity_snapshot: identity(CREATOR, confidence).snapshot,
        confidence,
        preference_modifiers: Vec::new(),
        memory_slices: Vec::new(),
        partial: false,
        missing_sources: Vec::new(),
    }
}

/// Polls `condition` every few milliseconds until it holds or five seconds pass.
pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

/// A canned HTTP/1.1 endpoint that answers every request with the same reply
/// and keeps the lowercased request heads it saw.
pub struct StubHttp {
    pub url: String,
    heads: Arc<Mutex<Vec<String>>>,
}

impl StubHttp {
    pub async fn start(status: u16, body: impl Into<String>, delay: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("stub listener should bind");
        let addr = listener.local_addr().expect("stub listener should have an address");
        let body = body.into();
        let heads = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&heads);

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let seen = Arc::clone(&seen);
                let body = body.clone();
                tokio::spawn(async move {
                    let Some(head) = read_request_head(&mut stream).await else {
                        return;
                    };
                    seen.lock().expect("stub lock should not be poisoned").push(head);
                    tokio::time::sleep(delay).await;
                    let reply = format!(
                        "HTTP/1.1 {status} Stub\r\ncontent-type: application/json\r\n\
                         content-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = stream.write_all(reply.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        Self {
            url: format!("http://{addr}"),
            heads,
        }
    }

    pub fn heads(&self) -> Vec<String> {
        self.heads
            .lock()
            .expect("stub lock should not be poisoned")
            .clone()
    }
}

/// Reads one request, draining its body, and returns the head lowercased.
async fn read_request_head(stream: &mut TcpStream) -> Option<String> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];
    let head_end = loop {
        if let Some(at) = buffer.windows(4).position(|window| window == b"\r\n\r\n") {
            break at + 4;
        }
        let read = stream.read(&mut chunk).await.ok()?;
        if read == 0 {
            return None;
        }
        buffer.extend_from_slice(&chunk[..read]);
    };

    let head = String::from_utf8_lossy(&buffer[..head_end]).to_ascii_lowercase();
    let body_len = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buffer.len() < head_end + body_len {
        let read = stream.read(&mut chunk).await.ok()?;
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
    }
    Some(head)
}
