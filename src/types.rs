use serde::{Deserialize, Serialize};

pub type RequestId = String;
pub type CreatorId = String;
pub type CorrelationId = String;

pub fn new_request_id() -> RequestId {
    uuid::Uuid::now_v7().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentType {
    DecisionRequest,
    CreationRequest,
    PlanningRequest,
    ReflectionRequest,
}

/// A classified inbound request. Constructed once and only read afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub request_id: RequestId,
    pub creator_id: CreatorId,
    pub intent_type: IntentType,
    #[serde(default)]
    pub raw_payload: serde_json::Value,
    #[serde(default)]
    pub correlation_id: CorrelationId,
}

impl Request {
    pub fn new(
        creator_id: impl Into<CreatorId>,
        intent_type: IntentType,
        raw_payload: serde_json::Value,
        correlation_id: impl Into<CorrelationId>,
    ) -> Self {
        Self {
            request_id: new_request_id(),
            creator_id: creator_id.into(),
            intent_type,
            raw_payload,
            correlation_id: correlation_id.into(),
        }
    }

    pub fn call_context(&self) -> CallContext {
        CallContext {
            request_id: self.request_id.clone(),
            correlation_id: self.correlation_id.clone(),
        }
    }

    pub fn proposal(&self) -> ContentProposal {
        ContentProposal::from_payload(&self.raw_payload)
    }
}

/// Trace identifiers attached to every call that leaves the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    pub request_id: RequestId,
    pub correlation_id: CorrelationId,
}

/// The parts of a raw payload the built-in reasoners understand. Every field is
/// optional; missing fields lower reasoner confidence instead of failing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentProposal {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub tone: Option<String>,
}

impl ContentProposal {
    pub fn from_payload(payload: &serde_json::Value) -> Self {
        let field = |name: &str| {
            payload
                .get(name)
                .and_then(|value| value.as_str())
                .map(|value| value.trim().to_ascii_lowercase())
                .filter(|value| !value.is_empty())
        };
        Self {
            topic: field("topic"),
            format: field("format"),
            platform: field("platform"),
            tone: field("tone"),
        }
    }
}

pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}
