use serde::{Deserialize, Serialize};

use crate::{
    gate::{GateDecision, GateStage, StrategyArtifact},
    orchestrator::{DecisionBundle, OrchestrationError, OrchestrationErrorKind},
    response::{AssembleOptions, ComparativeResponse},
    types::{CorrelationId, CreatorId, IntentType, Request, RequestId, new_request_id},
};

#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Orchestrate(Request),
    CheckGate {
        stage: GateStage,
        request_id: RequestId,
        correlation_id: CorrelationId,
    },
    RecordStrategy(StrategyArtifact),
    Assemble {
        request_id: RequestId,
        correlation_id: CorrelationId,
        options: AssembleOptions,
    },
    Exit,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireRequest {
    #[serde(default)]
    request_id: Option<RequestId>,
    creator_id: CreatorId,
    intent_type: IntentType,
    #[serde(default)]
    raw_payload: serde_json::Value,
    #[serde(default)]
    correlation_id: CorrelationId,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
enum WireMessage {
    Orchestrate {
        request: WireRequest,
    },
    CheckGate {
        stage: GateStage,
        request_id: RequestId,
        #[serde(default)]
        correlation_id: CorrelationId,
    },
    RecordStrategy {
        artifact: StrategyArtifact,
    },
    Assemble {
        request_id: RequestId,
        #[serde(default)]
        correlation_id: CorrelationId,
        #[serde(default)]
        options: AssembleOptions,
    },
    Exit {},
}

pub fn parse_client_message(line: &str) -> Result<ClientMessage, serde_json::Error> {
    let wire: WireMessage = serde_json::from_str(line)?;
    let message = match wire {
        WireMessage::Orchestrate { request } => ClientMessage::Orchestrate(Request {
            request_id: request.request_id.unwrap_or_else(new_request_id),
            creator_id: request.creator_id,
            intent_type: request.intent_type,
            raw_payload: request.raw_payload,
            correlation_id: request.correlation_id,
        }),
        WireMessage::CheckGate {
            stage,
            request_id,
            correlation_id,
        } => ClientMessage::CheckGate {
            stage,
            request_id,
            correlation_id,
        },
        WireMessage::RecordStrategy { artifact } => ClientMessage::RecordStrategy(artifact),
        WireMessage::Assemble {
            request_id,
            correlation_id,
            options,
        } => ClientMessage::Assemble {
            request_id,
            correlation_id,
            options,
        },
        WireMessage::Exit {} => ClientMessage::Exit,
    };
    Ok(message)
}

/// One line written back per request line.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerReply {
    Bundle { bundle: DecisionBundle },
    Gate { decision: GateDecision },
    StrategyRecorded { request_id: RequestId },
    Response { response: ComparativeResponse },
    Bye,
    Error {
        kind: OrchestrationErrorKind,
        message: String,
    },
}

impl ServerReply {
    pub fn error(err: OrchestrationError) -> Self {
        Self::Error {
            kind: err.kind,
            message: err.message,
        }
    }

    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}
