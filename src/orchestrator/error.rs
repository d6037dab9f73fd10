use std::fmt;

use serde::{Deserialize, Serialize};

use crate::context::{ContextError, ContextErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationErrorKind {
    MissingCorrelationId,
    InvalidRequest,
    ContextUnavailable,
    UnknownRequest,
    Cancelled,
}

impl OrchestrationErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingCorrelationId => "missing_correlation_id",
            Self::InvalidRequest => "invalid_request",
            Self::ContextUnavailable => "context_unavailable",
            Self::UnknownRequest => "unknown_request",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrchestrationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct OrchestrationError {
    pub kind: OrchestrationErrorKind,
    pub message: String,
}

impl OrchestrationError {
    pub fn new(kind: OrchestrationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<ContextError> for OrchestrationError {
    fn from(err: ContextError) -> Self {
        match err.kind {
            ContextErrorKind::Cancelled => cancelled(err.to_string()),
            _ => context_unavailable(err.to_string()),
        }
    }
}

pub fn missing_correlation_id(message: impl Into<String>) -> OrchestrationError {
    OrchestrationError::new(OrchestrationErrorKind::MissingCorrelationId, message)
}

pub fn invalid_request(message: impl Into<String>) -> OrchestrationError {
    OrchestrationError::new(OrchestrationErrorKind::InvalidRequest, message)
}

pub fn context_unavailable(message: impl Into<String>) -> OrchestrationError {
    OrchestrationError::new(OrchestrationErrorKind::ContextUnavailable, message)
}

pub fn unknown_request(message: impl Into<String>) -> OrchestrationError {
    OrchestrationError::new(OrchestrationErrorKind::UnknownRequest, message)
}

pub fn cancelled(message: impl Into<String>) -> OrchestrationError {
    OrchestrationError::new(OrchestrationErrorKind::Cancelled, message)
}
