use std::fmt;

use crate::reasoner::types::ReasonerName;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonerErrorKind {
    Timeout,
    Failed,
    Transport,
    ContractViolation,
    CircuitOpen,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasonerError {
    pub kind: ReasonerErrorKind,
    pub reasoner: ReasonerName,
    pub message: String,
}

impl ReasonerError {
    pub fn new(
        kind: ReasonerErrorKind,
        reasoner: ReasonerName,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            reasoner,
            message: message.into(),
        }
    }

    pub fn counts_toward_breaker(&self) -> bool {
        matches!(
            self.kind,
            ReasonerErrorKind::Timeout | ReasonerErrorKind::Transport
        )
    }
}

impl fmt::Display for ReasonerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (reasoner={})", self.message, self.reasoner)
    }
}

impl std::error::Error for ReasonerError {}

pub fn failed(reasoner: ReasonerName, message: impl Into<String>) -> ReasonerError {
    ReasonerError::new(ReasonerErrorKind::Failed, reasoner, message)
}

pub fn contract_violation(reasoner: ReasonerName, message: impl Into<String>) -> ReasonerError {
    ReasonerError::new(ReasonerErrorKind::ContractViolation, reasoner, message)
}
