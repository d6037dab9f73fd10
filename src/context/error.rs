use std::fmt;

use crate::context::types::ContextSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextErrorKind {
    NotFound,
    Timeout,
    Transport,
    CircuitOpen,
    Cancelled,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextError {
    pub kind: ContextErrorKind,
    pub message: String,
    pub source: Option<ContextSource>,
}

impl ContextError {
    pub fn new(kind: ContextErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: ContextSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn counts_toward_breaker(&self) -> bool {
        matches!(
            self.kind,
            ContextErrorKind::Timeout | ContextErrorKind::Transport | ContextErrorKind::Unavailable
        )
    }
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source {
            Some(source) => write!(f, "{} (source={})", self.message, source.as_str()),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ContextError {}

pub fn not_found(message: impl Into<String>) -> ContextError {
    ContextError::new(ContextErrorKind::NotFound, message)
}

pub fn timeout(message: impl Into<String>) -> ContextError {
    ContextError::new(ContextErrorKind::Timeout, message)
}

pub fn transport(message: impl Into<String>) -> ContextError {
    ContextError::new(ContextErrorKind::Transport, message)
}

pub fn unavailable(message: impl Into<String>) -> ContextError {
    ContextError::new(ContextErrorKind::Unavailable, message)
}

pub fn cancelled(message: impl Into<String>) -> ContextError {
    ContextError::new(ContextErrorKind::Cancelled, message)
}
