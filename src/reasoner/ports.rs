use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::time::Instant;

use crate::{
    context::CreatorContext,
    reasoner::{
        error::ReasonerError,
        types::{ReasonerName, ReasonerOutput},
    },
    types::Request,
};

/// Everything a reasoner may read. The context is shared read-only between all
/// reasoners of one orchestration.
#[derive(Debug, Clone)]
pub struct ReasonerInput {
    pub request: Arc<Request>,
    pub context: Arc<CreatorContext>,
    pub deadline: Instant,
    pub confidence_floor: f64,
    /// Fixed once per orchestration; recency is measured against it.
    pub evaluated_at: OffsetDateTime,
}

#[async_trait]
pub trait Reasoner: Send + Sync {
    fn name(&self) -> ReasonerName;

    async fn evaluate(&self, input: &ReasonerInput) -> Result<ReasonerOutput, ReasonerError>;
}
