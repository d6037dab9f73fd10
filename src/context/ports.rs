use async_trait::async_trait;

use crate::{
    context::{
        error::ContextError,
        types::{ContextWindow, IdentityRecord, MemoryRecord, SoftConstraint},
    },
    types::{CallContext, CreatorId},
};

#[async_trait]
pub trait IdentityGraphPort: Send + Sync {
    async fn get_snapshot(
        &self,
        call: &CallContext,
        creator_id: &CreatorId,
    ) -> Result<IdentityRecord, ContextError>;
}

#[async_trait]
pub trait PreferenceEnginePort: Send + Sync {
    async fn get_modifiers(
        &self,
        call: &CallContext,
        creator_id: &CreatorId,
    ) -> Result<Vec<SoftConstraint>, ContextError>;
}

#[async_trait]
pub trait MemoryServicePort: Send + Sync {
    async fn get_relevant_slices(
        &self,
        call: &CallContext,
        creator_id: &CreatorId,
        window: ContextWindow,
    ) -> Result<Vec<MemoryRecord>, ContextError>;
}
