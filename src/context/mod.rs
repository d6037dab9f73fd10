pub mod adapters;
pub mod error;
pub mod loader;
pub mod ports;
pub mod types;

pub use error::{ContextError, ContextErrorKind};
pub use loader::{ContextLoader, ContextLoaderSettings};
pub use ports::{IdentityGraphPort, MemoryServicePort, PreferenceEnginePort};
pub use types::{
    ContextSource, ContextWindow, CreatorContext, GrowthStage, IdentityRecord, IdentitySnapshot,
    MemoryRecord, SoftConstraint,
};
