pub mod error;
pub mod runtime;
pub mod types;

pub use error::{OrchestrationError, OrchestrationErrorKind};
pub use runtime::{Orchestrator, OrchestratorEvent, OrchestratorHook};
pub use types::{DecisionBundle, OrchestratorConfig};
