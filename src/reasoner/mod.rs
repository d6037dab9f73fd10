pub mod builtin;
pub mod error;
pub mod ports;
pub mod registry;
pub mod remote;
pub mod types;

pub use error::{ReasonerError, ReasonerErrorKind};
pub use ports::{Reasoner, ReasonerInput};
pub use registry::{ReasonerBackendConfig, ReasonerRegistry, ReasonersConfig};
pub use remote::HttpReasoner;
pub use types::{
    CounterfactualComparison, CounterfactualOption, FatigueLevel, FatigueSignal, OutputOrigin,
    PostingWindow, ReasonerName, ReasonerOutput, RiskBand, RiskLevel, Signal, TimingSignal,
    ViabilitySignal,
};
