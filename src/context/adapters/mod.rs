pub mod http;
pub mod in_memory;

pub use http::{HttpIdentityGraph, HttpMemoryService, HttpPreferenceEngine, build_http_client};
pub use in_memory::{ContextFixtures, InMemoryIdentityGraph, InMemoryPreferenceEngine};
