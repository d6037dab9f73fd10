use std::{collections::BTreeMap, sync::Arc};

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{
    reasoner::{
        builtin::builtin_reasoners,
        ports::Reasoner,
        remote::HttpReasoner,
        types::ReasonerName,
    },
    reliability::CircuitBreakers,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReasonerBackendConfig {
    #[default]
    Builtin,
    Http {
        endpoint: String,
    },
}

/// Backend per reasoner slot. Slots left out of the map use the built-in reasoner.
pub type ReasonersConfig = BTreeMap<ReasonerName, ReasonerBackendConfig>;

/// Exactly one reasoner per [`ReasonerName`]. Built-ins fill every slot until
/// replaced, so lookups never miss.
#[derive(Clone)]
pub struct ReasonerRegistry {
    slots: BTreeMap<ReasonerName, Arc<dyn Reasoner>>,
}

impl ReasonerRegistry {
    pub fn with_builtin() -> Self {
        let slots = builtin_reasoners()
            .into_iter()
            .map(|reasoner| (reasoner.name(), reasoner))
            .collect();
        Self { slots }
    }

    pub fn from_config(
        config: &ReasonersConfig,
        client: &Client,
        breakers: &CircuitBreakers,
    ) -> Self {
        let mut registry = Self::with_builtin();
        for (name, backend) in config {
            match backend {
                ReasonerBackendConfig::Builtin => {}
                ReasonerBackendConfig::Http { endpoint } => {
                    tracing::info!(
                        target: "reasoner",
                        reasoner = %name,
                        endpoint = %endpoint,
                        "reasoner_bound_to_http_backend"
                    );
                    registry.replace(Arc::new(HttpReasoner::new(
                        *name,
                        client.clone(),
                        endpoint.clone(),
                        breakers.clone(),
                    )));
                }
            }
        }
        registry
    }

    /// Swaps the slot named by `reasoner.name()`, returning the previous occupant.
    pub fn replace(&mut self, reasoner: Arc<dyn Reasoner>) -> Option<Arc<dyn Reasoner>> {
        self.slots.insert(reasoner.name(), reasoner)
    }

    pub fn get(&self, name: ReasonerName) -> Option<Arc<dyn Reasoner>> {
        self.slots.get(&name).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ReasonerName, &Arc<dyn Reasoner>)> {
        self.slots.iter().map(|(name, reasoner)| (*name, reasoner))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Default for ReasonerRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}
