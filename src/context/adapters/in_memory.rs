use std::{collections::BTreeMap, fs, path::Path, sync::Arc};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    context::{
        error::{ContextError, not_found},
        ports::{IdentityGraphPort, PreferenceEnginePort},
        types::{IdentityRecord, MemoryRecord, SoftConstraint},
    },
    memory::MemoryLog,
    types::{CallContext, CreatorId},
};

#[derive(Debug, Clone, Default)]
pub struct InMemoryIdentityGraph {
    records: BTreeMap<CreatorId, IdentityRecord>,
}

impl InMemoryIdentityGraph {
    pub fn new(records: impl IntoIterator<Item = IdentityRecord>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|record| (record.snapshot.creator_id.clone(), record))
                .collect(),
        }
    }
}

#[async_trait]
impl IdentityGraphPort for InMemoryIdentityGraph {
    async fn get_snapshot(
        &self,
        _call: &CallContext,
        creator_id: &CreatorId,
    ) -> Result<IdentityRecord, ContextError> {
        self.records
            .get(creator_id)
            .cloned()
            .ok_or_else(|| not_found(format!("no identity snapshot for creator '{creator_id}'")))
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryPreferenceEngine {
    modifiers: BTreeMap<CreatorId, Vec<SoftConstraint>>,
}

impl InMemoryPreferenceEngine {
    pub fn new(modifiers: BTreeMap<CreatorId, Vec<SoftConstraint>>) -> Self {
        Self { modifiers }
    }
}

#[async_trait]
impl PreferenceEnginePort for InMemoryPreferenceEngine {
    async fn get_modifiers(
        &self,
        _call: &CallContext,
        creator_id: &CreatorId,
    ) -> Result<Vec<SoftConstraint>, ContextError> {
        Ok(self.modifiers.get(creator_id).cloned().unwrap_or_default())
    }
}

/// Seed data for running the core without the external context services.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextFixtures {
    #[serde(default)]
    pub identities: Vec<IdentityRecord>,
    #[serde(default)]
    pub preferences: BTreeMap<CreatorId, Vec<SoftConstraint>>,
    #[serde(default)]
    pub memories: BTreeMap<CreatorId, Vec<MemoryRecord>>,
}

impl ContextFixtures {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read context fixtures {}", path.display()))?;
        json5::from_str(&content)
            .with_context(|| format!("failed to parse context fixtures {}", path.display()))
    }

    pub fn into_ports(
        self,
    ) -> (
        Arc<InMemoryIdentityGraph>,
        Arc<InMemoryPreferenceEngine>,
        Arc<MemoryLog>,
    ) {
        let memory = MemoryLog::new();
        for (creator_id, records) in self.memories {
            for record in records {
                memory.append(&creator_id, record);
            }
        }
        (
            Arc::new(InMemoryIdentityGraph::new(self.identities)),
            Arc::new(InMemoryPreferenceEngine::new(self.preferences)),
            Arc::new(memory),
        )
    }
}
