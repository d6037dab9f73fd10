use std::{
    collections::BTreeMap,
    ops::Bound,
    sync::{
        RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use time::{Duration, OffsetDateTime, PrimitiveDateTime};

use crate::{
    context::{
        error::ContextError,
        ports::MemoryServicePort,
        types::{ContextWindow, MemoryRecord},
    },
    types::{CallContext, CreatorId},
};

type MemoryKey = (CreatorId, OffsetDateTime, u64);

/// Append-only memory log. Records are write-once and read back by time range;
/// there is no update or delete path.
#[derive(Debug, Default)]
pub struct MemoryLog {
    entries: RwLock<BTreeMap<MemoryKey, MemoryRecord>>,
    next_seq: AtomicU64,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, creator_id: &CreatorId, record: MemoryRecord) -> u64 {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let key = (creator_id.clone(), record.recorded_at, seq);
        let mut guard = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.insert(key, record);
        seq
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records of `creator_id` in `[from, to]`, oldest first.
    pub fn range(
        &self,
        creator_id: &CreatorId,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> Vec<MemoryRecord> {
        if from > to {
            return Vec::new();
        }
        let lower = Bound::Included((creator_id.clone(), from, 0));
        let upper = Bound::Included((creator_id.clone(), to, u64::MAX));
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .range((lower, upper))
            .map(|(_, record)| record.clone())
            .collect()
    }

    /// The most recent `window.max_records` records inside the lookback window
    /// ending at `now`, oldest first.
    pub fn relevant_at(
        &self,
        creator_id: &CreatorId,
        window: ContextWindow,
        now: OffsetDateTime,
    ) -> Vec<MemoryRecord> {
        let from = now
            .checked_sub(Duration::days(i64::from(window.lookback_days)))
            .unwrap_or_else(|| PrimitiveDateTime::MIN.assume_utc());
        let mut records = self.range(creator_id, from, now);
        if records.len() > window.max_records {
            let excess = records.len() - window.max_records;
            records.drain(..excess);
        }
        records
    }
}

#[async_trait]
impl MemoryServicePort for MemoryLog {
    async fn get_relevant_slices(
        &self,
        _call: &CallContext,
        creator_id: &CreatorId,
        window: ContextWindow,
    ) -> Result<Vec<MemoryRecord>, ContextError> {
        Ok(self.relevant_at(creator_id, window, OffsetDateTime::now_utc()))
    }
}
