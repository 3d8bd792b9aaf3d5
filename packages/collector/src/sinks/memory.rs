//! In-memory sink for dry runs and testing.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::RwLock;

use crate::error::SinkResult;
use crate::types::record::ScrapedRecord;

use super::{PersistOutcome, PersistTarget, RecordSink};

/// Buffers records in process memory, deduplicated by mapping hash.
///
/// Data is lost when the sink is dropped, which is the point: dry
/// runs get real persist semantics without touching disk.
pub struct MemorySink {
    records: RwLock<Vec<ScrapedRecord>>,
    seen: RwLock<HashSet<String>>,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            seen: RwLock::new(HashSet::new()),
        }
    }

    /// Snapshot of everything persisted so far.
    pub fn records(&self) -> Vec<ScrapedRecord> {
        self.records.read().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.records.write().unwrap().clear();
        self.seen.write().unwrap().clear();
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn persist(
        &self,
        records: &[ScrapedRecord],
        _target: &PersistTarget,
    ) -> SinkResult<PersistOutcome> {
        let mut outcome = PersistOutcome::default();
        let mut seen = self.seen.write().unwrap();
        let mut stored = self.records.write().unwrap();

        for record in records {
            if seen.insert(record.mapping_hash()) {
                stored.push(record.clone());
                outcome.written += 1;
            } else {
                outcome.skipped += 1;
            }
        }
        Ok(outcome)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
