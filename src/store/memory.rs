//! In-memory participation store using `DashMap`.
//!
//! Data is lost on process restart. Useful for tests, single-process
//! deployments, and as the reference backend for the store contract.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use super::ParticipationStore;
use crate::experiment::{NewParticipation, ParticipantKey, ParticipationRecord, RecordId};
use crate::{Error, Result};

/// In-memory participation store using a lock-free concurrent hashmap.
///
/// Like a plain relational table without a unique index, it happily
/// stores several records for the same key. IDs come from a monotonic
/// counter, which gives `find_all` its creation order.
#[derive(Debug)]
pub struct MemoryParticipationStore {
    records: DashMap<RecordId, ParticipationRecord>,
    next_id: AtomicU64,
}

impl MemoryParticipationStore {
    /// Create a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Get the number of records in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for MemoryParticipationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ParticipationStore for MemoryParticipationStore {
    async fn find_all(&self, key: &ParticipantKey) -> Result<Vec<ParticipationRecord>> {
        let mut matching: Vec<ParticipationRecord> = self
            .records
            .iter()
            .filter(|entry| entry.value().key() == key)
            .map(|entry| entry.value().clone())
            .collect();
        matching.sort_by_key(ParticipationRecord::id);
        Ok(matching)
    }

    async fn create(&self, participation: NewParticipation) -> Result<ParticipationRecord> {
        let id = RecordId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let record = ParticipationRecord::new(id, participation.key, participation.bucket);
        self.records.insert(id, record.clone());
        Ok(record)
    }

    async fn update(&self, record: &ParticipationRecord) -> Result<()> {
        match self.records.get_mut(&record.id()) {
            Some(mut existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(Error::Storage(format!(
                "participation record {} no longer exists",
                record.id()
            ))),
        }
    }

    async fn delete(&self, id: RecordId) -> Result<()> {
        self.records.remove(&id);
        Ok(())
    }
}
