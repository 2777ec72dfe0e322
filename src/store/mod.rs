//! Participation Store Module
//!
//! The local cache behind sticky assignment. A store offers plain
//! create/query/update/delete operations and no uniqueness constraint;
//! the engine converges duplicates itself.
//!
//! # Example
//!
//! ```rust,no_run
//! use sixpack_participation::experiment::{NewParticipation, ParticipantKey};
//! use sixpack_participation::store::{MemoryParticipationStore, ParticipationStore};
//!
//! # async fn example() -> sixpack_participation::Result<()> {
//! let store = MemoryParticipationStore::new();
//! let key = ParticipantKey::new("button_color", "42");
//!
//! let record = store.create(NewParticipation::new(key.clone(), "RED")).await?;
//! assert_eq!(store.find_one(&key).await?, Some(record.clone()));
//!
//! store.delete(record.id()).await?;
//! assert!(store.find_all(&key).await?.is_empty());
//! # Ok(())
//! # }
//! ```

mod memory;

pub use memory::MemoryParticipationStore;

use crate::experiment::{NewParticipation, ParticipantKey, ParticipationRecord, RecordId};
use crate::Result;
use std::future::Future;

/// Record store for participation decisions.
///
/// Implementations may be backed by anything that can list records for a
/// key in creation order. Nothing here is transactional.
pub trait ParticipationStore: Send + Sync {
    /// Get one record for the key, or `None`.
    ///
    /// When duplicates exist, the earliest-created one is returned.
    fn find_one(
        &self,
        key: &ParticipantKey,
    ) -> impl Future<Output = Result<Option<ParticipationRecord>>> + Send {
        async move { Ok(self.find_all(key).await?.into_iter().next()) }
    }

    /// Get every record for the key, ordered by creation.
    fn find_all(
        &self,
        key: &ParticipantKey,
    ) -> impl Future<Output = Result<Vec<ParticipationRecord>>> + Send;

    /// Insert a new record and return it with its assigned ID.
    ///
    /// Never checks for an existing record with the same key.
    fn create(
        &self,
        participation: NewParticipation,
    ) -> impl Future<Output = Result<ParticipationRecord>> + Send;

    /// Persist changes to an existing record.
    ///
    /// Returns `Error::Storage` if the record no longer exists.
    fn update(&self, record: &ParticipationRecord) -> impl Future<Output = Result<()>> + Send;

    /// Delete a record by ID.
    ///
    /// No-op if the record doesn't exist.
    fn delete(&self, id: RecordId) -> impl Future<Output = Result<()>> + Send;
}
