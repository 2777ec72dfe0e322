//! Participation Record - cached bucket decision for one subject

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store-assigned record identifier.
///
/// Identifiers increase with creation order, so sorting by `RecordId`
/// yields the order in which records were written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Natural key of a participation record: (experiment name, client id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantKey {
    experiment_name: String,
    client_id: String,
}

impl ParticipantKey {
    /// Create a key for the given experiment and client.
    #[must_use]
    pub fn new(experiment_name: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            experiment_name: experiment_name.into(),
            client_id: client_id.into(),
        }
    }

    /// Get the experiment name.
    #[must_use]
    pub fn experiment_name(&self) -> &str {
        &self.experiment_name
    }

    /// Get the client id.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

impl fmt::Display for ParticipantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.experiment_name, self.client_id)
    }
}

/// Participation Record represents the bucket a subject was assigned to.
///
/// Exactly one record should exist per [`ParticipantKey`]; the engine
/// trims duplicates on every read and write path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipationRecord {
    id: RecordId,
    key: ParticipantKey,
    bucket: String,
    converted: bool,
    created_at: DateTime<Utc>,
    modified_at: DateTime<Utc>,
}

impl ParticipationRecord {
    /// Create an unconverted record with the current timestamp.
    ///
    /// # Arguments
    ///
    /// * `id` - Identifier assigned by the store
    /// * `key` - Experiment and client the record belongs to
    /// * `bucket` - Chosen alternative name
    #[must_use]
    pub fn new(id: RecordId, key: ParticipantKey, bucket: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            key,
            bucket: bucket.into(),
            converted: false,
            created_at: now,
            modified_at: now,
        }
    }

    /// Create a builder for constructing a record with optional fields.
    #[must_use]
    pub fn builder(
        id: RecordId,
        key: ParticipantKey,
        bucket: impl Into<String>,
    ) -> ParticipationRecordBuilder {
        ParticipationRecordBuilder::new(id, key, bucket)
    }

    /// Get the record ID.
    #[must_use]
    pub const fn id(&self) -> RecordId {
        self.id
    }

    /// Get the natural key.
    #[must_use]
    pub const fn key(&self) -> &ParticipantKey {
        &self.key
    }

    /// Get the experiment name.
    #[must_use]
    pub fn experiment_name(&self) -> &str {
        self.key.experiment_name()
    }

    /// Get the client id.
    #[must_use]
    pub fn client_id(&self) -> &str {
        self.key.client_id()
    }

    /// Get the assigned bucket.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Whether a conversion has been recorded.
    #[must_use]
    pub const fn converted(&self) -> bool {
        self.converted
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Get the last modification timestamp.
    #[must_use]
    pub const fn modified_at(&self) -> DateTime<Utc> {
        self.modified_at
    }

    /// Mark the subject converted. Sets `modified_at` to now.
    pub fn mark_converted(&mut self) {
        self.converted = true;
        self.modified_at = Utc::now();
    }
}

/// Input for creating a record; the store assigns the ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewParticipation {
    /// Experiment and client the record belongs to
    pub key: ParticipantKey,
    /// Chosen alternative name
    pub bucket: String,
}

impl NewParticipation {
    /// Create a new participation input.
    #[must_use]
    pub fn new(key: ParticipantKey, bucket: impl Into<String>) -> Self {
        Self {
            key,
            bucket: bucket.into(),
        }
    }
}

/// Builder for `ParticipationRecord`.
#[derive(Debug)]
pub struct ParticipationRecordBuilder {
    id: RecordId,
    key: ParticipantKey,
    bucket: String,
    converted: bool,
    created_at: DateTime<Utc>,
    modified_at: Option<DateTime<Utc>>,
}

impl ParticipationRecordBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(id: RecordId, key: ParticipantKey, bucket: impl Into<String>) -> Self {
        Self {
            id,
            key,
            bucket: bucket.into(),
            converted: false,
            created_at: Utc::now(),
            modified_at: None,
        }
    }

    /// Set the converted flag.
    #[must_use]
    pub const fn converted(mut self, converted: bool) -> Self {
        self.converted = converted;
        self
    }

    /// Set a custom creation timestamp (useful for loading/testing).
    #[must_use]
    pub const fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Set a custom modification timestamp. Defaults to `created_at`.
    #[must_use]
    pub const fn modified_at(mut self, modified_at: DateTime<Utc>) -> Self {
        self.modified_at = Some(modified_at);
        self
    }

    /// Build the `ParticipationRecord`.
    #[must_use]
    pub fn build(self) -> ParticipationRecord {
        ParticipationRecord {
            id: self.id,
            key: self.key,
            bucket: self.bucket,
            converted: self.converted,
            created_at: self.created_at,
            modified_at: self.modified_at.unwrap_or(self.created_at),
        }
    }
}
