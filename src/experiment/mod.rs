//! Experiment declarations and the participation record schema.
//!
//! ## Schema Overview
//!
//! ```text
//! ExperimentDefinition (1) ──< ParticipationRecord (N per experiment)
//!                                  key: (experiment name, client id)
//!                                  at most one per key after any engine call
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use sixpack_participation::experiment::{
//!     ExperimentDefinition, Identity, ParticipantKey, ParticipationRecord, RecordId,
//! };
//!
//! struct Account {
//!     uuid: String,
//! }
//!
//! let definition = ExperimentDefinition::builder("PricingPageTest")
//!     .alternatives(["CONTROL", "ANNUAL_FIRST"])
//!     .identity(Identity::new("uuid", |a: &Account| Some(a.uuid.clone())))
//!     .build()?;
//!
//! let client_id = definition.client_id(&Account { uuid: "a-1".into() })?;
//! let key = ParticipantKey::new(definition.name(), client_id);
//!
//! let mut record = ParticipationRecord::new(RecordId(1), key, "CONTROL");
//! record.mark_converted();
//! assert!(record.converted());
//! # Ok::<(), sixpack_participation::Error>(())
//! ```

mod definition;
mod participation_record;

pub use definition::{
    derive_name, Alternatives, ExperimentDefinition, ExperimentDefinitionBuilder, Identity,
};
pub use participation_record::{
    NewParticipation, ParticipantKey, ParticipationRecord, ParticipationRecordBuilder, RecordId,
};
