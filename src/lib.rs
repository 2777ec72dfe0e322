//! # sixpack-participation: Experiment Participation Engine
//!
//! Decides which alternative of an A/B experiment a subject sees, keeps that
//! decision sticky in a local store, and records conversions, while
//! tolerating an unavailable remote assignment service.
//!
//! ## Design Principles
//!
//! - **Always answer**: remote failures fall back to `force` or the control
//!   alternative; only misconfiguration and unusable identities are errors
//! - **Sticky assignment**: with local caching, the first-created record for
//!   a subject decides every later call
//! - **Self-healing cache**: the store has no unique index, so every read
//!   and write path trims duplicate records back to the first one
//! - **Explicit configuration**: hosts, timeouts, and per-experiment modes
//!   come from an [`EngineConfig`] passed at construction
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use sixpack_participation::experiment::{ExperimentDefinition, Identity};
//! use sixpack_participation::store::MemoryParticipationStore;
//! use sixpack_participation::{EngineConfig, ParticipateOptions, ParticipationEngine};
//!
//! struct User {
//!     id: u64,
//! }
//!
//! # async fn example() -> sixpack_participation::Result<()> {
//! let engine = ParticipationEngine::http(
//!     EngineConfig::remote("http://localhost:5000"),
//!     MemoryParticipationStore::new(),
//! )?;
//!
//! let definition = ExperimentDefinition::builder("ButtonColorTest")
//!     .alternatives(["RED", "BLUE"])
//!     .identity(Identity::new("id", |u: &User| Some(u.id.to_string())))
//!     .local_caching(true)
//!     .build()?;
//!
//! let user = User { id: 42 };
//! let color = engine
//!     .participate(&definition, &user, &ParticipateOptions::new())
//!     .await?;
//! println!("showing {color}");
//!
//! let acknowledged = engine.convert(&definition, &user, Some("signup")).await?;
//! # let _ = acknowledged;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod engine;
pub mod error;
pub mod experiment;
pub mod remote;
pub mod store;

pub use config::{EngineConfig, ExperimentSettings, ResolvedMode};
pub use engine::{ParticipateOptions, ParticipationEngine};
pub use error::{Error, RemoteError, RemoteErrorKind, Result};
