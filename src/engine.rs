//! Participation engine: bucket decisions, sticky caching, conversions.
//!
//! ## Decision order
//!
//! 1. A valid `force` always wins, even over a successful remote answer.
//! 2. Otherwise the remote service decides. If it is unreachable the
//!    engine falls back to the control alternative; if it is simply not
//!    configured, a valid suggested bucket is used before the control.
//! 3. With local caching, the first-created record for the subject is
//!    authoritative and every call trims later duplicates.
//!
//! Remote failures never reach the caller: `participate` always yields an
//! alternative and `convert` yields `false`.

use crate::config::{EngineConfig, ResolvedMode};
use crate::error::{RemoteError, RemoteErrorKind};
use crate::experiment::{
    ExperimentDefinition, NewParticipation, ParticipantKey, ParticipationRecord,
};
use crate::remote::{
    AssignmentService, ConvertRequest, HttpAssignmentService, ParticipateRequest, Session,
};
use crate::store::ParticipationStore;
use crate::{Error, Result};

/// Per-call participation options.
///
/// ```rust
/// use sixpack_participation::ParticipateOptions;
///
/// let options = ParticipateOptions::new()
///     .force("SECOND")
///     .user_agent("Mozilla/5.0")
///     .ip_address("203.0.113.7");
/// assert_eq!(options.force.as_deref(), Some("SECOND"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParticipateOptions {
    /// Override naming the alternative to return; ignored if undeclared
    pub force: Option<String>,
    /// Bucket suggested by the caller
    pub bucket: Option<String>,
    /// Subject user agent, forwarded to the remote service
    pub user_agent: Option<String>,
    /// Subject IP address, forwarded to the remote service
    pub ip_address: Option<String>,
}

impl ParticipateOptions {
    /// No force, no suggestion, no request metadata.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Force an alternative.
    #[must_use]
    pub fn force(mut self, force: impl Into<String>) -> Self {
        self.force = Some(force.into());
        self
    }

    /// Suggest a bucket.
    #[must_use]
    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    /// Set the user agent.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Set the IP address.
    #[must_use]
    pub fn ip_address(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }
}

/// Decides, caches, and converts experiment participations.
///
/// Generic over the local store and the remote service so either can be
/// swapped (database-backed store, test doubles).
#[derive(Debug)]
pub struct ParticipationEngine<St, R> {
    config: EngineConfig,
    store: St,
    remote: R,
}

impl<St: ParticipationStore> ParticipationEngine<St, HttpAssignmentService> {
    /// Engine talking HTTP to a Sixpack-compatible service.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if the config is invalid or the HTTP
    /// client cannot be built.
    pub fn http(config: EngineConfig, store: St) -> Result<Self> {
        Self::new(config, store, HttpAssignmentService::new()?)
    }
}

impl<St: ParticipationStore, R: AssignmentService> ParticipationEngine<St, R> {
    /// Create an engine.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if `config` fails validation.
    pub fn new(config: EngineConfig, store: St, remote: R) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            remote,
        })
    }

    /// Get the engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Get the local participation store.
    #[must_use]
    pub const fn store(&self) -> &St {
        &self.store
    }

    /// Get the remote assignment service.
    #[must_use]
    pub const fn remote(&self) -> &R {
        &self.remote
    }

    /// Choose an alternative for `subject`.
    ///
    /// # Errors
    ///
    /// - `Error::Configuration` if the experiment declares no alternatives
    ///   or has no identity attribute
    /// - `Error::Identity` if the subject has no usable identifier
    /// - `Error::Storage` if the local store fails
    ///
    /// Remote failures are not errors; they select the fallback.
    pub async fn participate<S>(
        &self,
        definition: &ExperimentDefinition<S>,
        subject: &S,
        options: &ParticipateOptions,
    ) -> Result<String> {
        let control = definition.control().ok_or_else(|| {
            Error::Configuration(format!(
                "experiment {:?} has no alternatives defined",
                definition.name()
            ))
        })?;
        let forced = options
            .force
            .as_deref()
            .and_then(|force| definition.alternative(force));
        let mode = self.config.resolve(definition);

        if !mode.remote_enabled() && !mode.local_caching {
            return Ok(forced.unwrap_or(control).to_string());
        }

        let client_id = definition.client_id(subject)?;
        let decided = match self
            .remote_participate(definition, &mode, &client_id, options)
            .await
        {
            Ok(name) => name,
            Err(err) => {
                let fallback = if err.kind() == RemoteErrorKind::NotConfigured {
                    tracing::debug!(
                        experiment = definition.name(),
                        client_id = %client_id,
                        "No remote host; deciding locally"
                    );
                    options
                        .bucket
                        .as_deref()
                        .and_then(|bucket| definition.alternative(bucket))
                        .unwrap_or(control)
                } else {
                    tracing::warn!(
                        experiment = definition.name(),
                        client_id = %client_id,
                        kind = %err.kind(),
                        error = %err,
                        "Error while trying to participate; falling back"
                    );
                    control
                };
                fallback.to_string()
            }
        };
        let candidate = forced.map_or(decided, str::to_string);

        if !mode.local_caching || options.force.is_some() {
            return Ok(candidate);
        }

        let key = ParticipantKey::new(definition.name(), client_id);
        self.reconcile(definition, &key, candidate).await
    }

    /// Look up the cached bucket for `subject` without contacting the
    /// remote service. Trims duplicate records as a side effect.
    ///
    /// # Errors
    ///
    /// - `Error::Configuration` / `Error::Identity` as for [`Self::participate`]
    /// - `Error::Storage` if the local store fails
    pub async fn participant_bucket<S>(
        &self,
        definition: &ExperimentDefinition<S>,
        subject: &S,
    ) -> Result<Option<String>> {
        let client_id = definition.client_id(subject)?;
        let key = ParticipantKey::new(definition.name(), client_id);
        let record = self.trim_duplicates(&key).await?;
        Ok(record.map(|r| r.bucket().to_string()))
    }

    /// Record a conversion for `subject`.
    ///
    /// Returns `true` when the remote service acknowledged the conversion
    /// with status `"ok"`, or when remote is disabled. Remote failures
    /// return `false`. The cached record, if any, is marked converted
    /// whenever local caching is enabled.
    ///
    /// # Errors
    ///
    /// - `Error::Configuration` / `Error::Identity` as for [`Self::participate`];
    ///   with remote disabled a subject without an identifier is not an error
    /// - `Error::Storage` if the local store fails
    pub async fn convert<S>(
        &self,
        definition: &ExperimentDefinition<S>,
        subject: &S,
        kpi: Option<&str>,
    ) -> Result<bool> {
        let mode = self.config.resolve(definition);
        if !mode.remote_enabled() {
            if mode.local_caching {
                self.convert_locally(definition, subject).await?;
            }
            return Ok(true);
        }

        let client_id = definition.client_id(subject)?;

        if mode.local_caching {
            let key = ParticipantKey::new(definition.name(), client_id.clone());
            self.mark_converted(&key).await?;
        }

        let Ok(session) = self.session(&mode, &client_id, None, None) else {
            return Ok(true);
        };
        let request = ConvertRequest {
            experiment: definition.name().to_string(),
            kpi: kpi.map(str::to_string),
        };

        match self.remote.convert(&session, &request).await {
            Ok(response) if response.is_ok() => Ok(true),
            Ok(response) => {
                tracing::warn!(
                    experiment = definition.name(),
                    client_id = %client_id,
                    status = %response.status,
                    "Conversion not acknowledged"
                );
                Ok(false)
            }
            Err(err) => {
                tracing::warn!(
                    experiment = definition.name(),
                    client_id = %client_id,
                    kind = %err.kind(),
                    error = %err,
                    "Error while trying to convert"
                );
                Ok(false)
            }
        }
    }

    fn session(
        &self,
        mode: &ResolvedMode,
        client_id: &str,
        user_agent: Option<String>,
        ip_address: Option<String>,
    ) -> std::result::Result<Session, RemoteError> {
        let host = mode.host.as_deref().ok_or_else(RemoteError::not_configured)?;
        Ok(Session::new(host, mode.timeout, client_id)
            .with_user_agent(user_agent)
            .with_ip_address(ip_address))
    }

    async fn remote_participate<S>(
        &self,
        definition: &ExperimentDefinition<S>,
        mode: &ResolvedMode,
        client_id: &str,
        options: &ParticipateOptions,
    ) -> std::result::Result<String, RemoteError> {
        let session = self.session(
            mode,
            client_id,
            options.user_agent.clone(),
            options.ip_address.clone(),
        )?;
        let request = ParticipateRequest {
            experiment: definition.name().to_string(),
            alternatives: definition.alternatives().as_slice().to_vec(),
            force: options.force.clone(),
            prefetch: mode.prefetch(),
            bucket: options.bucket.clone(),
        };

        let response = self.remote.participate(&session, &request).await?;
        let name = response.alternative_name();
        definition
            .alternative(name)
            .map(str::to_string)
            .ok_or_else(|| {
                RemoteError::protocol(format!("service chose undeclared alternative {name:?}"))
            })
    }

    /// Create-if-missing, trim, and return the authoritative bucket.
    async fn reconcile<S>(
        &self,
        definition: &ExperimentDefinition<S>,
        key: &ParticipantKey,
        candidate: String,
    ) -> Result<String> {
        if self.store.find_one(key).await?.is_none() {
            self.store
                .create(NewParticipation::new(key.clone(), candidate.clone()))
                .await?;
        }

        let Some(record) = self.trim_duplicates(key).await? else {
            // Another writer trimmed and deleted between our create and scan.
            return Ok(candidate);
        };

        if definition.alternative(record.bucket()).is_none() {
            tracing::warn!(
                participant = %key,
                bucket = record.bucket(),
                candidate = %candidate,
                "Cached bucket is no longer a declared alternative; replacing it"
            );
            self.store.delete(record.id()).await?;
            self.store
                .create(NewParticipation::new(key.clone(), candidate.clone()))
                .await?;
            let replaced = self.trim_duplicates(key).await?;
            return Ok(replaced
                .map(|r| r.bucket().to_string())
                .filter(|bucket| definition.alternative(bucket).is_some())
                .unwrap_or(candidate));
        }

        if record.bucket() != candidate {
            tracing::debug!(
                participant = %key,
                cached = record.bucket(),
                candidate = %candidate,
                "Using cached bucket"
            );
        }
        Ok(record.bucket().to_string())
    }

    /// Delete every record for `key` after the first-created one.
    async fn trim_duplicates(&self, key: &ParticipantKey) -> Result<Option<ParticipationRecord>> {
        let mut records = self.store.find_all(key).await?.into_iter();
        let Some(first) = records.next() else {
            return Ok(None);
        };

        let mut removed = 0usize;
        for duplicate in records {
            self.store.delete(duplicate.id()).await?;
            removed += 1;
        }
        if removed > 0 {
            tracing::info!(
                participant = %key,
                removed,
                kept = %first.id(),
                "Removed duplicate participation records"
            );
        }
        Ok(Some(first))
    }

    /// Mark the cached record when no remote is configured.
    ///
    /// A subject without a usable identifier cannot have a cached record,
    /// so the conversion is a no-op for it.
    async fn convert_locally<S>(
        &self,
        definition: &ExperimentDefinition<S>,
        subject: &S,
    ) -> Result<()> {
        match definition.client_id(subject) {
            Ok(client_id) => {
                let key = ParticipantKey::new(definition.name(), client_id);
                self.mark_converted(&key).await
            }
            Err(Error::Identity(reason)) => {
                tracing::debug!(
                    experiment = definition.name(),
                    reason = %reason,
                    "Local conversion skipped; subject has no identifier"
                );
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn mark_converted(&self, key: &ParticipantKey) -> Result<()> {
        let Some(mut record) = self.trim_duplicates(key).await? else {
            tracing::debug!(
                participant = %key,
                "Conversion before participation; nothing cached"
            );
            return Ok(());
        };
        if !record.converted() {
            record.mark_converted();
            self.store.update(&record).await?;
        }
        Ok(())
    }
}
