//! Engine configuration.
//!
//! Everything the engine needs from its environment is passed in an
//! [`EngineConfig`] at construction; nothing is read from globals at call
//! time. A config can be built in code, parsed from TOML, or read from the
//! `SIXPACK_HOST` / `SIXPACK_TIMEOUT_MS` environment variables.
//!
//! ```toml
//! host = "http://sixpack.internal:5000"
//! timeout_ms = 250
//!
//! [experiments.button_color]
//! local = true
//! server_authoritative = false
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::experiment::ExperimentDefinition;
use crate::{Error, Result};

/// Conventional address of a locally running assignment service.
///
/// Never applied implicitly: a config without `host` has remote disabled.
pub const DEFAULT_HOST: &str = "http://localhost:5000";

/// Remote timeout used when none is configured.
pub const DEFAULT_TIMEOUT_MS: u64 = 500;

/// Environment variable holding the remote host.
pub const HOST_ENV: &str = "SIXPACK_HOST";

/// Environment variable holding the remote timeout in milliseconds.
pub const TIMEOUT_ENV: &str = "SIXPACK_TIMEOUT_MS";

const fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// Per-experiment overrides, keyed by derived experiment name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExperimentSettings {
    /// Cache decisions locally
    #[serde(default)]
    pub local: Option<bool>,
    /// Trust the remote service's randomization
    #[serde(default)]
    pub server_authoritative: Option<bool>,
    /// Route this experiment to another host
    #[serde(default)]
    pub host: Option<String>,
    /// Remote timeout for this experiment
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Engine-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Remote host; `None` disables remote calls
    #[serde(default)]
    pub host: Option<String>,
    /// Remote timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Per-experiment overrides
    #[serde(default)]
    pub experiments: BTreeMap<String, ExperimentSettings>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            experiments: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Config with remote calls going to `host`.
    #[must_use]
    pub fn remote(host: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
            ..Self::default()
        }
    }

    /// Set the remote timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Add overrides for one experiment.
    #[must_use]
    pub fn with_experiment(mut self, name: impl Into<String>, settings: ExperimentSettings) -> Self {
        self.experiments.insert(name.into(), settings);
        self
    }

    /// Remote timeout as a `Duration`.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Parse and validate a TOML config.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigParse` for malformed TOML and
    /// `Error::Configuration` if validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file can't be read, otherwise as
    /// [`EngineConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&raw)?;
        tracing::debug!(
            path = %path.as_ref().display(),
            remote = config.host.is_some(),
            "Loaded engine config"
        );
        Ok(config)
    }

    /// Build a config from `SIXPACK_HOST` and `SIXPACK_TIMEOUT_MS`.
    ///
    /// An empty host variable counts as unset. An unparsable or zero
    /// timeout falls back to [`DEFAULT_TIMEOUT_MS`].
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if the host is not an HTTP URL.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup(HOST_ENV)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        let timeout_ms = lookup(TIMEOUT_ENV)
            .and_then(|value| value.trim().parse::<u64>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_TIMEOUT_MS);

        let config = Self {
            host,
            timeout_ms,
            experiments: BTreeMap::new(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check hosts and timeouts.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` naming the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if let Some(host) = &self.host {
            validate_host("host", host)?;
        }
        if self.timeout_ms == 0 {
            return Err(Error::Configuration(
                "timeout_ms must be greater than 0".to_string(),
            ));
        }
        for (name, settings) in &self.experiments {
            if let Some(host) = &settings.host {
                validate_host(&format!("experiments.{name}.host"), host)?;
            }
            if settings.timeout_ms == Some(0) {
                return Err(Error::Configuration(format!(
                    "experiments.{name}.timeout_ms must be greater than 0"
                )));
            }
        }
        Ok(())
    }

    /// Resolve the effective operating mode for a definition.
    ///
    /// Precedence: per-experiment config entry, then the definition's own
    /// declaration, then the engine-wide values.
    #[must_use]
    pub fn resolve<S>(&self, definition: &ExperimentDefinition<S>) -> ResolvedMode {
        let settings = self.experiments.get(definition.name());

        let host = settings
            .and_then(|s| s.host.clone())
            .or_else(|| definition.host().map(str::to_string))
            .or_else(|| self.host.clone());
        let timeout = settings
            .and_then(|s| s.timeout_ms)
            .map(Duration::from_millis)
            .or_else(|| definition.timeout())
            .unwrap_or_else(|| self.timeout());
        let local_caching = settings
            .and_then(|s| s.local)
            .unwrap_or_else(|| definition.local_caching());
        let server_authoritative = settings
            .and_then(|s| s.server_authoritative)
            .unwrap_or_else(|| definition.server_authoritative());

        ResolvedMode {
            host,
            timeout,
            local_caching,
            server_authoritative,
        }
    }
}

pub(crate) fn validate_host(field: &str, host: &str) -> Result<()> {
    let host = host.trim();
    if host.is_empty() {
        return Err(Error::Configuration(format!("{field} must not be empty")));
    }
    if !(host.starts_with("http://") || host.starts_with("https://")) {
        return Err(Error::Configuration(format!(
            "{field} must start with http:// or https://, got {host:?}"
        )));
    }
    Ok(())
}

/// Effective mode of one experiment after applying configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMode {
    /// Remote host; `None` means remote is disabled
    pub host: Option<String>,
    /// Remote timeout
    pub timeout: Duration,
    /// Cache decisions locally
    pub local_caching: bool,
    /// Trust the remote service's randomization
    pub server_authoritative: bool,
}

impl ResolvedMode {
    /// Whether a remote host is configured.
    #[must_use]
    pub const fn remote_enabled(&self) -> bool {
        self.host.is_some()
    }

    /// Whether the remote call should only register the event.
    ///
    /// Set when this engine, not the service, owns the bucket decision.
    #[must_use]
    pub const fn prefetch(&self) -> bool {
        self.local_caching && !self.server_authoritative
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Subject;

    fn definition() -> ExperimentDefinition<Subject> {
        ExperimentDefinition::builder("ButtonColorTest")
            .alternatives(["RED", "BLUE"])
            .build()
            .unwrap()
    }

    #[test]
    fn test_default_config_disables_remote() {
        let config = EngineConfig::default();
        assert!(config.host.is_none());
        assert_eq!(config.timeout(), Duration::from_millis(DEFAULT_TIMEOUT_MS));
        assert!(!config.resolve(&definition()).remote_enabled());
    }

    #[test]
    fn test_from_toml_str() {
        let config = EngineConfig::from_toml_str(
            r#"
            host = "http://sixpack.internal:5000"
            timeout_ms = 250

            [experiments.button_color]
            local = true
            server_authoritative = false
            "#,
        )
        .unwrap();

        assert_eq!(config.host.as_deref(), Some("http://sixpack.internal:5000"));
        assert_eq!(config.timeout_ms, 250);

        let mode = config.resolve(&definition());
        assert!(mode.remote_enabled());
        assert!(mode.local_caching);
        assert!(mode.prefetch());
        assert_eq!(mode.timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_from_toml_str_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_from_toml_str_rejects_unknown_keys() {
        let err = EngineConfig::from_toml_str("hots = \"http://x\"").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[test]
    fn test_validate_rejects_bad_host_and_timeout() {
        let err = EngineConfig::remote("sixpack:5000").validate().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let err = EngineConfig::remote("   ").validate().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let config = EngineConfig {
            timeout_ms: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));

        let config = EngineConfig::default().with_experiment(
            "x",
            ExperimentSettings {
                timeout_ms: Some(0),
                ..ExperimentSettings::default()
            },
        );
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_from_lookup() {
        let config = EngineConfig::from_lookup(|name| match name {
            HOST_ENV => Some(" http://sixpack:5000 ".to_string()),
            TIMEOUT_ENV => Some("750".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.host.as_deref(), Some("http://sixpack:5000"));
        assert_eq!(config.timeout_ms, 750);
    }

    #[test]
    fn test_from_lookup_empty_host_and_bad_timeout() {
        let config = EngineConfig::from_lookup(|name| match name {
            HOST_ENV => Some(String::new()),
            TIMEOUT_ENV => Some("soon".to_string()),
            _ => None,
        })
        .unwrap();
        assert!(config.host.is_none());
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
    }

    #[test]
    fn test_resolve_precedence() {
        let definition = ExperimentDefinition::<Subject>::builder("ButtonColorTest")
            .alternatives(["RED", "BLUE"])
            .host("http://definition:5000")
            .timeout(Duration::from_millis(900))
            .local_caching(true)
            .build()
            .unwrap();

        // Definition beats engine-wide values
        let config = EngineConfig::remote("http://engine:5000");
        let mode = config.resolve(&definition);
        assert_eq!(mode.host.as_deref(), Some("http://definition:5000"));
        assert_eq!(mode.timeout, Duration::from_millis(900));
        assert!(mode.local_caching);
        assert!(mode.server_authoritative);
        assert!(!mode.prefetch());

        // Config entry beats definition
        let config = config.with_experiment(
            "button_color",
            ExperimentSettings {
                local: Some(false),
                host: Some("http://override:5000".into()),
                timeout_ms: Some(100),
                server_authoritative: Some(false),
            },
        );
        let mode = config.resolve(&definition);
        assert_eq!(mode.host.as_deref(), Some("http://override:5000"));
        assert_eq!(mode.timeout, Duration::from_millis(100));
        assert!(!mode.local_caching);
        assert!(!mode.prefetch());
    }
}
