//! Error types for sixpack-participation
//!
//! Only configuration and identity problems are fatal to a participation call.
//! Remote failures are recovered inside the engine and never reach the caller
//! of `participate` or `convert`.

use std::fmt;

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// sixpack-participation error types
#[derive(Error, Debug)]
pub enum Error {
    /// Experiment declared without alternatives, or without an identity attribute
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Subject does not yield a usable client identifier
    #[error("Identity error: {0}")]
    Identity(String),

    /// Local participation store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Classification of a remote assignment failure.
///
/// The engine treats every kind the same way (fallback, no retry) but logs
/// the kind so operators can tell an outage from a misbehaving service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// No host is configured for this experiment
    NotConfigured,
    /// The request exceeded the session timeout
    Timeout,
    /// Connection, DNS, or TLS failure
    Transport,
    /// The service answered with a non-success HTTP status
    Status(u16),
    /// The service answered with a body this client cannot use
    Protocol,
}

impl RemoteErrorKind {
    /// Short label used in log fields
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotConfigured => "not_configured",
            Self::Timeout => "timeout",
            Self::Transport => "transport",
            Self::Status(_) => "status",
            Self::Protocol => "protocol",
        }
    }
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(code) => write!(f, "status {code}"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// A failed round trip to the remote assignment service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {detail}")]
pub struct RemoteError {
    kind: RemoteErrorKind,
    detail: String,
}

impl RemoteError {
    /// Create a remote error of the given kind.
    #[must_use]
    pub fn new(kind: RemoteErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Remote is disabled for this experiment.
    #[must_use]
    pub fn not_configured() -> Self {
        Self::new(RemoteErrorKind::NotConfigured, "no remote host configured")
    }

    /// Service answered with something unusable.
    #[must_use]
    pub fn protocol(detail: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Protocol, detail)
    }

    /// Get the failure kind.
    #[must_use]
    pub const fn kind(&self) -> RemoteErrorKind {
        self.kind
    }

    /// Get the human readable detail.
    #[must_use]
    pub fn detail(&self) -> &str {
        &self.detail
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            RemoteErrorKind::Timeout
        } else if let Some(status) = err.status() {
            RemoteErrorKind::Status(status.as_u16())
        } else if err.is_decode() {
            RemoteErrorKind::Protocol
        } else {
            RemoteErrorKind::Transport
        };
        Self::new(kind, err.to_string())
    }
}
