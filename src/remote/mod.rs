//! Remote assignment service client
//!
//! The remote service decides buckets and counts conversions. This crate
//! only consumes its answers: every call goes through [`AssignmentService`]
//! inside a [`Session`] scoped to one client, and every failure comes back
//! as a [`RemoteError`] with a kind the engine can match on.
//!
//! - [`HttpAssignmentService`] - Sixpack-compatible HTTP client (reqwest)

mod http;

pub use http::HttpAssignmentService;

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::RemoteError;

/// Connection and client parameters for a run of remote calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    host: String,
    timeout: Duration,
    client_id: String,
    user_agent: Option<String>,
    ip_address: Option<String>,
}

impl Session {
    /// Create a session for `client_id` against `host`.
    #[must_use]
    pub fn new(host: impl Into<String>, timeout: Duration, client_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            timeout,
            client_id: client_id.into(),
            user_agent: None,
            ip_address: None,
        }
    }

    /// Attach the subject's user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }

    /// Attach the subject's IP address.
    #[must_use]
    pub fn with_ip_address(mut self, ip_address: Option<String>) -> Self {
        self.ip_address = ip_address;
        self
    }

    /// Service base URL.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Client identifier sent with every call.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Subject user agent, if known.
    #[must_use]
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    /// Subject IP address, if known.
    #[must_use]
    pub fn ip_address(&self) -> Option<&str> {
        self.ip_address.as_deref()
    }
}

/// Arguments of a remote participation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipateRequest {
    /// Derived experiment name
    pub experiment: String,
    /// Declared alternatives, control first
    pub alternatives: Vec<String>,
    /// Caller override, forwarded as-is
    pub force: Option<String>,
    /// Register the participation without letting the service pick the bucket
    pub prefetch: bool,
    /// Bucket suggested by the caller
    pub bucket: Option<String>,
}

/// Arguments of a remote conversion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertRequest {
    /// Derived experiment name
    pub experiment: String,
    /// Optional KPI the conversion counts towards
    pub kpi: Option<String>,
}

/// Alternative reference in a participation response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlternativeRef {
    /// Alternative name
    pub name: String,
}

/// Participation response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipateResponse {
    /// Service status string, `"ok"` on success
    #[serde(default)]
    pub status: Option<String>,
    /// Chosen alternative
    pub alternative: AlternativeRef,
}

impl ParticipateResponse {
    /// Name of the alternative the service chose.
    #[must_use]
    pub fn alternative_name(&self) -> &str {
        &self.alternative.name
    }
}

/// Conversion response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertResponse {
    /// Service status string, `"ok"` on success
    pub status: String,
}

impl ConvertResponse {
    /// True only for an explicit `"ok"`.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Remote assignment service.
///
/// Implementations must report every failure (transport, timeout, bad
/// status, undecodable body) as a `RemoteError`; they never retry.
pub trait AssignmentService: Send + Sync {
    /// Ask the service which alternative the session's client gets.
    fn participate(
        &self,
        session: &Session,
        request: &ParticipateRequest,
    ) -> impl Future<Output = Result<ParticipateResponse, RemoteError>> + Send;

    /// Report a conversion for the session's client.
    fn convert(
        &self,
        session: &Session,
        request: &ConvertRequest,
    ) -> impl Future<Output = Result<ConvertResponse, RemoteError>> + Send;
}
