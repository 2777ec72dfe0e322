//! Sixpack-compatible HTTP assignment client.
//!
//! `GET {host}/participate` and `GET {host}/convert` with query parameters;
//! responses are JSON. The session timeout is applied per request.

use reqwest::{Client, Url};
use serde::de::DeserializeOwned;

use super::{
    AssignmentService, ConvertRequest, ConvertResponse, ParticipateRequest, ParticipateResponse,
    Session,
};
use crate::error::{RemoteError, RemoteErrorKind};
use crate::{Error, Result};

/// HTTP client for a Sixpack-compatible assignment service.
#[derive(Debug, Clone)]
pub struct HttpAssignmentService {
    client: Client,
}

impl HttpAssignmentService {
    /// Build a client with default settings.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if the HTTP client cannot be built
    /// (e.g. the TLS backend fails to initialize).
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wrap an existing client (shared pool, custom TLS, proxies).
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn endpoint(
        session: &Session,
        action: &str,
        params: &[(&str, &str)],
    ) -> std::result::Result<Url, RemoteError> {
        let base = format!("{}/{action}", session.host().trim_end_matches('/'));
        let mut pairs: Vec<(&str, &str)> = params.to_vec();
        pairs.push(("client_id", session.client_id()));
        if let Some(user_agent) = session.user_agent() {
            pairs.push(("user_agent", user_agent));
        }
        if let Some(ip_address) = session.ip_address() {
            pairs.push(("ip_address", ip_address));
        }
        Url::parse_with_params(&base, pairs).map_err(|e| {
            RemoteError::new(
                RemoteErrorKind::Transport,
                format!("invalid service URL {base:?}: {e}"),
            )
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        session: &Session,
        url: Url,
    ) -> std::result::Result<T, RemoteError> {
        let response = self
            .client
            .get(url)
            .timeout(session.timeout())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::new(
                RemoteErrorKind::Status(status.as_u16()),
                format!("assignment service answered {status}"),
            ));
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|e| RemoteError::protocol(format!("undecodable response body: {e}")))
    }
}

impl AssignmentService for HttpAssignmentService {
    async fn participate(
        &self,
        session: &Session,
        request: &ParticipateRequest,
    ) -> std::result::Result<ParticipateResponse, RemoteError> {
        let mut params: Vec<(&str, &str)> = vec![("experiment", request.experiment.as_str())];
        for alternative in &request.alternatives {
            params.push(("alternatives", alternative.as_str()));
        }
        if let Some(force) = request.force.as_deref() {
            params.push(("force", force));
        }
        if request.prefetch {
            params.push(("prefetch", "true"));
        }
        if let Some(bucket) = request.bucket.as_deref() {
            params.push(("bucket", bucket));
        }

        let url = Self::endpoint(session, "participate", &params)?;
        tracing::debug!(experiment = %request.experiment, %url, "Remote participate");
        self.get_json(session, url).await
    }

    async fn convert(
        &self,
        session: &Session,
        request: &ConvertRequest,
    ) -> std::result::Result<ConvertResponse, RemoteError> {
        let mut params: Vec<(&str, &str)> = vec![("experiment", request.experiment.as_str())];
        if let Some(kpi) = request.kpi.as_deref() {
            params.push(("kpi", kpi));
        }

        let url = Self::endpoint(session, "convert", &params)?;
        tracing::debug!(experiment = %request.experiment, %url, "Remote convert");
        self.get_json(session, url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn session() -> Session {
        Session::new("http://localhost:5000/", Duration::from_millis(500), "10")
            .with_user_agent(Some("Mozilla/5.0".into()))
    }

    #[test]
    fn test_endpoint_builds_query() {
        let url = HttpAssignmentService::endpoint(
            &session(),
            "participate",
            &[("experiment", "button_color"), ("alternatives", "A"), ("alternatives", "B")],
        )
        .unwrap();

        assert_eq!(url.path(), "/participate");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("experiment".into(), "button_color".into())));
        assert!(pairs.contains(&("client_id".into(), "10".into())));
        assert!(pairs.contains(&("user_agent".into(), "Mozilla/5.0".into())));
        assert_eq!(pairs.iter().filter(|(k, _)| k == "alternatives").count(), 2);
        assert!(!pairs.iter().any(|(k, _)| k == "ip_address"));
    }

    #[test]
    fn test_endpoint_rejects_invalid_host() {
        let bad = Session::new("not a url", Duration::from_millis(500), "10");
        let err = HttpAssignmentService::endpoint(&bad, "convert", &[]).unwrap_err();
        assert_eq!(err.kind(), RemoteErrorKind::Transport);
    }
}
