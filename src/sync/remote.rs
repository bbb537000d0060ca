//! Remote sync endpoint collaborator.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use thiserror::Error;

use super::item::SyncAction;
use crate::config::RemoteConfig;
use crate::error::FieldSyncError;
use crate::records::EntityKind;

/// Failure reported for a single remote apply.
///
/// The coordinator records every variant the same way; the distinction is
/// kept for diagnostics and for retry policies that want it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Retryable failure (connection refused, 5xx, throttling).
    #[error("transient remote failure: {0}")]
    Transient(String),

    /// The endpoint rejected the payload as invalid.
    #[error("remote rejected payload: {0}")]
    Rejected(String),

    /// The apply did not finish within the configured timeout.
    #[error("remote apply timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),
}

impl RemoteError {
    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

/// The server-side endpoint queued mutations are applied against.
#[async_trait]
pub trait RemoteEndpoint: Send + Sync {
    /// Apply one mutation. `Ok` is a positive acknowledgement.
    async fn apply(
        &self,
        kind: EntityKind,
        action: SyncAction,
        payload: &[u8],
    ) -> Result<(), RemoteError>;
}

/// HTTP endpoint: `POST {endpoint}/sync/{entity}/{action}` with the payload
/// as a JSON body.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    endpoint: String,
    auth_token: Option<String>,
}

impl HttpRemote {
    /// Create a client for an endpoint base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not http(s) or the client cannot be built.
    pub fn new(endpoint: &str, auth_token: Option<String>) -> Result<Self, FieldSyncError> {
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(FieldSyncError::Remote(format!(
                "Endpoint must be an http(s) URL: {endpoint}"
            )));
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("fieldsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FieldSyncError::Remote(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            auth_token,
        })
    }

    /// Create a client from the `remote` config section.
    ///
    /// # Errors
    ///
    /// Returns a config error if no endpoint is configured.
    pub fn from_config(config: &RemoteConfig) -> Result<Self, FieldSyncError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| FieldSyncError::Config("remote.endpoint is not set".to_string()))?;
        Self::new(endpoint, config.auth_token.clone())
    }

    fn url(&self, kind: EntityKind, action: SyncAction) -> String {
        format!("{}/sync/{kind}/{action}", self.endpoint)
    }
}

#[async_trait]
impl RemoteEndpoint for HttpRemote {
    async fn apply(
        &self,
        kind: EntityKind,
        action: SyncAction,
        payload: &[u8],
    ) -> Result<(), RemoteError> {
        let mut request = self
            .client
            .post(self.url(kind, action))
            .header(CONTENT_TYPE, "application/json")
            .body(payload.to_vec());
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::Transient(e.to_string()))?;
        classify(response.status())
    }
}

fn classify(status: StatusCode) -> Result<(), RemoteError> {
    if status.is_success() {
        return Ok(());
    }
    let reason = status.to_string();
    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            Err(RemoteError::Transient(reason))
        },
        s if s.is_client_error() => Err(RemoteError::Rejected(reason)),
        _ => Err(RemoteError::Transient(reason)),
    }
}
