//! HTTP connections for posting rendered documents.
//!
//! A `Connector` produces authenticated `Connection`s; the engine holds one
//! connection per processing pass and asks for a fresh, forced one when it
//! reauthenticates. `HttpConnector` is the reqwest-backed implementation.

use std::{fmt, sync::Arc, time::Duration};

use bytes::Bytes;
use http::{header::CONTENT_TYPE, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span, warn, Instrument};

use crate::{
    auth::TokenProvider,
    error::{DeliveryError, Result},
};

/// Media type of every delivered body.
pub const ATOM_CONTENT_TYPE: &str = "application/atom+xml";

/// Header carrying the auth token.
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Longest response body kept in a failure message.
const MAX_ERROR_BODY: usize = 1024;

/// HTTP client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Per-request timeout.
    pub timeout: Duration,
    /// User agent string.
    pub user_agent: String,
    /// Maximum redirects to follow.
    pub max_redirects: usize,
    /// Verify TLS certificates.
    pub verify_tls: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: format!("usage-relay/{}", env!("CARGO_PKG_VERSION")),
            max_redirects: 3,
            verify_tls: false,
        }
    }
}

/// An authenticated channel to the usage endpoint.
#[async_trait::async_trait]
pub trait Connection: Send + Sync + fmt::Debug {
    /// Posts one body, returning the 2xx status on success.
    ///
    /// # Errors
    ///
    /// `Unauthorized` for 401, `DeliveryFailed` for any other non-2xx
    /// status, `Unclassified` when no response arrived.
    async fn send(&self, endpoint: &str, body: &Bytes) -> Result<u16>;
}

/// Factory for connections.
#[async_trait::async_trait]
pub trait Connector: Send + Sync + fmt::Debug {
    /// Establishes a connection; `force` discards cached credentials.
    async fn connect(&self, force: bool) -> Result<Box<dyn Connection>>;
}

/// Builds reqwest-backed connections.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    config: ClientConfig,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpConnector {
    /// Creates a connector with the given client settings and token source.
    pub fn new(config: ClientConfig, tokens: Arc<dyn TokenProvider>) -> Self {
        Self { config, tokens }
    }

    fn build_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.config.timeout)
            .user_agent(&self.config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(self.config.max_redirects))
            .danger_accept_invalid_certs(!self.config.verify_tls)
            .build()
            .map_err(|e| DeliveryError::configuration(format!("failed to build HTTP client: {e}")))
    }
}

#[async_trait::async_trait]
impl Connector for HttpConnector {
    async fn connect(&self, force: bool) -> Result<Box<dyn Connection>> {
        let token = self.tokens.token(force).await?;
        let client = self.build_client()?;
        debug!(force, authenticated = token.is_some(), "opened delivery connection");
        Ok(Box::new(HttpConnection { client, token }))
    }
}

/// A reqwest client plus the token it authenticates with.
#[derive(Clone)]
pub struct HttpConnection {
    client: reqwest::Client,
    token: Option<String>,
}

impl fmt::Debug for HttpConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpConnection")
            .field("authenticated", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Connection for HttpConnection {
    async fn send(&self, endpoint: &str, body: &Bytes) -> Result<u16> {
        let span = info_span!("usage_delivery", endpoint = %endpoint, bytes = body.len());

        async move {
            let mut request =
                self.client.post(endpoint).header(CONTENT_TYPE, ATOM_CONTENT_TYPE).body(body.clone());
            if let Some(token) = &self.token {
                request = request.header(AUTH_TOKEN_HEADER, token);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    warn!(timeout = e.is_timeout(), connect = e.is_connect(), "request failed: {e}");
                    return Err(DeliveryError::unclassified(endpoint, e));
                },
            };

            let status = response.status();
            debug!(status = status.as_u16(), "received response");

            if status.is_success() {
                return Ok(status.as_u16());
            }
            if status == StatusCode::UNAUTHORIZED {
                return Err(DeliveryError::Unauthorized);
            }

            let message = match response.text().await {
                Ok(text) if !text.is_empty() => truncate(text),
                _ => status.canonical_reason().unwrap_or("Unknown").to_string(),
            };
            Err(DeliveryError::failed(status.as_u16(), message))
        }
        .instrument(span)
        .await
    }
}

fn truncate(mut text: String) -> String {
    if text.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("... (truncated)");
    }
    text
}
