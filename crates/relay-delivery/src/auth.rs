//! Credential sources for delivery connections.
//!
//! Token acquisition lives outside the relay; a `TokenProvider` only hands
//! the connector whatever token should accompany requests. `force` asks the
//! provider to discard anything cached, which happens on reauthentication.

use std::fmt;

use crate::error::Result;

/// Supplies the `X-Auth-Token` value for new connections.
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync + fmt::Debug {
    /// Returns the token to send, or `None` for unauthenticated requests.
    async fn token(&self, force: bool) -> Result<Option<String>>;
}

/// Sends requests without credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

#[async_trait::async_trait]
impl TokenProvider for NoAuth {
    async fn token(&self, _force: bool) -> Result<Option<String>> {
        Ok(None)
    }
}

/// A fixed token from configuration.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    /// Wraps a configured token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StaticToken").field(&"[redacted]").finish()
    }
}

#[async_trait::async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self, _force: bool) -> Result<Option<String>> {
        Ok(Some(self.0.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_token_is_redacted_in_debug() {
        let provider = StaticToken::new("s3cret");
        assert_eq!(provider.token(true).await.unwrap(), Some("s3cret".to_string()));
        assert!(!format!("{provider:?}").contains("s3cret"));
    }

    #[tokio::test]
    async fn no_auth_yields_no_token() {
        assert_eq!(NoAuth.token(false).await.unwrap(), None);
    }
}
