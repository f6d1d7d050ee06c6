//! Error types for usage notification delivery.
//!
//! Every failed attempt is classified into one of these variants. The
//! classification decides the status code recorded for the message and the
//! detail carried into the exhaustion message.

use thiserror::Error;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Errors raised while delivering a rendered body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The endpoint rejected our credentials (HTTP 401).
    #[error("Unauthorized")]
    Unauthorized,

    /// The endpoint answered with a non-2xx status.
    #[error("{message}")]
    DeliveryFailed {
        /// HTTP status code
        code: u16,
        /// Response body or reason phrase
        message: String,
    },

    /// The request never produced a response.
    #[error("{message}")]
    Unclassified {
        /// Transport error description
        message: String,
    },

    /// Client or handler settings are unusable.
    #[error("invalid delivery configuration: {message}")]
    Configuration {
        /// What is wrong with the settings
        message: String,
    },

    /// Cancellation was requested during a backoff wait.
    #[error("delivery cancelled")]
    Cancelled,
}

impl DeliveryError {
    /// Creates a delivery failure from an HTTP response.
    pub fn failed(code: u16, message: impl Into<String>) -> Self {
        Self::DeliveryFailed { code, message: message.into() }
    }

    /// Creates an unclassified transport failure for `endpoint`.
    pub fn unclassified(endpoint: &str, cause: impl std::fmt::Display) -> Self {
        Self::Unclassified {
            message: format!("General delivery failure to {endpoint} with: {cause}"),
        }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Status code recorded for this failure; 0 when no response was seen.
    pub fn code(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::DeliveryFailed { code, .. } => *code,
            Self::Unclassified { .. } | Self::Configuration { .. } | Self::Cancelled => 0,
        }
    }
}
