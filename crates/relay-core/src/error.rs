//! Error types for notification normalization and rendering.
//!
//! Every variant is local to a single notification: callers record the
//! message as failed and move on to the next one in the batch.

use thiserror::Error;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while turning a raw notification into wire bodies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A required field is missing or has the wrong shape.
    #[error("malformed notification: {0}")]
    MalformedNotification(String),

    /// No timestamp format matched the input.
    #[error("unparseable timestamp {value:?}")]
    TimeParse {
        /// The raw text that failed to parse
        value: String,
    },

    /// Option bit-field value absent from the decode table.
    #[error("unknown options bit-field {code:?}")]
    UnknownOption {
        /// The raw option code
        code: String,
    },

    /// The event type has no usage-record producer.
    #[error("no usage producer for event type {event_type:?}")]
    UnsupportedEventType {
        /// Event type carried by the notification
        event_type: String,
    },

    /// The renderer could not build a document.
    #[error("render failed: {0}")]
    Render(String),
}

impl CoreError {
    /// Creates a malformed notification error for a missing field.
    pub fn missing_field(field: &str) -> Self {
        Self::MalformedNotification(format!("missing required field '{field}'"))
    }

    /// Creates a malformed notification error for a field of the wrong type.
    pub fn invalid_field(field: &str, expected: &str) -> Self {
        Self::MalformedNotification(format!("field '{field}' must be {expected}"))
    }

    /// Creates a time parse error.
    pub fn time_parse(value: impl Into<String>) -> Self {
        Self::TimeParse { value: value.into() }
    }

    /// Creates an unknown option error.
    pub fn unknown_option(code: impl Into<String>) -> Self {
        Self::UnknownOption { code: code.into() }
    }

    /// Whether the error stems from the notification content itself.
    ///
    /// All current variants are content errors except `Render`, which
    /// points at renderer configuration.
    pub fn is_malformed(&self) -> bool {
        !matches!(self, Self::Render(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_format() {
        assert_eq!(
            CoreError::missing_field("launched_at").to_string(),
            "malformed notification: missing required field 'launched_at'"
        );
        assert_eq!(
            CoreError::time_parse("yesterday").to_string(),
            "unparseable timestamp \"yesterday\""
        );
        assert_eq!(CoreError::unknown_option("7").to_string(), "unknown options bit-field \"7\"");
    }

    #[test]
    fn render_errors_are_not_content_errors() {
        assert!(CoreError::missing_field("x").is_malformed());
        assert!(CoreError::unknown_option("3").is_malformed());
        assert!(!CoreError::Render("no region".into()).is_malformed());
    }
}
