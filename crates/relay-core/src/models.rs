//! Notification envelopes and canonical usage records.
//!
//! A `Notification` is the read-only view of one inbound message. A
//! `UsageRecord` is the producer-agnostic usage interval built from it.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
    error::{CoreError, Result},
    options::ProductOptions,
    status::ServerStatus,
    window::TimeWindow,
};

/// Event type of the daily compute usage notification.
pub const COMPUTE_EXISTS: &str = "compute.instance.exists";

/// Event type used for compute usage that skipped downstream verification.
pub const COMPUTE_EXISTS_VERIFIED: &str = "compute.instance.exists.verified";

/// Event type of the daily image usage notification.
pub const IMAGE_EXISTS: &str = "image.exists";

/// Opaque message identifier assigned by the producer.
///
/// Producers send either strings or integers; both are kept as text so the
/// identifier can key the results map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    /// Extracts the identifier from a raw JSON value.
    ///
    /// Returns `None` for anything other than a string or a number.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(id) => Some(Self(id.clone())),
            Value::Number(id) => Some(Self(id.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<u64> for MessageId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// Read-only view of one inbound notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    event_type: String,
    message_id: MessageId,
    body: Map<String, Value>,
}

impl Notification {
    /// Parses the envelope fields out of a raw message body.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::MalformedNotification` if the body is not an
    /// object, or `event_type` / `message_id` are missing or mistyped.
    pub fn from_json(body: &Value) -> Result<Self> {
        let Value::Object(body) = body else {
            return Err(CoreError::MalformedNotification(
                "notification body must be a JSON object".to_string(),
            ));
        };

        let event_type = match body.get("event_type") {
            Some(Value::String(event_type)) => event_type.clone(),
            Some(_) => return Err(CoreError::invalid_field("event_type", "a string")),
            None => return Err(CoreError::missing_field("event_type")),
        };

        let message_id = match body.get("message_id") {
            Some(value) => MessageId::from_json(value)
                .ok_or_else(|| CoreError::invalid_field("message_id", "a string or number"))?,
            None => return Err(CoreError::missing_field("message_id")),
        };

        Ok(Self { event_type, message_id, body: body.clone() })
    }

    /// Producer event type.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Producer message identifier.
    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }

    /// The complete message body, envelope fields included.
    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    /// The producer payload mapping.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::MalformedNotification` if `payload` is missing or
    /// not an object.
    pub fn payload(&self) -> Result<&Map<String, Value>> {
        match self.body.get("payload") {
            Some(Value::Object(payload)) => Ok(payload),
            Some(_) => Err(CoreError::invalid_field("payload", "an object")),
            None => Err(CoreError::missing_field("payload")),
        }
    }
}

/// Producer family a notification belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Producer {
    /// Single-instance compute notifications.
    Compute,
    /// Multi-image image-service notifications.
    Image,
}

impl Producer {
    /// Picks the producer from the event type prefix.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::UnsupportedEventType` for unknown prefixes.
    pub fn from_event_type(event_type: &str) -> Result<Self> {
        if event_type.starts_with("compute.instance.") {
            Ok(Self::Compute)
        } else if event_type.starts_with("image.") {
            Ok(Self::Image)
        } else {
            Err(CoreError::UnsupportedEventType { event_type: event_type.to_string() })
        }
    }
}

/// Producer-specific attributes of a usage record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageAttributes {
    /// Compute instance usage.
    Compute {
        /// Human-readable flavor name.
        flavor_name: String,
        /// Public inbound bandwidth counter.
        bandwidth_in: u64,
        /// Public outbound bandwidth counter.
        bandwidth_out: u64,
        /// Decoded image options.
        options: ProductOptions,
    },
    /// Stored image usage.
    Image {
        /// Image size as reported.
        storage: String,
        /// Instance the image was taken from.
        server_id: String,
        /// Name of that instance.
        server_name: String,
    },
}

/// Canonical usage record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRecord {
    /// Freshly generated per record.
    pub record_id: Uuid,
    /// Owning tenant.
    pub tenant_id: String,
    /// Instance or image id.
    pub resource_id: String,
    /// Flavor id for compute, image classification for images.
    pub resource_type: String,
    /// Billable interval within the audit period.
    pub window: TimeWindow,
    /// Lifecycle status; only compute records carry one.
    pub status: Option<ServerStatus>,
    /// Producer-specific attributes.
    pub attributes: UsageAttributes,
}

impl UsageRecord {
    /// Start of the usage window.
    pub fn start_time(&self) -> NaiveDateTime {
        self.window.start
    }

    /// End of the usage window.
    pub fn end_time(&self) -> NaiveDateTime {
        self.window.end
    }
}
