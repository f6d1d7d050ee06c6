//! Per-message delivery outcomes.

use std::collections::BTreeMap;

use relay_core::MessageId;
use serde::{Deserialize, Serialize};

/// Message recorded for delivered notifications.
pub const SUCCESS_MESSAGE: &str = "Success";

/// Final result for one notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    /// Whether delivery failed.
    pub error: bool,
    /// Last HTTP status seen, 0 when none applies.
    pub code: u16,
    /// `Success` or a description of the failure.
    pub message: String,
}

impl DeliveryOutcome {
    /// Every body was acknowledged; `code` is the last status.
    pub fn success(code: u16) -> Self {
        Self { error: false, code, message: SUCCESS_MESSAGE.to_string() }
    }

    /// The retry limit was reached.
    pub fn exhausted(code: u16, detail: impl std::fmt::Display) -> Self {
        Self { error: true, code, message: format!("Exceeded retry limit. Error {detail}") }
    }

    /// The notification could not be turned into bodies.
    pub fn malformed(detail: impl std::fmt::Display) -> Self {
        Self { error: true, code: 0, message: format!("Malformed Notification: {detail}") }
    }

    /// Rendering failed for reasons outside the notification.
    pub fn unrenderable(detail: impl std::fmt::Display) -> Self {
        Self { error: true, code: 0, message: format!("Unable to render notification: {detail}") }
    }

    /// Cancellation interrupted the retry loop.
    pub fn cancelled(code: u16, tries: u32) -> Self {
        Self { error: true, code, message: format!("Delivery cancelled after {tries} attempts") }
    }
}

/// Outcomes keyed by message id.
///
/// Later inserts for the same id replace earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryResults(BTreeMap<MessageId, DeliveryOutcome>);

impl DeliveryResults {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome for `message_id`.
    pub fn record(&mut self, message_id: MessageId, outcome: DeliveryOutcome) {
        self.0.insert(message_id, outcome);
    }

    /// Outcome for `message_id`, if processed.
    pub fn get(&self, message_id: &MessageId) -> Option<&DeliveryOutcome> {
        self.0.get(message_id)
    }

    /// Folds another batch in; its entries win on conflicts.
    pub fn merge(&mut self, other: DeliveryResults) {
        self.0.extend(other.0);
    }

    /// Number of recorded messages.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Outcomes in message id order.
    pub fn iter(&self) -> impl Iterator<Item = (&MessageId, &DeliveryOutcome)> {
        self.0.iter()
    }
}
