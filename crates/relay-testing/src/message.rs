//! In-memory inbound messages.

use relay_delivery::InboundMessage;
use serde_json::Value;

/// A transport message that counts how often it was acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub struct MockMessage {
    payload: Value,
    acks: usize,
}

impl MockMessage {
    /// Wraps a raw payload.
    pub fn new(payload: Value) -> Self {
        Self { payload, acks: 0 }
    }

    /// Wraps a payload the transport has already acknowledged once.
    pub fn acknowledged(payload: Value) -> Self {
        Self { payload, acks: 1 }
    }

    /// Number of `ack` calls, including a pre-acknowledgement.
    pub fn ack_count(&self) -> usize {
        self.acks
    }
}

impl InboundMessage for MockMessage {
    fn payload(&self) -> &Value {
        &self.payload
    }

    fn is_acknowledged(&self) -> bool {
        self.acks > 0
    }

    fn ack(&mut self) {
        self.acks += 1;
    }
}
