//! Sample producer notifications.

use serde_json::{json, Value};

/// Builder for compute usage notifications.
#[derive(Debug, Clone)]
pub struct ComputeExistsBuilder {
    message_id: Value,
    event_type: String,
    payload: Value,
}

impl ComputeExistsBuilder {
    /// A `compute.instance.exists` notification for an active instance
    /// launched inside a one-day audit period.
    pub fn new(message_id: impl Into<Value>) -> Self {
        Self {
            message_id: message_id.into(),
            event_type: "compute.instance.exists".to_string(),
            payload: json!({
                "tenant_id": "2882",
                "instance_id": "56",
                "instance_type_id": "10",
                "instance_type": "512MB Standard Instance",
                "audit_period_beginning": "2012-09-15 10:51:11",
                "audit_period_ending": "2012-09-16 10:51:11",
                "launched_at": "2012-09-15 11:51:11",
                "deleted_at": "",
                "state": "active",
                "state_description": "",
                "bandwidth": {
                    "private": {"bw_in": 0, "bw_out": 264902},
                    "public": {"bw_in": 1001, "bw_out": 19992}
                },
                "image_meta": {"com.rackspace__1__options": "1"}
            }),
        }
    }

    /// Overrides the event type.
    #[must_use]
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = event_type.into();
        self
    }

    /// Sets or replaces a payload field.
    #[must_use]
    pub fn field(mut self, key: &str, value: impl Into<Value>) -> Self {
        if let Value::Object(payload) = &mut self.payload {
            payload.insert(key.to_string(), value.into());
        }
        self
    }

    /// Removes a payload field.
    #[must_use]
    pub fn without(mut self, key: &str) -> Self {
        if let Value::Object(payload) = &mut self.payload {
            payload.remove(key);
        }
        self
    }

    /// The raw message body.
    pub fn build(self) -> Value {
        json!({
            "event_type": self.event_type,
            "message_id": self.message_id,
            "priority": "INFO",
            "publisher_id": "compute.host1",
            "payload": self.payload
        })
    }
}

/// The two-image `image.exists` notification: one live image and one
/// deleted during the audit period.
pub fn image_exists(message_id: &str) -> Value {
    json!({
        "event_type": "image.exists",
        "timestamp": "2013-09-02 16:09:16.247932",
        "message_id": message_id,
        "priority": "INFO",
        "publisher_id": "ubuntu",
        "payload": {
            "images": [{
                "status": "active",
                "name": "image1",
                "created_at": "2013-09-02 16:08:10",
                "properties": {"image_type": "snapshot", "instance_uuid": "inst_uuid1"},
                "deleted_at": null,
                "id": "image1",
                "size": 12345
            },
            {
                "status": "deleted",
                "name": "image2",
                "created_at": "2013-09-02 16:05:17",
                "properties": {"image_type": "snapshot", "instance_uuid": "inst_uuid2"},
                "deleted_at": "2013-09-02 16:08:46",
                "id": "image2",
                "size": 67890
            }],
            "owner": "owner1",
            "audit_period_ending": "2013-09-02 23:59:59.999999",
            "audit_period_beginning": "2013-09-02 00:00:00"
        }
    })
}

/// A minimal message with arbitrary content and no usage payload.
pub fn plain_event(event_type: &str, message_id: impl Into<Value>) -> Value {
    json!({
        "event_type": event_type,
        "message_id": message_id.into(),
        "content": {"a": 3}
    })
}
