//! Producer payload normalization into canonical usage records.
//!
//! Compute notifications describe one instance; image notifications describe
//! every image owned by a tenant. Both resolve their windows through
//! `TimeWindow` and fail the whole notification on the first bad field, so
//! callers never see a partial record list.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::{
    error::{CoreError, Result},
    models::{Notification, Producer, UsageAttributes, UsageRecord},
    options::{ProductOptions, OPTIONS_KEY},
    status::server_status,
    window::TimeWindow,
};

/// Payload field carrying the flavor id unless configured otherwise.
pub const DEFAULT_FLAVOR_FIELD: &str = "instance_type_id";

/// Builds usage records from notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Normalizer {
    /// Compute payload field holding the flavor id.
    pub flavor_field_name: String,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self { flavor_field_name: DEFAULT_FLAVOR_FIELD.to_string() }
    }
}

impl Normalizer {
    /// Creates a normalizer reading the flavor id from `flavor_field_name`.
    pub fn new(flavor_field_name: impl Into<String>) -> Self {
        Self { flavor_field_name: flavor_field_name.into() }
    }

    /// Normalizes a notification into its usage records.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::UnsupportedEventType` for event types without a
    /// producer, and malformed/time/option errors from the producer variant.
    pub fn normalize(&self, notification: &Notification) -> Result<Vec<UsageRecord>> {
        let payload = notification.payload()?;
        let records = match Producer::from_event_type(notification.event_type())? {
            Producer::Compute => vec![self.normalize_compute(payload)?],
            Producer::Image => normalize_image(payload)?,
        };

        debug!(
            message_id = %notification.message_id(),
            event_type = notification.event_type(),
            record_count = records.len(),
            "normalized notification"
        );

        Ok(records)
    }

    /// Normalizes a single-instance compute payload.
    ///
    /// # Errors
    ///
    /// Fails on missing required fields, unparseable timestamps and option
    /// codes outside the decode table.
    pub fn normalize_compute(&self, payload: &Map<String, Value>) -> Result<UsageRecord> {
        let launched_at = required_str(payload, "launched_at")?;
        let deleted_at = nullable_str(payload, "deleted_at")?;
        let period_start = required_str(payload, "audit_period_beginning")?;
        let period_end = required_str(payload, "audit_period_ending")?;
        let window = TimeWindow::resolve(launched_at, deleted_at, period_start, period_end)?;

        let flavor_id = required_text(payload, &self.flavor_field_name)?;
        let flavor_name = required_text(payload, "instance_type")?;

        let options_code = payload
            .get("image_meta")
            .and_then(Value::as_object)
            .map(|meta| optional_text(meta, OPTIONS_KEY))
            .transpose()?
            .filter(|code| !code.is_empty())
            .unwrap_or_else(|| "0".to_string());
        let options = ProductOptions::decode(&options_code)?;

        let public = payload
            .get("bandwidth")
            .and_then(|bandwidth| bandwidth.get("public"))
            .and_then(Value::as_object);
        let bandwidth_in = public.map(|p| counter(p, "bw_in")).transpose()?.unwrap_or(0);
        let bandwidth_out = public.map(|p| counter(p, "bw_out")).transpose()?.unwrap_or(0);

        let vm_state = optional_text(payload, "state")?;
        let task_state = optional_text(payload, "state_description")?;

        Ok(UsageRecord {
            record_id: Uuid::new_v4(),
            tenant_id: optional_text(payload, "tenant_id")?,
            resource_id: optional_text(payload, "instance_id")?,
            resource_type: flavor_id,
            window,
            status: Some(server_status(&vm_state, &task_state)),
            attributes: UsageAttributes::Compute {
                flavor_name,
                bandwidth_in,
                bandwidth_out,
                options,
            },
        })
    }
}

/// Normalizes a multi-image payload, one record per entry in input order.
///
/// Once any entry reports a non-empty `deleted_at`, that value stays the
/// deletion default for every later entry without one of its own.
///
/// # Errors
///
/// Fails on a missing `images` list, missing audit period bounds, or any
/// entry lacking `created_at`/`deleted_at`.
pub fn normalize_image(payload: &Map<String, Value>) -> Result<Vec<UsageRecord>> {
    let images = match payload.get("images") {
        Some(Value::Array(images)) => images,
        Some(_) => return Err(CoreError::invalid_field("images", "a list")),
        None => return Err(CoreError::missing_field("images")),
    };
    let period_start = required_str(payload, "audit_period_beginning")?;
    let period_end = required_str(payload, "audit_period_ending")?;
    let owner = optional_text(payload, "owner")?;

    let mut last_deleted_at: Option<&str> = None;
    let mut records = Vec::with_capacity(images.len());

    for image in images {
        let Value::Object(image) = image else {
            return Err(CoreError::invalid_field("images[]", "an object"));
        };

        let created_at = required_str(image, "created_at")?;
        if let Some(deleted_at) = nullable_str(image, "deleted_at")?.filter(|d| !d.is_empty()) {
            last_deleted_at = Some(deleted_at);
        }
        let window = TimeWindow::resolve(created_at, last_deleted_at, period_start, period_end)?;

        let properties = image.get("properties").and_then(Value::as_object);
        let property = |key: &str| -> Result<String> {
            properties.map(|props| optional_text(props, key)).transpose().map(Option::unwrap_or_default)
        };

        records.push(UsageRecord {
            record_id: Uuid::new_v4(),
            tenant_id: owner.clone(),
            resource_id: optional_text(image, "id")?,
            resource_type: property("image_type")?,
            window,
            status: None,
            attributes: UsageAttributes::Image {
                storage: optional_text(image, "size")?,
                server_id: property("instance_uuid")?,
                server_name: property("instance_name")?,
            },
        });
    }

    Ok(records)
}

/// A field that must be present and a string.
fn required_str<'a>(map: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    match map.get(key) {
        Some(Value::String(value)) => Ok(value),
        Some(_) => Err(CoreError::invalid_field(key, "a string")),
        None => Err(CoreError::missing_field(key)),
    }
}

/// A field that must be present but may be null.
fn nullable_str<'a>(map: &'a Map<String, Value>, key: &str) -> Result<Option<&'a str>> {
    match map.get(key) {
        Some(Value::String(value)) => Ok(Some(value)),
        Some(Value::Null) => Ok(None),
        Some(_) => Err(CoreError::invalid_field(key, "a string or null")),
        None => Err(CoreError::missing_field(key)),
    }
}

/// A required scalar rendered as text.
fn required_text(map: &Map<String, Value>, key: &str) -> Result<String> {
    match map.get(key) {
        Some(value) => scalar_text(value, key),
        None => Err(CoreError::missing_field(key)),
    }
}

/// An optional scalar rendered as text; absent and null become empty.
fn optional_text(map: &Map<String, Value>, key: &str) -> Result<String> {
    map.get(key).map_or_else(|| Ok(String::new()), |value| scalar_text(value, key))
}

fn scalar_text(value: &Value, key: &str) -> Result<String> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(flag) => Ok(flag.to_string()),
        Value::Null => Ok(String::new()),
        Value::Array(_) | Value::Object(_) => Err(CoreError::invalid_field(key, "a scalar")),
    }
}

/// A bandwidth counter; absent means zero.
fn counter(map: &Map<String, Value>, key: &str) -> Result<u64> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(number)) => {
            number.as_u64().ok_or_else(|| CoreError::invalid_field(key, "a non-negative integer"))
        },
        Some(Value::String(text)) => {
            text.parse().map_err(|_| CoreError::invalid_field(key, "a non-negative integer"))
        },
        Some(_) => Err(CoreError::invalid_field(key, "a non-negative integer")),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{status::ServerStatus, window::format_timestamp};

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn compute_payload() -> Map<String, Value> {
        object(json!({
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
        }))
    }

    #[test]
    fn compute_record_fields() {
        let record = Normalizer::default().normalize_compute(&compute_payload()).unwrap();

        assert_eq!(record.tenant_id, "2882");
        assert_eq!(record.resource_id, "56");
        assert_eq!(record.resource_type, "10");
        assert_eq!(record.status, Some(ServerStatus::Active));
        assert_eq!(format_timestamp(&record.start_time()), "2012-09-15 11:51:11");
        assert_eq!(format_timestamp(&record.end_time()), "2012-09-16 10:51:11");
        assert_eq!(
            record.attributes,
            UsageAttributes::Compute {
                flavor_name: "512MB Standard Instance".to_string(),
                bandwidth_in: 1001,
                bandwidth_out: 19992,
                options: ProductOptions::System(&["isRedHat"]),
            }
        );
    }

    #[test]
    fn compute_flavor_field_is_configurable() {
        let mut payload = compute_payload();
        payload.insert("flavor_id".to_string(), json!(42));

        let record = Normalizer::new("flavor_id").normalize_compute(&payload).unwrap();
        assert_eq!(record.resource_type, "42");
    }

    #[test]
    fn compute_defaults_optional_fields() {
        let mut payload = compute_payload();
        payload.remove("bandwidth");
        payload.remove("image_meta");
        payload.remove("state");

        let record = Normalizer::default().normalize_compute(&payload).unwrap();
        assert_eq!(record.status, Some(ServerStatus::Unknown));
        assert!(matches!(
            record.attributes,
            UsageAttributes::Compute {
                bandwidth_in: 0,
                bandwidth_out: 0,
                options: ProductOptions::None,
                ..
            }
        ));
    }

    #[test]
    fn compute_missing_required_fields() {
        for key in [
            "launched_at",
            "deleted_at",
            "audit_period_beginning",
            "instance_type_id",
            "instance_type",
        ] {
            let mut payload = compute_payload();
            payload.remove(key);
            assert_eq!(
                Normalizer::default().normalize_compute(&payload),
                Err(CoreError::missing_field(key)),
                "removing {key}"
            );
        }
    }

    #[test]
    fn compute_unknown_option_fails_record() {
        let mut payload = compute_payload();
        payload.insert("image_meta".to_string(), json!({"com.rackspace__1__options": "3"}));

        assert_eq!(
            Normalizer::default().normalize_compute(&payload),
            Err(CoreError::unknown_option("3"))
        );
    }

    #[test]
    fn compute_bad_timestamp_fails_record() {
        let mut payload = compute_payload();
        payload.insert("launched_at".to_string(), json!("last tuesday"));

        assert_eq!(
            Normalizer::default().normalize_compute(&payload),
            Err(CoreError::time_parse("last tuesday"))
        );
    }

    #[test]
    fn image_deletion_carries_forward() {
        let payload = object(json!({
            "owner": "owner1",
            "audit_period_beginning": "2013-09-02 00:00:00",
            "audit_period_ending": "2013-09-02 23:59:59.999999",
            "images": [
                {"id": "a", "created_at": "2013-09-02 01:00:00", "deleted_at": "2013-09-02 05:00:00"},
                {"id": "b", "created_at": "2013-09-02 02:00:00", "deleted_at": null},
                {"id": "c", "created_at": "2013-09-02 03:00:00", "deleted_at": "2013-09-02 04:00:00"}
            ]
        }));

        let ends: Vec<String> = normalize_image(&payload)
            .unwrap()
            .iter()
            .map(|record| format_timestamp(&record.end_time()))
            .collect();

        assert_eq!(ends, vec!["2013-09-02 05:00:00", "2013-09-02 05:00:00", "2013-09-02 04:00:00"]);
    }

    #[test]
    fn image_requires_created_at() {
        let payload = object(json!({
            "audit_period_beginning": "2013-09-02 00:00:00",
            "audit_period_ending": "2013-09-02 23:59:59",
            "images": [{"id": "a", "deleted_at": null}]
        }));

        assert_eq!(normalize_image(&payload), Err(CoreError::missing_field("created_at")));
    }

    #[test]
    fn unsupported_event_type() {
        let raw = json!({"event_type": "identity.user.created", "message_id": "m", "payload": {}});
        let notification = Notification::from_json(&raw).unwrap();

        assert!(matches!(
            Normalizer::default().normalize(&notification),
            Err(CoreError::UnsupportedEventType { .. })
        ));
    }
}
