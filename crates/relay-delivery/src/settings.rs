//! Handler settings and per-queue overrides.

use std::time::Duration;

use relay_core::TargetFormat;
use serde::{Deserialize, Serialize};

use crate::{
    client::ClientConfig,
    error::{DeliveryError, Result},
    retry::RetryPolicy,
};

/// Placeholder in `url` replaced by each body's event type.
pub const EVENT_TYPE_PLACEHOLDER: &str = "%(event_type)s";

/// Settings for one relay handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerSettings {
    /// Attempt limit per message; zero or negative retries forever.
    pub retries: i64,
    /// Backoff step in seconds.
    pub interval: u64,
    /// Longest single wait in seconds.
    pub max_wait: u64,
    /// Embed related-entity links in Atom entries.
    pub generate_entity_links: bool,
    /// Consecutive failures before reauthentication.
    pub failures_before_reauth: u32,
    /// Verify TLS certificates of the endpoint.
    pub validate_ssl: bool,
    /// Endpoint URL template.
    pub url: String,
    /// Publish exists notifications as verified plus an unverified copy.
    pub stacktach_down: bool,
    /// Comma-separated event types the duplication rule must not produce.
    pub exclude_filters: String,
    /// Published wire format.
    pub format: TargetFormat,
    /// Messages delivered at once; 1 shares a single connection.
    pub concurrency: usize,
    /// Per-request timeout in seconds.
    pub request_timeout: u64,
    /// Static `X-Auth-Token` value.
    pub auth_token: Option<String>,
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            retries: -1,
            interval: 30,
            max_wait: 600,
            generate_entity_links: false,
            failures_before_reauth: 5,
            validate_ssl: false,
            url: "http://127.0.0.1/nova".to_string(),
            stacktach_down: false,
            exclude_filters: String::new(),
            format: TargetFormat::AtomEntry,
            concurrency: 1,
            request_timeout: 30,
            auth_token: None,
        }
    }
}

impl HandlerSettings {
    /// Rejects settings the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.interval == 0 {
            return Err(DeliveryError::configuration("interval must be greater than 0"));
        }
        if self.failures_before_reauth == 0 {
            return Err(DeliveryError::configuration(
                "failures_before_reauth must be greater than 0",
            ));
        }
        if self.concurrency == 0 {
            return Err(DeliveryError::configuration("concurrency must be greater than 0"));
        }
        if self.url.trim().is_empty() {
            return Err(DeliveryError::configuration("url cannot be empty"));
        }
        Ok(())
    }

    /// Retry policy derived from these settings.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retries: self.retries,
            interval: Duration::from_secs(self.interval),
            max_wait: Duration::from_secs(self.max_wait),
            failures_before_reauth: self.failures_before_reauth,
        }
    }

    /// HTTP client settings derived from these settings.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_secs(self.request_timeout),
            verify_tls: self.validate_ssl,
            ..ClientConfig::default()
        }
    }

    /// Trimmed, non-empty entries of `exclude_filters`.
    pub fn exclude_filter_list(&self) -> Vec<&str> {
        self.exclude_filters.split(',').map(str::trim).filter(|f| !f.is_empty()).collect()
    }

    /// Endpoint for a body published under `event_type`.
    pub fn endpoint_for(&self, event_type: &str) -> String {
        self.url.replace(EVENT_TYPE_PLACEHOLDER, event_type)
    }

    /// Applies a queue's overrides on top of these settings.
    pub fn overridden(&self, overrides: &HandlerOverrides) -> Self {
        let base = self.clone();
        Self {
            retries: overrides.retries.unwrap_or(base.retries),
            interval: overrides.interval.unwrap_or(base.interval),
            max_wait: overrides.max_wait.unwrap_or(base.max_wait),
            generate_entity_links: overrides
                .generate_entity_links
                .unwrap_or(base.generate_entity_links),
            failures_before_reauth: overrides
                .failures_before_reauth
                .unwrap_or(base.failures_before_reauth),
            validate_ssl: overrides.validate_ssl.unwrap_or(base.validate_ssl),
            url: overrides.url.clone().unwrap_or(base.url),
            stacktach_down: overrides.stacktach_down.unwrap_or(base.stacktach_down),
            exclude_filters: overrides.exclude_filters.clone().unwrap_or(base.exclude_filters),
            format: overrides.format.unwrap_or(base.format),
            concurrency: overrides.concurrency.unwrap_or(base.concurrency),
            request_timeout: overrides.request_timeout.unwrap_or(base.request_timeout),
            auth_token: overrides.auth_token.clone().or(base.auth_token),
        }
    }
}

/// Per-queue replacements for handler settings; unset fields inherit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerOverrides {
    /// Replaces `retries`.
    pub retries: Option<i64>,
    /// Replaces `interval`, in seconds.
    pub interval: Option<u64>,
    /// Replaces `max_wait`, in seconds.
    pub max_wait: Option<u64>,
    /// Replaces `generate_entity_links`.
    pub generate_entity_links: Option<bool>,
    /// Replaces `failures_before_reauth`.
    pub failures_before_reauth: Option<u32>,
    /// Replaces `validate_ssl`.
    pub validate_ssl: Option<bool>,
    /// Replaces the endpoint URL template.
    pub url: Option<String>,
    /// Replaces `stacktach_down`.
    pub stacktach_down: Option<bool>,
    /// Replaces `exclude_filters`.
    pub exclude_filters: Option<String>,
    /// Replaces the published wire format.
    pub format: Option<TargetFormat>,
    /// Replaces `concurrency`.
    pub concurrency: Option<usize>,
    /// Replaces `request_timeout`, in seconds.
    pub request_timeout: Option<u64>,
    /// Token used instead of the base one.
    pub auth_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(HandlerSettings::default().validate().is_ok());
    }

    #[test]
    fn rejects_unusable_values() {
        let cases = [
            HandlerSettings { interval: 0, ..HandlerSettings::default() },
            HandlerSettings { failures_before_reauth: 0, ..HandlerSettings::default() },
            HandlerSettings { concurrency: 0, ..HandlerSettings::default() },
            HandlerSettings { url: "  ".to_string(), ..HandlerSettings::default() },
        ];
        for settings in cases {
            assert!(matches!(settings.validate(), Err(DeliveryError::Configuration { .. })));
        }
    }

    #[test]
    fn endpoint_substitutes_event_type() {
        let settings = HandlerSettings {
            url: "http://127.0.0.1:9000/test/%(event_type)s".to_string(),
            ..HandlerSettings::default()
        };
        assert_eq!(
            settings.endpoint_for("compute.instance.exists"),
            "http://127.0.0.1:9000/test/compute.instance.exists"
        );
        assert_eq!(HandlerSettings::default().endpoint_for("x"), "http://127.0.0.1/nova");
    }

    #[test]
    fn exclude_filters_are_trimmed() {
        let settings = HandlerSettings {
            exclude_filters: " compute.instance.exists.verified , ,image.exists".to_string(),
            ..HandlerSettings::default()
        };
        assert_eq!(
            settings.exclude_filter_list(),
            vec!["compute.instance.exists.verified", "image.exists"]
        );
    }

    #[test]
    fn overrides_replace_only_set_fields() {
        let overrides = HandlerOverrides {
            retries: Some(3),
            format: Some(TargetFormat::CufUsageXml),
            ..HandlerOverrides::default()
        };
        let settings = HandlerSettings::default().overridden(&overrides);

        assert_eq!(settings.retries, 3);
        assert_eq!(settings.format, TargetFormat::CufUsageXml);
        assert_eq!(settings.interval, 30);
        assert_eq!(settings.url, "http://127.0.0.1/nova");
    }

    #[test]
    fn policy_uses_seconds() {
        let policy = HandlerSettings { interval: 2, max_wait: 5, ..HandlerSettings::default() }
            .retry_policy();
        assert_eq!(policy.backoff(10), Duration::from_secs(5));
    }
}
