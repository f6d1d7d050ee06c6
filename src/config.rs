//! Relay configuration.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use relay_core::{Normalizer, RenderOptions, DEFAULT_FLAVOR_FIELD};
use relay_delivery::{HandlerOverrides, HandlerSettings};
use serde::{Deserialize, Serialize};

/// File read from the working directory, if present.
pub const CONFIG_FILE: &str = "relay.toml";

/// Prefix of environment overrides; `__` separates nested keys, so
/// `RELAY_HANDLER__RETRIES=3` sets `handler.retries`.
pub const ENV_PREFIX: &str = "RELAY_";

/// Complete relay configuration.
///
/// Loaded in priority order, highest first:
/// 1. Environment variables prefixed with `RELAY_`
/// 2. `relay.toml`
/// 3. Built-in defaults
///
/// # Example
///
/// ```toml
/// queue = "monitor.info"
///
/// [handler]
/// url = "https://usage.example.com/%(event_type)s"
/// retries = 10
/// stacktach_down = true
///
/// [handler.queues."monitor.info"]
/// format = "cuf"
///
/// [cuf]
/// region = "DFW"
/// data_center = "DFW1"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Queue whose overrides apply to this run.
    ///
    /// Environment variable: `RELAY_QUEUE`
    pub queue: Option<String>,
    /// `[handler]` section.
    pub handler: HandlerConfig,
    /// `[nova]` section.
    pub nova: NovaConfig,
    /// `[cuf]` section.
    pub cuf: CufConfig,
    /// Log filter used when `RUST_LOG` is unset.
    pub rust_log: String,
}

/// Base handler settings plus per-queue overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerConfig {
    /// Settings shared by every queue.
    #[serde(flatten)]
    pub settings: HandlerSettings,
    /// Overrides keyed by queue name.
    pub queues: BTreeMap<String, HandlerOverrides>,
}

/// Compute payload options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NovaConfig {
    /// Payload key holding the flavor id.
    pub flavor_field_name: String,
}

impl Default for NovaConfig {
    fn default() -> Self {
        Self { flavor_field_name: DEFAULT_FLAVOR_FIELD.to_string() }
    }
}

/// Deployment values stamped into CUF documents and Atom links.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CufConfig {
    /// Region code; required for CUF output.
    pub region: Option<String>,
    /// Data center code; required for CUF output.
    pub data_center: Option<String>,
    /// Base URL of related-entity links in Atom entries.
    pub entity_links_base: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue: None,
            handler: HandlerConfig::default(),
            nova: NovaConfig::default(),
            cuf: CufConfig::default(),
            rust_log: default_log_level(),
        }
    }
}

impl Config {
    /// Loads defaults, then `relay.toml`, then `RELAY_` environment overrides.
    ///
    /// # Errors
    ///
    /// Fails if a source cannot be parsed or the result does not validate.
    pub fn load() -> Result<Self> {
        Self::from_figment(Self::figment())
    }

    /// The layered provider stack `load` extracts from.
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Extracts and validates a configuration from `figment`.
    ///
    /// # Errors
    ///
    /// Fails on extraction or validation errors.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the base settings and every queue's effective settings.
    ///
    /// # Errors
    ///
    /// Names the queue whose settings are unusable.
    pub fn validate(&self) -> Result<()> {
        self.handler.settings.validate().context("invalid [handler] settings")?;

        for (queue, overrides) in &self.handler.queues {
            self.handler
                .settings
                .overridden(overrides)
                .validate()
                .with_context(|| format!("invalid settings for queue {queue}"))?;
        }

        if self.nova.flavor_field_name.trim().is_empty() {
            anyhow::bail!("nova.flavor_field_name cannot be empty");
        }

        Ok(())
    }

    /// Effective handler settings for the configured queue.
    pub fn handler_settings(&self) -> HandlerSettings {
        self.handler_settings_for(self.queue.as_deref())
    }

    /// Effective handler settings for `queue`; unknown or absent queues get
    /// the base settings.
    pub fn handler_settings_for(&self, queue: Option<&str>) -> HandlerSettings {
        queue
            .and_then(|queue| self.handler.queues.get(queue))
            .map_or_else(|| self.handler.settings.clone(), |o| self.handler.settings.overridden(o))
    }

    /// Whether the configured queue has no overrides of its own.
    pub fn queue_is_unconfigured(&self) -> bool {
        self.queue.as_ref().is_some_and(|queue| !self.handler.queues.contains_key(queue))
    }

    /// Normalizer configured from `[nova]`.
    pub fn normalizer(&self) -> Normalizer {
        Normalizer::new(self.nova.flavor_field_name.clone())
    }

    /// Render options from `[cuf]`.
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            region: self.cuf.region.clone(),
            data_center: self.cuf.data_center.clone(),
            entity_links: self.handler_settings().generate_entity_links,
            entity_links_base: self.cuf.entity_links_base.clone(),
        }
    }
}

fn default_log_level() -> String {
    "info,usage_relay=debug,relay_delivery=debug".to_string()
}
