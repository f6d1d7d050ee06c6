//! Layered configuration loading.

#![allow(clippy::unwrap_used)]

use figment::Jail;
use relay_core::TargetFormat;
use usage_relay::Config;

fn load() -> figment::Result<Config> {
    Config::load().map_err(|e| figment::Error::from(format!("{e:#}")))
}

#[test]
fn defaults_apply_without_sources() {
    Jail::expect_with(|_jail| {
        let config = load()?;

        assert_eq!(config, Config::default());
        assert_eq!(config.handler.settings.retries, -1);
        assert_eq!(config.handler.settings.url, "http://127.0.0.1/nova");
        assert_eq!(config.handler.settings.format, TargetFormat::AtomEntry);
        Ok(())
    });
}

#[test]
fn file_settings_override_defaults() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "relay.toml",
            r#"
                [handler]
                url = "https://usage.example.com/%(event_type)s"
                retries = 10
                stacktach_down = true
                exclude_filters = "compute.instance.exists.verified"

                [nova]
                flavor_field_name = "instance_flavor_id"

                [cuf]
                region = "DFW"
                data_center = "DFW1"
            "#,
        )?;

        let config = load()?;
        let settings = config.handler_settings();

        assert_eq!(settings.url, "https://usage.example.com/%(event_type)s");
        assert_eq!(settings.retries, 10);
        assert!(settings.stacktach_down);
        assert_eq!(settings.exclude_filter_list(), vec!["compute.instance.exists.verified"]);
        assert_eq!(settings.interval, 30);
        assert_eq!(config.normalizer().flavor_field_name, "instance_flavor_id");

        let options = config.render_options();
        assert_eq!(options.region.as_deref(), Some("DFW"));
        assert_eq!(options.data_center.as_deref(), Some("DFW1"));
        Ok(())
    });
}

#[test]
fn environment_overrides_file() {
    Jail::expect_with(|jail| {
        jail.create_file("relay.toml", "[handler]\nretries = 10\ninterval = 5\n")?;
        jail.set_env("RELAY_HANDLER__RETRIES", "2");
        jail.set_env("RELAY_HANDLER__FORMAT", "cuf");
        jail.set_env("RELAY_CUF__REGION", "ORD");

        let config = load()?;

        assert_eq!(config.handler.settings.retries, 2);
        assert_eq!(config.handler.settings.interval, 5);
        assert_eq!(config.handler.settings.format, TargetFormat::CufUsageXml);
        assert_eq!(config.cuf.region.as_deref(), Some("ORD"));
        Ok(())
    });
}

#[test]
fn queue_overrides_are_selected_by_queue() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "relay.toml",
            r#"
                [handler]
                retries = 10

                [handler.queues.glance]
                format = "cuf"
                url = "https://usage.example.com/glance"
            "#,
        )?;
        jail.set_env("RELAY_QUEUE", "glance");

        let config = load()?;
        let settings = config.handler_settings();

        assert_eq!(config.queue.as_deref(), Some("glance"));
        assert_eq!(settings.format, TargetFormat::CufUsageXml);
        assert_eq!(settings.url, "https://usage.example.com/glance");
        assert_eq!(settings.retries, 10);
        assert!(!config.queue_is_unconfigured());
        Ok(())
    });
}

#[test]
fn invalid_values_are_rejected() {
    Jail::expect_with(|jail| {
        jail.create_file("relay.toml", "[handler]\ninterval = 0\n")?;

        let error = Config::load().unwrap_err();
        assert!(format!("{error:#}").contains("interval must be greater than 0"));
        Ok(())
    });
}

#[test]
fn invalid_queue_override_is_rejected() {
    Jail::expect_with(|jail| {
        jail.create_file("relay.toml", "[handler.queues.broken]\nfailures_before_reauth = 0\n")?;

        let error = Config::load().unwrap_err();
        assert!(format!("{error:#}").contains("queue broken"));
        Ok(())
    });
}
