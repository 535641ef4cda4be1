//! Configuration layering tests
//!
//! Serialized because they mutate `MXP_CONFIG`.

use mxp_common::config::{resolve_config_file, CONFIG_ENV_VAR};
use mxp_preview::config::{Config, ConfigOverrides, TomlConfig, DEFAULT_API_BASE_URL};
use mxp_preview::{Format, Quality};
use serial_test::serial;
use std::env;
use std::time::Duration;

#[test]
#[serial]
fn test_config_file_from_env_is_layered_under_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
        [backend]
        base_url = "http://render.internal:8000"
        request_timeout_secs = 45

        [preview]
        quality = "low"
        format = "wav"

        [events]
        capacity = 64
        "#,
    )
    .unwrap();

    env::set_var(CONFIG_ENV_VAR, &path);
    let resolved = resolve_config_file(None, CONFIG_ENV_VAR);
    env::remove_var(CONFIG_ENV_VAR);
    assert_eq!(resolved.as_deref(), Some(path.as_path()));

    let (toml, warning) = TomlConfig::load(resolved.as_deref());
    assert!(warning.is_none());

    let config = Config::resolve(
        toml,
        ConfigOverrides {
            device: Some("Headphones".to_string()),
            ..Default::default()
        },
    );
    assert_eq!(config.api_base_url, "http://render.internal:8000");
    assert_eq!(config.request_timeout, Some(Duration::from_secs(45)));
    assert_eq!(config.device.as_deref(), Some("Headphones"));
    assert_eq!(config.quality, Quality::Low);
    assert_eq!(config.format, Format::Wav);
    assert_eq!(config.event_capacity, 64);
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn test_malformed_config_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[backend\nbase_url = ").unwrap();

    env::set_var(CONFIG_ENV_VAR, &path);
    let resolved = resolve_config_file(None, CONFIG_ENV_VAR);
    env::remove_var(CONFIG_ENV_VAR);

    let (toml, warning) = TomlConfig::load(resolved.as_deref());
    assert!(warning.unwrap().contains("using built-in defaults"));

    let config = Config::resolve(toml, ConfigOverrides::default());
    assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
    assert_eq!(config.request_timeout, None);
}
