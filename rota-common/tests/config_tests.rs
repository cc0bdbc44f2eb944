//! Configuration resolution tests
//!
//! Tests that touch `ROTA_*` environment variables are marked `#[serial]`.

use rota_common::config::{RotaConfig, DEFAULT_UNLIMITED_HOURS};
use serial_test::serial;
use std::env;
use std::time::Duration;

fn clear_env() {
    for key in [
        "ROTA_DATABASE_PATH",
        "ROTA_BIND_ADDRESS",
        "ROTA_SOLVER_URL",
        "ROTA_SOLVER_API_KEY",
        "ROTA_SOLVER_TIMEOUT_SECS",
    ] {
        env::remove_var(key);
    }
}

#[test]
fn test_defaults() {
    let config = RotaConfig::default();
    assert_eq!(config.solver_timeout(), Duration::from_secs(30));
    assert_eq!(config.kiosk_reset_delay(), Duration::from_secs(3));
    assert_eq!(config.live_debounce(), Duration::from_millis(500));
    assert_eq!(config.kiosk_search_limit, 20);
    assert_eq!(config.unlimited_hours_sentinel, DEFAULT_UNLIMITED_HOURS);
    assert!(config.solver_api_key.is_none());
    assert!(config.validate().is_ok());
}

#[test]
fn test_partial_toml_keeps_defaults() {
    let config = RotaConfig::from_toml_str(
        r#"
        solver_url = "https://solver.example/api/schedule"
        solver_timeout_secs = 10
        "#,
    )
    .unwrap();
    assert_eq!(config.solver_url, "https://solver.example/api/schedule");
    assert_eq!(config.solver_timeout_secs, 10);
    assert_eq!(config.kiosk_reset_secs, 3);
}

#[test]
fn test_invalid_toml_is_config_error() {
    let result = RotaConfig::from_toml_str("solver_timeout_secs = \"soon\"");
    assert!(matches!(result, Err(rota_common::Error::Config(_))));
}

#[test]
#[serial]
fn test_env_overrides_file() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "solver_url = \"http://from-file\"\nbind_address = \"0.0.0.0:1\"\n").unwrap();

    env::set_var("ROTA_SOLVER_URL", "http://from-env");
    env::set_var("ROTA_SOLVER_API_KEY", "secret");
    let config = RotaConfig::resolve(Some(&path)).unwrap();
    clear_env();

    assert_eq!(config.solver_url, "http://from-env");
    assert_eq!(config.bind_address, "0.0.0.0:1");
    assert_eq!(config.solver_api_key.as_deref(), Some("secret"));
}

#[test]
#[serial]
fn test_missing_explicit_file_is_error() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let result = RotaConfig::resolve(Some(&dir.path().join("absent.toml")));
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_bad_timeout_env_rejected() {
    clear_env();
    env::set_var("ROTA_SOLVER_TIMEOUT_SECS", "forever");
    let mut config = RotaConfig::default();
    let result = config.apply_env();
    clear_env();
    assert!(result.is_err());
}

#[test]
fn test_zero_timeout_fails_validation() {
    let config = RotaConfig {
        solver_timeout_secs: 0,
        ..RotaConfig::default()
    };
    assert!(config.validate().is_err());
}
