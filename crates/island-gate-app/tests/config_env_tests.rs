//! Integration tests for environment-driven configuration.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use island_gate_app::{
    AppError, DEFAULT_DATA_DIR, ENV_DATA_DIR, ENV_ESTIMATE_ENABLED, ENV_ESTIMATE_ENDPOINT,
    GateConfig, build_detector,
};
use island_gate_detect::{DEFAULT_ESTIMATE_ENDPOINT, FixedSensor};

fn config_from(pairs: &[(&str, &str)]) -> GateConfig {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    GateConfig::from_lookup(|key| vars.get(key).cloned())
}

#[test]
fn config_env_tests_defaults_when_unset_or_blank() {
    let config = config_from(&[(ENV_DATA_DIR, "  ")]);
    assert_eq!(config, GateConfig::default());
    assert_eq!(config.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
    assert_eq!(config.estimate_endpoint, DEFAULT_ESTIMATE_ENDPOINT);
    assert!(config.estimate_enabled);
}

#[test]
fn config_env_tests_overrides_are_applied() {
    let config = config_from(&[
        (ENV_DATA_DIR, "/var/lib/island-gate"),
        (ENV_ESTIMATE_ENDPOINT, "https://geo.example.test/json"),
        (ENV_ESTIMATE_ENABLED, "OFF"),
    ]);
    assert_eq!(config.data_dir, PathBuf::from("/var/lib/island-gate"));
    assert_eq!(config.estimate_endpoint, "https://geo.example.test/json");
    assert!(!config.estimate_enabled);

    assert!(config_from(&[(ENV_ESTIMATE_ENABLED, "yes")]).estimate_enabled);
    assert!(!config_from(&[(ENV_ESTIMATE_ENABLED, "0")]).estimate_enabled);
}

#[test]
fn config_env_tests_rejects_plain_http_estimate_endpoint() {
    let config = config_from(&[(ENV_ESTIMATE_ENDPOINT, "http://geo.example.test/json")]);
    let result = build_detector(&config, Arc::new(FixedSensor::unsupported()));
    assert!(matches!(result, Err(AppError::Detect(_))));

    let disabled = config_from(&[
        (ENV_ESTIMATE_ENDPOINT, "http://geo.example.test/json"),
        (ENV_ESTIMATE_ENABLED, "false"),
    ]);
    assert!(build_detector(&disabled, Arc::new(FixedSensor::unsupported())).is_ok());
}
