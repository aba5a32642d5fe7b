use contact_sync::config::AppConfig;
use contact_sync::test_utils::env_lock;
use serial_test::serial;
use std::env;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const ENV_VARS: [&str; 4] = [
    "CONTACT_SYNC_DB_PATH",
    "CONTACT_SYNC_LOG_LEVEL",
    "CONTACT_SYNC_DEBOUNCE_MS",
    "CONTACT_SYNC_INTERVAL_SECS",
];

fn clear_env() {
    for var in ENV_VARS {
        unsafe {
            env::remove_var(var);
        }
    }
}

#[test]
fn test_load_valid_basic_config() {
    let fixture_path = PathBuf::from("tests/fixtures/config/valid_basic.toml");
    let config = AppConfig::load_from_file(&fixture_path).unwrap();

    assert_eq!(config.store.path, PathBuf::from("contacts-test.duckdb"));
    assert_eq!(config.store.debounce_ms, 500);
    assert_eq!(config.store.history_retention, 10);
    assert_eq!(config.sync.interval_secs, 600);
    assert_eq!(config.sync.batch_size, 25);
    assert!(config.sync.cloud_enabled);
    assert!(!config.sync.device_enabled);
    assert_eq!(config.logging.level, "debug");
    assert!(config.validate().is_ok());
}

#[test]
fn test_load_invalid_log_level() {
    let fixture_path = PathBuf::from("tests/fixtures/config/invalid_log_level.toml");
    let config = AppConfig::load_from_file(&fixture_path).unwrap();
    assert!(config.validate().is_err());
}

#[test]
fn test_load_invalid_batch_size() {
    let fixture_path = PathBuf::from("tests/fixtures/config/invalid_batch_size.toml");
    let config = AppConfig::load_from_file(&fixture_path).unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("batch size"));
}

#[test]
fn test_load_invalid_retention() {
    let fixture_path = PathBuf::from("tests/fixtures/config/invalid_retention.toml");
    let config = AppConfig::load_from_file(&fixture_path).unwrap();
    assert!(config.validate().is_err());
}

#[test]
fn test_defaults_fill_missing_fields() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    // Minimal config with only one field
    fs::write(&config_path, "[sync]\ndevice_enabled = true\n").unwrap();

    let config = AppConfig::load_from_file(&config_path).unwrap();

    assert!(config.sync.device_enabled);
    assert_eq!(config.sync.interval_secs, 1800);
    assert_eq!(config.sync.initial_delay_secs, 5);
    assert_eq!(config.sync.batch_size, 50);
    assert_eq!(config.store.debounce_ms, 2000);
    assert_eq!(config.store.history_retention, 20);
    assert_eq!(config.logging.level, "info");
    assert!(config.validate().is_ok());
}

#[test]
fn test_missing_file_is_created_from_default() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("nested").join("contact-sync.config.toml");

    let config = AppConfig::load_from_file(&config_path).unwrap();

    assert!(config_path.exists());
    assert_eq!(config.store.debounce_ms, 2000);
    assert!(config.validate().is_ok());
}

#[test]
fn test_malformed_file_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("broken.toml");
    fs::write(&config_path, "[store\npath = ").unwrap();

    assert!(AppConfig::load_from_file(&config_path).is_err());
}

#[test]
#[serial]
fn test_env_overrides() {
    let _guard = env_lock().lock().unwrap();
    clear_env();

    unsafe {
        env::set_var("CONTACT_SYNC_DB_PATH", "/tmp/override.duckdb");
        env::set_var("CONTACT_SYNC_LOG_LEVEL", "warn");
        env::set_var("CONTACT_SYNC_DEBOUNCE_MS", "250");
        env::set_var("CONTACT_SYNC_INTERVAL_SECS", "not-a-number");
    }

    let mut config = AppConfig::default();
    config.apply_env_overrides();

    assert_eq!(config.store.path, PathBuf::from("/tmp/override.duckdb"));
    assert_eq!(config.logging.level, "warn");
    assert_eq!(config.store.debounce_ms, 250);
    // Unparseable numbers leave the value untouched
    assert_eq!(config.sync.interval_secs, 1800);

    clear_env();
}

#[test]
fn test_config_summary() {
    let config = AppConfig::default();
    let summary = config.summary();

    assert!(summary.contains("Configuration loaded:"));
    assert!(summary.contains("Database: contacts.duckdb"));
    assert!(summary.contains("Sync Interval: 1800s"));
    assert!(summary.contains("Logging Level: info"));
}

#[test]
fn test_embedded_default_is_valid() {
    let config = AppConfig::embedded_default().unwrap();
    assert!(config.validate().is_ok());
    assert!(!config.sync.device_enabled);
    assert!(!config.sync.cloud_enabled);
}
