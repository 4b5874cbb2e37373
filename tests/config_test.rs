//! Tests for config module

use std::path::Path;

use syndic::config::{Config, StateBackend};

#[test]
fn test_config_file_exists() {
    let config_path = Path::new("config.toml");
    assert!(
        config_path.exists(),
        "config.toml should exist in project root"
    );
}

#[test]
fn test_sample_config_loads_and_validates() {
    let config = Config::load(Some(Path::new("config.toml"))).unwrap();

    assert_eq!(config.importer.batch_size, 5);
    assert_eq!(config.importer.max_errors, 3);
    assert!(config.importer.default_category.is_none());
    assert_eq!(config.scheduler.more_pages_delay_secs, 5);
    assert_eq!(config.scheduler.monitoring_delay_secs, 300);
    assert_eq!(config.scheduler.error_delay_secs, 300);
    assert_eq!(config.state.backend, StateBackend::Sqlite);
    assert!(config.social.telegram().is_none());
    assert!(config.social.instagram().is_none());
    assert_eq!(config.media.max_file_bytes, 64 * 1024 * 1024);
    assert_eq!(config.logging.retention_days, 30);
}

#[test]
fn test_missing_file_is_an_error() {
    assert!(Config::load(Some(Path::new("does/not/exist.toml"))).is_err());
}

#[test]
fn test_invalid_values_rejected() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[importer]\nmax_errors = 0\n").unwrap();

    let err = Config::load(Some(&path)).unwrap_err();
    assert!(err.to_string().contains("max_errors"));
}

#[test]
fn test_zero_media_limit_rejected() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[media]\nmax_file_bytes = 0\n").unwrap();

    let err = Config::load(Some(&path)).unwrap_err();
    assert!(err.to_string().contains("max_file_bytes"));
}
