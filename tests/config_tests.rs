//! Configuration loading and its mapping onto executor options.

use config::Map;
use resilient_ops::{
    BatchOptions, CacheOptions, ConfigLoader, ControllerConfig, ControllerError, ExecutorOptions,
};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

fn write_config(dir: &TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("resilient-ops.toml");
    let mut file = std::fs::File::create(&path).expect("create config");
    file.write_all(contents.as_bytes()).expect("write config");
    path
}

#[test]
fn test_shipped_config_matches_defaults() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/resilient-ops.toml");
    let config = ConfigLoader::new()
        .with_file(path)
        .with_env_source(Map::new())
        .load()
        .expect("shipped config loads");

    assert_eq!(config, ControllerConfig::default());
}

#[test]
fn test_layers_merge_in_precedence_order() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_config(
        &dir,
        r#"
        [executor]
        timeout_ms = 5000
        retries = 1
        show_success_toast = true

        [cache]
        cache_time_ms = 10000
        stale_time_ms = 2000
        "#,
    );

    let mut vars = Map::new();
    vars.insert("RESILIENT_OPS_EXECUTOR__RETRIES".to_string(), "4".to_string());
    vars.insert("RESILIENT_OPS_BATCH__BATCH_SIZE".to_string(), "25".to_string());

    let config = ConfigLoader::new()
        .with_file(&path)
        .with_env_source(vars)
        .load()
        .expect("layered config loads");

    assert_eq!(config.executor.timeout_ms, 5000);
    assert_eq!(config.executor.retries, 4);
    assert!(config.executor.show_success_toast);
    assert!(config.executor.show_error_toast);
    assert_eq!(config.batch.batch_size, 25);
    assert_eq!(config.batch.concurrency, 3);
    assert_eq!(config.cache.cache_time_ms, 10_000);
}

#[test]
fn test_zero_concurrency_is_invalid() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_config(&dir, "[batch]\nconcurrency = 0\n");

    let result = ConfigLoader::new()
        .with_file(&path)
        .with_env_source(Map::new())
        .load();

    match result {
        Err(ControllerError::InvalidConfiguration(message)) => {
            assert!(message.contains("concurrency"), "unexpected message: {message}");
        }
        other => panic!("expected invalid configuration, got {other:?}"),
    }
}

#[test]
fn test_options_follow_config_sections() {
    let mut config = ControllerConfig::default();
    config.executor.retries = 6;
    config.executor.retry_delay_ms = 250;
    config.batch.concurrency = 5;
    config.batch.timeout_ms = Some(9_000);
    config.cache.stale_time_ms = 30_000;

    let executor = ExecutorOptions::<u32>::from_config(&config.executor);
    assert_eq!(executor.retries, 6);
    assert_eq!(executor.retry_delay, Duration::from_millis(250));
    assert_eq!(executor.timeout, Duration::from_secs(30));
    assert_eq!(executor.retry_policy().total_backoff(), Duration::from_millis(250 * 63));

    let batch = BatchOptions::<u32>::from_config(&config.batch);
    assert_eq!(batch.concurrency, 5);
    assert_eq!(batch.timeout, Some(Duration::from_secs(9)));
    assert!(batch.validate().is_ok());

    let cache = CacheOptions::from_config(&config.cache);
    assert_eq!(cache.stale_time, Duration::from_secs(30));
    assert_eq!(cache.cache_time, Duration::from_secs(300));
}

#[test]
fn test_file_only_loader_ignores_missing_file() {
    let dir = TempDir::new().expect("temp dir");
    let config = ConfigLoader::new()
        .with_file(dir.path().join("absent.toml"))
        .with_env_source(Map::new())
        .load()
        .expect("defaults load");

    assert!(config.validate().is_ok());
    assert_eq!(config.batch.batch_size, 10);
}
