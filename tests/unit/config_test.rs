//! Tests for configuration validation

use prometheus_threads::config::{Environment, ThreadsConfig};
use prometheus_threads::core::{Executor, ThreadsError};

#[test]
fn test_threads_config_defaults() {
    let cfg = ThreadsConfig::default();
    assert_eq!(cfg.thread_count, 2);
    assert_eq!(cfg.max_queue_size, 999);
    assert_eq!(cfg.throttle_poll_interval_ms, 16);
    assert_eq!(cfg.thread_stack_size, 2 * 1024 * 1024);
    assert_eq!(cfg.thread_name_prefix, "pt-thread");
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_threads_config_invalid_thread_count() {
    let invalid = ThreadsConfig::new().with_thread_count(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_threads_config_invalid_queue_size() {
    let invalid = ThreadsConfig::new().with_max_queue_size(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_threads_config_json_roundtrip_keeps_fields() {
    let cfg = ThreadsConfig::new()
        .with_thread_count(3)
        .with_thread_name_prefix("render");
    let json = serde_json::to_string(&cfg).unwrap();
    let parsed = ThreadsConfig::from_json_str(&json).unwrap();
    assert_eq!(parsed, cfg);
}

#[test]
fn test_threads_config_from_json_rejects_invalid() {
    let err = ThreadsConfig::from_json_str(r#"{"thread_stack_size": 16}"#).unwrap_err();
    assert!(err.contains("thread_stack_size"));
}

#[test]
fn test_environment_clamps_ceiling() {
    let env = Environment::new(0, |_id: usize| -> Result<Box<dyn Executor>, ThreadsError> {
        Err(ThreadsError::Executor("unused".into()))
    });
    assert_eq!(env.max_concurrency(), 1);
    assert!(format!("{env:?}").contains("max_concurrency"));
}
