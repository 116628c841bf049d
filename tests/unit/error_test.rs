//! Tests for error display and conversions

use prometheus_threads::core::{CapacityError, PoolState, TaskFailure, ThreadsError};

#[test]
fn test_threads_error_messages() {
    assert_eq!(ThreadsError::PoolFailed.to_string(), "pool is in error state, respawn required");
    assert_eq!(
        ThreadsError::ThreadBusy(3).to_string(),
        "thread 3 cannot be executed while not idle"
    );
    assert_eq!(
        ThreadsError::Throttle("gate closed".into()).to_string(),
        "throttle error: gate closed"
    );
    assert!(ThreadsError::UnexpectedState(PoolState::Loading)
        .to_string()
        .contains("Loading"));
}

#[test]
fn test_errors_convert_to_anyhow() {
    fn fails() -> anyhow::Result<()> {
        Err(ThreadsError::NoUsableThreads.into())
    }
    let err = fails().unwrap_err();
    assert_eq!(err.to_string(), "no usable threads in pool");

    let capacity: anyhow::Error = CapacityError { requested: 2, accepted: 0 }.into();
    assert!(capacity.downcast_ref::<CapacityError>().is_some());
}

#[test]
fn test_task_failure_display() {
    assert_eq!(TaskFailure::task("bad").to_string(), "task failed: bad");
    assert_eq!(TaskFailure::executor("gone").to_string(), "executor failed: gone");
    assert!(!TaskFailure::task("bad").is_fatal());
}
