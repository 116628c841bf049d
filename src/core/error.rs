//! Error types for pool, unit, and queue operations.

use thiserror::Error;

use super::executor::TaskFailure;
use super::threads::PoolState;

/// Errors produced by the pool manager and its execution units.
#[derive(Debug, Error)]
pub enum ThreadsError {
    /// The pool is currently binding its executor factory.
    #[error("pool is loading, retry once it is loaded")]
    Loading,
    /// A previous call left the pool in the error state; `spawn()` is required.
    #[error("pool is in error state, respawn required")]
    PoolFailed,
    /// The pool was terminated; `spawn()` is required.
    #[error("pool has been terminated")]
    Terminated,
    /// An execution unit was asked to run while not idle.
    #[error("thread {0} cannot be executed while not idle")]
    ThreadBusy(usize),
    /// Every execution unit is interrupted; none can take work.
    #[error("no usable threads in pool")]
    NoUsableThreads,
    /// The caller-supplied throttle predicate failed.
    #[error("throttle error: {0}")]
    Throttle(String),
    /// A task run on its own executor failed.
    #[error("{0}")]
    Task(TaskFailure),
    /// The executor factory could not create an executor.
    #[error("executor error: {0}")]
    Executor(String),
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The pool was found in a state that does not allow the operation.
    #[error("unexpected pool state: {0:?}")]
    UnexpectedState(PoolState),
}

/// A push, insert, or replace would grow the task queue past its capacity.
///
/// The queue is left untouched; `accepted` reports how many of the
/// `requested` tasks would have fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("task queue capacity exceeded: {requested} requested, only {accepted} can be accepted")]
pub struct CapacityError {
    /// Number of tasks the caller tried to add.
    pub requested: usize,
    /// Number of tasks that would have fit.
    pub accepted: usize,
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_error_display() {
        let err = CapacityError {
            requested: 3,
            accepted: 1,
        };
        assert_eq!(
            err.to_string(),
            "task queue capacity exceeded: 3 requested, only 1 can be accepted"
        );
    }

    #[test]
    fn test_threads_error_display() {
        assert_eq!(
            ThreadsError::Throttle("boom".into()).to_string(),
            "throttle error: boom"
        );
        assert_eq!(
            ThreadsError::ThreadBusy(2).to_string(),
            "thread 2 cannot be executed while not idle"
        );
        assert_eq!(
            ThreadsError::Task(TaskFailure::task("bad input")).to_string(),
            "task failed: bad input"
        );
    }
}
