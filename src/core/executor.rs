//! Executor traits: the isolated runner behind each execution unit.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::live::LiveChannel;
use super::ThreadsError;

/// Where a failed outcome came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskFailureKind {
    /// The handler itself failed (error return, panic, unknown handler).
    Task,
    /// The isolated execution resource is gone; the unit cannot run more work.
    Executor,
}

/// Error sentinel returned by an executor instead of a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    /// Failure origin.
    pub kind: TaskFailureKind,
    /// Human-readable reason.
    pub message: String,
}

impl TaskFailure {
    /// Failure raised by the task's handler.
    pub fn task(message: impl Into<String>) -> Self {
        Self {
            kind: TaskFailureKind::Task,
            message: message.into(),
        }
    }

    /// Failure of the execution resource itself.
    pub fn executor(message: impl Into<String>) -> Self {
        Self {
            kind: TaskFailureKind::Executor,
            message: message.into(),
        }
    }

    /// Whether the failure leaves the executor unusable.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.kind == TaskFailureKind::Executor
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TaskFailureKind::Task => write!(f, "task failed: {}", self.message),
            TaskFailureKind::Executor => write!(f, "executor failed: {}", self.message),
        }
    }
}

/// Result of running one task.
pub type Outcome = Result<Value, TaskFailure>;

/// Runs one task at a time in isolation.
///
/// `run` must never panic across this boundary: every failure, including a
/// panicking handler, comes back as [`TaskFailure`].
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use prometheus_threads::core::{Executor, Outcome};
/// use serde_json::{json, Value};
///
/// struct EchoExecutor;
///
/// #[async_trait]
/// impl Executor for EchoExecutor {
///     async fn run(&self, _handler: &str, input: Option<Value>) -> Outcome {
///         Ok(input.unwrap_or(Value::Null))
///     }
///
///     fn terminate(&self) {}
/// }
/// ```
#[async_trait]
pub trait Executor: Send + Sync + 'static {
    /// Execute the handler named `handler` with `input`.
    async fn run(&self, handler: &str, input: Option<Value>) -> Outcome;

    /// Execute the live handler named `handler`, connected to its caller
    /// through `channel`. Executors without live support fail the task.
    async fn run_live(
        &self,
        handler: &str,
        _input: Option<Value>,
        _channel: LiveChannel,
    ) -> Outcome {
        Err(TaskFailure::task(format!("live handler `{handler}` is not supported")))
    }

    /// Release the underlying execution resource. Idempotent.
    fn terminate(&self);
}

/// Creates one executor per execution unit.
pub trait ExecutorFactory: Send + Sync + 'static {
    /// Create the executor for unit `thread_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadsError::Executor`] when the execution resource cannot
    /// be created.
    fn create(&self, thread_id: usize) -> Result<Box<dyn Executor>, ThreadsError>;
}

impl<F> ExecutorFactory for F
where
    F: Fn(usize) -> Result<Box<dyn Executor>, ThreadsError> + Send + Sync + 'static,
{
    fn create(&self, thread_id: usize) -> Result<Box<dyn Executor>, ThreadsError> {
        self(thread_id)
    }
}
