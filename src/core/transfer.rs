//! Per-call shared state and the caller-facing execution options.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use super::error::AppResult;
use super::task_queue::{Task, TaskQueue};

/// Progress callback: the value just produced and the completed fraction
/// of the call (`0.0..=1.0`).
pub type StepCallback = Arc<dyn Fn(&Value, f64) + Send + Sync>;

/// Caller-supplied gate polled before every dispatch.
///
/// `Ok(true)` lets the next task through, `Ok(false)` means "not yet", and
/// `Err` aborts the call.
#[async_trait]
pub trait Throttle: Send + Sync {
    /// Whether the next task may be dispatched now.
    async fn ready(&self) -> AppResult<bool>;
}

/// [`Throttle`] backed by an async closure.
pub struct FnThrottle<F>(F);

impl<F> FnThrottle<F> {
    /// Wrap `f` as a throttle.
    pub const fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> Throttle for FnThrottle<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = AppResult<bool>> + Send,
{
    async fn ready(&self) -> AppResult<bool> {
        (self.0)().await
    }
}

/// Options accepted by `execute_parallel` / `execute_sequential`.
#[derive(Clone, Default)]
pub struct ExecuteOptions {
    /// Upper bound on units used by a parallel call. Ignored by sequential calls.
    pub threads: Option<usize>,
    /// Progress callback.
    pub step: Option<StepCallback>,
    /// Dispatch gate.
    pub throttle: Option<Arc<dyn Throttle>>,
}

impl ExecuteOptions {
    /// Options with nothing set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the number of units a parallel call may use.
    #[must_use]
    pub const fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_step<F>(mut self, step: F) -> Self
    where
        F: Fn(&Value, f64) + Send + Sync + 'static,
    {
        self.step = Some(Arc::new(step));
        self
    }

    /// Set the dispatch gate.
    #[must_use]
    pub fn with_throttle<T>(mut self, throttle: T) -> Self
    where
        T: Throttle + 'static,
    {
        self.throttle = Some(Arc::new(throttle));
        self
    }

    /// Set the dispatch gate from an async closure.
    #[must_use]
    pub fn with_throttle_fn<F, Fut>(self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<bool>> + Send + 'static,
    {
        self.with_throttle(FnThrottle::new(f))
    }
}

impl fmt::Debug for ExecuteOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecuteOptions")
            .field("threads", &self.threads)
            .field("step", &self.step.is_some())
            .field("throttle", &self.throttle.is_some())
            .finish()
    }
}

struct ResultSlots {
    values: Vec<Option<Value>>,
    defined: usize,
    last: Option<Value>,
}

/// Shared state for one scheduling call, referenced by every unit on it.
pub(crate) struct TransferContext {
    call_id: Uuid,
    pending: Mutex<VecDeque<Task>>,
    max_size: usize,
    total_size: usize,
    results: Mutex<ResultSlots>,
    step: Option<StepCallback>,
    throttle: Option<Arc<dyn Throttle>>,
}

impl TransferContext {
    pub(crate) fn new(call_id: Uuid, queue: TaskQueue, options: &ExecuteOptions) -> Self {
        let total_size = queue.len();
        let max_size = queue.max_size();
        Self {
            call_id,
            pending: Mutex::new(queue.into_tasks().into()),
            max_size,
            total_size,
            results: Mutex::new(ResultSlots {
                values: vec![None; total_size],
                defined: 0,
                last: None,
            }),
            step: options.step.clone(),
            throttle: options.throttle.clone(),
        }
    }

    pub(crate) const fn call_id(&self) -> Uuid {
        self.call_id
    }

    pub(crate) const fn total_size(&self) -> usize {
        self.total_size
    }

    pub(crate) fn throttle(&self) -> Option<&Arc<dyn Throttle>> {
        self.throttle.as_ref()
    }

    /// Atomically take the next task. Its index still names its result slot.
    pub(crate) fn take_next(&self) -> Option<Task> {
        self.pending.lock().pop_front()
    }

    /// Return a task that was taken but never dispatched.
    pub(crate) fn put_back(&self, task: Task) {
        self.pending.lock().push_front(task);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Most recently produced result of this call.
    pub(crate) fn last_result(&self) -> Option<Value> {
        self.results.lock().last.clone()
    }

    /// Store `value` in slot `index`, then report progress.
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn record(&self, index: usize, value: Value) -> f64 {
        let progress = {
            let mut guard = self.results.lock();
            let results = &mut *guard;
            let filled = results
                .values
                .get_mut(index)
                .is_some_and(|slot| slot.replace(value.clone()).is_none());
            if filled {
                results.defined += 1;
            }
            results.last = Some(value.clone());
            if self.total_size == 0 {
                1.0
            } else {
                results.defined as f64 / self.total_size as f64
            }
        };

        if let Some(step) = &self.step {
            step(&value, progress);
        }
        progress
    }

    /// Move the undrained tasks out, renumbered from zero.
    pub(crate) fn take_remaining(&self) -> TaskQueue {
        let pending = std::mem::take(&mut *self.pending.lock());
        TaskQueue::from_tasks(pending, self.max_size)
    }

    /// Move the result slots out.
    pub(crate) fn take_results(&self) -> Vec<Option<Value>> {
        std::mem::take(&mut self.results.lock().values)
    }
}
