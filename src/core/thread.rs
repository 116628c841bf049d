//! Execution unit: one executor plus the state machine that drains a call.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::error::AppResult;
use super::event::EventBus;
use super::executor::{Executor, TaskFailure};
use super::stats::ThreadsCounters;
use super::transfer::{Throttle, TransferContext};
use super::ThreadsError;

/// Lifecycle state of an execution unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadState {
    /// Ready to be claimed by a call.
    Idle,
    /// Draining a call's queue.
    Running,
    /// Terminated or failed; unusable until the pool is respawned.
    Interrupted,
}

/// How a unit feeds tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Independent tasks.
    Parallel,
    /// A task without an explicit input receives the previous result.
    Sequential,
}

/// Kinds of unit notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadEventKind {
    /// A unit started draining a call.
    Progress,
    /// A unit stopped draining, for whatever reason.
    Complete,
    /// A unit stopped because of a failure or an interruption.
    Error,
}

/// Notification emitted by an execution unit.
#[derive(Debug, Clone)]
pub struct ThreadEvent {
    /// Emitting unit.
    pub thread_id: usize,
    /// Event kind.
    pub kind: ThreadEventKind,
    /// Failure description for `Error` events.
    pub reason: Option<String>,
    /// Whether the failure requires a respawn of the pool.
    pub fatal: bool,
}

/// Shared bus carrying unit notifications.
pub type ThreadEvents = EventBus<ThreadEventKind, ThreadEvent>;

/// How a drain ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DrainOutcome {
    /// The queue ran empty.
    Drained,
    /// The executor returned a failure; the failed task is consumed.
    Failed(TaskFailure),
    /// The unit was terminated.
    Interrupted,
}

/// A reusable execution unit wrapping one executor.
pub struct Thread {
    id: usize,
    state: Mutex<ThreadState>,
    executor: Box<dyn Executor>,
    events: Arc<ThreadEvents>,
    counters: Arc<ThreadsCounters>,
    interrupt: Notify,
    throttle_poll_interval: Duration,
}

impl Thread {
    pub(crate) fn new(
        id: usize,
        executor: Box<dyn Executor>,
        events: Arc<ThreadEvents>,
        counters: Arc<ThreadsCounters>,
        throttle_poll_interval: Duration,
    ) -> Self {
        Self {
            id,
            state: Mutex::new(ThreadState::Idle),
            executor,
            events,
            counters,
            interrupt: Notify::new(),
            throttle_poll_interval,
        }
    }

    /// Unit identifier (its position in the pool).
    #[must_use]
    pub const fn id(&self) -> usize {
        self.id
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ThreadState {
        *self.state.lock()
    }

    /// Interrupt the unit and terminate its executor.
    ///
    /// A task already dispatched is not preempted; the drain loop stops at
    /// its next check point and any throttle wait is cut short.
    pub fn terminate(&self) {
        *self.state.lock() = ThreadState::Interrupted;
        self.executor.terminate();
        self.interrupt.notify_waiters();
        debug!(thread_id = self.id, "thread terminated");
    }

    /// Atomically move `Idle -> Running`. Returns whether the claim succeeded.
    fn try_claim(&self) -> bool {
        let mut state = self.state.lock();
        if *state == ThreadState::Idle {
            *state = ThreadState::Running;
            true
        } else {
            false
        }
    }

    /// Claim the unit and start draining `ctx` on a detached task.
    ///
    /// The drain outlives the returned handle: dropping it does not stop the
    /// unit, which keeps taking tasks until `ctx` runs dry.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadsError::ThreadBusy`] if the unit is not idle.
    pub(crate) fn execute(
        self: &Arc<Self>,
        ctx: &Arc<TransferContext>,
        mode: Mode,
    ) -> Result<JoinHandle<Result<DrainOutcome, ThreadsError>>, ThreadsError> {
        if !self.try_claim() {
            return Err(ThreadsError::ThreadBusy(self.id));
        }
        let thread = Arc::clone(self);
        let ctx = Arc::clone(ctx);
        Ok(tokio::spawn(async move { thread.drain(&ctx, mode).await }))
    }

    async fn drain(&self, ctx: &TransferContext, mode: Mode) -> Result<DrainOutcome, ThreadsError> {
        let _release = DrainGuard(self);
        self.emit(ThreadEventKind::Progress, None, false);
        debug!(
            thread_id = self.id,
            call_id = %ctx.call_id(),
            mode = ?mode,
            total = ctx.total_size(),
            "thread draining call"
        );

        self.drain_loop(ctx, mode).await
    }

    /// `Running -> Idle`, then announce the unit is free.
    fn release(&self) {
        {
            let mut state = self.state.lock();
            if *state == ThreadState::Running {
                *state = ThreadState::Idle;
            }
        }
        self.emit(ThreadEventKind::Complete, None, false);
    }

    async fn drain_loop(
        &self,
        ctx: &TransferContext,
        mode: Mode,
    ) -> Result<DrainOutcome, ThreadsError> {
        loop {
            if self.state() != ThreadState::Running {
                return Ok(DrainOutcome::Interrupted);
            }

            let Some(mut task) = ctx.take_next() else {
                return Ok(DrainOutcome::Drained);
            };

            if let Some(throttle) = ctx.throttle() {
                match self.wait_for_throttle(throttle.as_ref()).await {
                    Ok(true) => {}
                    Ok(false) => {
                        ctx.put_back(task);
                        self.emit(ThreadEventKind::Error, Some("interrupted".into()), false);
                        return Ok(DrainOutcome::Interrupted);
                    }
                    Err(e) => {
                        ctx.put_back(task);
                        error!(
                            thread_id = self.id,
                            error = %e,
                            "throttle failed, interrupting thread"
                        );
                        self.emit(ThreadEventKind::Error, Some(e.to_string()), true);
                        return Err(ThreadsError::Throttle(e.to_string()));
                    }
                }
            }

            if mode == Mode::Sequential && task.message.is_none() {
                task.message = ctx.last_result();
            }

            let index = task.index();
            debug!(
                thread_id = self.id,
                index = index,
                handler = %task.handler,
                "dispatching task"
            );

            match self.executor.run(&task.handler, task.message).await {
                Ok(value) => {
                    self.counters.completed_tasks.fetch_add(1, Ordering::Relaxed);
                    let progress = ctx.record(index, value);
                    debug!(
                        thread_id = self.id,
                        index = index,
                        progress = progress,
                        "task completed"
                    );
                }
                Err(failure) => {
                    self.counters.failed_tasks.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        thread_id = self.id,
                        index = index,
                        error = %failure,
                        "task failed, thread stops draining"
                    );
                    if failure.is_fatal() {
                        *self.state.lock() = ThreadState::Interrupted;
                    }
                    self.emit(
                        ThreadEventKind::Error,
                        Some(failure.to_string()),
                        failure.is_fatal(),
                    );
                    return Ok(DrainOutcome::Failed(failure));
                }
            }
        }
    }

    /// Poll `throttle` until it lets a task through (`Ok(true)`) or the unit
    /// is interrupted (`Ok(false)`). A throttle error interrupts the unit.
    async fn wait_for_throttle(&self, throttle: &dyn Throttle) -> AppResult<bool> {
        loop {
            let interrupted = self.interrupt.notified();
            if self.state() == ThreadState::Interrupted {
                return Ok(false);
            }

            match throttle.ready().await {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(e) => {
                    *self.state.lock() = ThreadState::Interrupted;
                    return Err(e);
                }
            }

            tokio::select! {
                () = tokio::time::sleep(self.throttle_poll_interval) => {}
                () = interrupted => {}
            }
        }
    }

    fn emit(&self, kind: ThreadEventKind, reason: Option<String>, fatal: bool) {
        self.events.emit(
            kind,
            &ThreadEvent {
                thread_id: self.id,
                kind,
                reason,
                fatal,
            },
        );
    }
}

/// Releases the unit however the drain ends, including when its task is
/// dropped mid-await.
struct DrainGuard<'a>(&'a Thread);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}

impl std::fmt::Debug for Thread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
