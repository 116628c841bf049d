//! Pool manager: owns the execution units and schedules calls onto them.
//!
//! # Scheduling
//!
//! Every `execute_*` call draws a ticket. While it still has quota and the
//! queue is not empty, it waits for its ticket to be first in line and then
//! claims idle units, waiting on the units' `Complete` notification when
//! none are idle. The ticket is released as soon as the quota is spent (or
//! the queue ran dry), so a later call can never claim a freed unit ahead of
//! an earlier one.
//!
//! Drains run on detached tasks. If the caller drops an `execute_*` future,
//! the claimed units finish their in-flight task and go idle, and the tasks
//! not yet taken are put back in the caller's queue.
//!
//! [`Threads::run_once`] and [`Threads::run_live`] bypass the units: each
//! call gets its own executor from the factory, terminated once the task
//! returns.
//!
//! # Example
//!
//! ```rust,ignore
//! use prometheus_threads::config::{Environment, ThreadsConfig};
//! use prometheus_threads::core::{ExecuteOptions, HandlerRegistry, Task, TaskQueue, Threads};
//! use serde_json::json;
//!
//! let registry = HandlerRegistry::new().with_handler("square", |input| {
//!     let n = input.and_then(|v| v.as_i64()).unwrap_or(2);
//!     Ok(json!(n * n))
//! });
//! let config = ThreadsConfig::new().with_thread_count(2);
//! let threads = Threads::new(config.clone(), Environment::native(registry, &config))?;
//! threads.load()?;
//!
//! let mut queue = TaskQueue::new(30);
//! queue.push([("square", json!(2)), ("square", json!(3)), ("square", json!(4))])?;
//! let results = threads
//!     .execute_parallel(&mut queue, ExecuteOptions::new().with_threads(2))
//!     .await?;
//! assert_eq!(results, vec![Some(json!(4)), Some(json!(9)), Some(json!(16))]);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{Environment, ThreadsConfig};

use super::event::{ListenerId, ListenerOptions};
use super::executor::Executor;
use super::live::{self, LiveTask};
use super::stats::{ThreadsCounters, ThreadsStats};
use super::task_queue::TaskQueue;
use super::thread::{
    DrainOutcome, Mode, Thread, ThreadEvent, ThreadEventKind, ThreadEvents, ThreadState,
};
use super::ticket::TicketQueue;
use super::transfer::{ExecuteOptions, TransferContext};
use super::ThreadsError;

/// Lifecycle state of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolState {
    /// Constructed, no units yet.
    Initialized,
    /// Binding the executor factory and spawning units.
    Loading,
    /// Ready to schedule.
    Loaded,
    /// An unrecoverable failure occurred; `spawn()` is required.
    Error,
    /// Torn down; `spawn()` is required.
    Terminated,
}

/// Fixed-size pool of reusable execution units.
pub struct Threads {
    config: ThreadsConfig,
    environment: Environment,
    state: Arc<RwLock<PoolState>>,
    thread_count: Mutex<usize>,
    threads: RwLock<Vec<Arc<Thread>>>,
    tickets: Arc<TicketQueue>,
    events: Arc<ThreadEvents>,
    counters: Arc<ThreadsCounters>,
    spawn_lock: Mutex<()>,
    dedicated_ids: AtomicUsize,
}

type DrainHandle = JoinHandle<Result<DrainOutcome, ThreadsError>>;

impl Threads {
    /// Create a pool. No unit is spawned until [`load`](Self::load),
    /// [`spawn`](Self::spawn), or the first scheduling call.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadsError::InvalidConfig`] if the configuration is invalid.
    pub fn new(config: ThreadsConfig, environment: Environment) -> Result<Self, ThreadsError> {
        config.validate().map_err(ThreadsError::InvalidConfig)?;

        let state = Arc::new(RwLock::new(PoolState::Initialized));
        let events = Arc::new(ThreadEvents::new());

        // Fatal unit failures flip the pool to Error as soon as they happen,
        // so calls still acquiring units stop immediately.
        let pool_state = Arc::clone(&state);
        events.on(
            ThreadEventKind::Error,
            move |event: &ThreadEvent| {
                if event.fatal {
                    let mut state = pool_state.write();
                    if *state == PoolState::Loaded {
                        *state = PoolState::Error;
                    }
                    error!(
                        thread_id = event.thread_id,
                        reason = event.reason.as_deref().unwrap_or("unknown"),
                        "thread failed, pool moved to error state"
                    );
                }
            },
            ListenerOptions::default(),
        );

        Ok(Self {
            dedicated_ids: AtomicUsize::new(environment.max_concurrency()),
            thread_count: Mutex::new(config.thread_count),
            config,
            environment,
            state,
            threads: RwLock::new(Vec::new()),
            tickets: Arc::new(TicketQueue::new()),
            events,
            counters: Arc::new(ThreadsCounters::default()),
            spawn_lock: Mutex::new(()),
        })
    }

    /// Spawn the configured units if the pool is still `Initialized`.
    ///
    /// # Errors
    ///
    /// Returns the executor factory's error, or
    /// [`ThreadsError::UnexpectedState`] if the pool failed or was terminated.
    pub fn load(&self) -> Result<(), ThreadsError> {
        let _guard = self.spawn_lock.lock();
        match self.state() {
            PoolState::Loaded => Ok(()),
            PoolState::Initialized => self.spawn_locked(None),
            other => Err(ThreadsError::UnexpectedState(other)),
        }
    }

    /// Terminate every unit and create `count` fresh ones (default: the last
    /// configured count), clamped to `1..=max_thread_count()`.
    ///
    /// # Errors
    ///
    /// Returns the executor factory's error; the pool is then in `Error`.
    pub fn spawn(&self, count: Option<usize>) -> Result<(), ThreadsError> {
        let _guard = self.spawn_lock.lock();
        self.spawn_locked(count)
    }

    fn spawn_locked(&self, count: Option<usize>) -> Result<(), ThreadsError> {
        *self.state.write() = PoolState::Loading;

        let count = {
            let mut configured = self.thread_count.lock();
            let count = count
                .unwrap_or(*configured)
                .clamp(1, self.environment.max_concurrency());
            *configured = count;
            count
        };

        let old = std::mem::take(&mut *self.threads.write());
        for thread in &old {
            thread.terminate();
        }

        let factory = self.environment.executor_factory();
        let mut fresh = Vec::with_capacity(count);
        for id in 0..count {
            match factory.create(id) {
                Ok(executor) => fresh.push(Arc::new(Thread::new(
                    id,
                    executor,
                    Arc::clone(&self.events),
                    Arc::clone(&self.counters),
                    self.config.throttle_poll_interval(),
                ))),
                Err(e) => {
                    for thread in &fresh {
                        thread.terminate();
                    }
                    *self.state.write() = PoolState::Error;
                    error!(thread_id = id, error = %e, "failed to create executor");
                    return Err(e);
                }
            }
        }

        *self.threads.write() = fresh;
        *self.state.write() = PoolState::Loaded;
        info!(
            thread_count = count,
            max_thread_count = self.environment.max_concurrency(),
            "threads spawned"
        );
        Ok(())
    }

    /// Terminate every unit. Scheduling fails until [`spawn`](Self::spawn).
    pub fn terminate(&self) {
        for thread in self.threads.read().iter() {
            thread.terminate();
        }
        *self.state.write() = PoolState::Terminated;
        info!("threads terminated");
    }

    /// Run `queue` on a single unit, chaining each task's input to the
    /// previous result unless the task carries an explicit message.
    ///
    /// Returns one slot per submitted task in submission order; a slot is
    /// `None` when its task failed or was never run. Undrained tasks are left
    /// in `queue`, renumbered.
    ///
    /// # Errors
    ///
    /// Fails if the pool is not ready or the throttle fails.
    pub async fn execute_sequential(
        &self,
        queue: &mut TaskQueue,
        options: ExecuteOptions,
    ) -> Result<Vec<Option<Value>>, ThreadsError> {
        self.ensure_ready()?;
        if queue.is_empty() {
            return Ok(Vec::new());
        }
        self.run(queue, &options, Mode::Sequential, 1).await
    }

    /// Run `queue` on up to `options.threads` units concurrently.
    ///
    /// Returns one slot per submitted task in submission order, regardless
    /// of which unit ran which task. Undrained tasks are left in `queue`.
    ///
    /// # Errors
    ///
    /// Fails if the pool is not ready or the throttle fails.
    pub async fn execute_parallel(
        &self,
        queue: &mut TaskQueue,
        options: ExecuteOptions,
    ) -> Result<Vec<Option<Value>>, ThreadsError> {
        self.ensure_ready()?;
        if queue.is_empty() {
            return Ok(Vec::new());
        }

        let pool_size = self.thread_count();
        let units = options
            .threads
            .unwrap_or(pool_size)
            .min(pool_size)
            .max(1)
            .min(queue.len());

        self.run(queue, &options, Mode::Parallel, units).await
    }

    /// Run one task on a dedicated executor, outside the pool's units.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadsError::Terminated`] after [`terminate`](Self::terminate),
    /// the factory's error if no executor could be created, or
    /// [`ThreadsError::Task`] if the task failed.
    pub async fn run_once(
        &self,
        handler: &str,
        input: Option<Value>,
    ) -> Result<Value, ThreadsError> {
        let executor = self.dedicated_executor()?;
        let outcome = executor.run(handler, input).await;
        executor.terminate();
        outcome.map_err(ThreadsError::Task)
    }

    /// Start a live handler on a dedicated executor and return the caller's
    /// end of its channel.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadsError::Terminated`] after [`terminate`](Self::terminate),
    /// or the factory's error if no executor could be created.
    pub fn run_live(&self, handler: &str, input: Option<Value>) -> Result<LiveTask, ThreadsError> {
        let executor = self.dedicated_executor()?;
        let handler = handler.to_owned();
        Ok(live::connect(move |channel| {
            tokio::spawn(async move {
                let outcome = executor.run_live(&handler, input, channel).await;
                executor.terminate();
                outcome
            })
        }))
    }

    /// Subscribe to unit notifications.
    pub fn subscribe<F>(
        &self,
        kind: ThreadEventKind,
        callback: F,
        options: ListenerOptions,
    ) -> ListenerId
    where
        F: Fn(&ThreadEvent) + Send + Sync + 'static,
    {
        self.events.on(kind, callback, options)
    }

    /// Remove a subscription made with [`subscribe`](Self::subscribe).
    pub fn unsubscribe(&self, kind: ThreadEventKind, id: ListenerId) -> bool {
        self.events.off(kind, id)
    }

    /// Current pool state.
    #[must_use]
    pub fn state(&self) -> PoolState {
        *self.state.read()
    }

    /// Number of spawned units.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.threads.read().len()
    }

    /// State of every unit, by unit id.
    #[must_use]
    pub fn thread_states(&self) -> Vec<ThreadState> {
        self.threads.read().iter().map(|t| t.state()).collect()
    }

    /// Upper bound on units imposed by the environment.
    #[must_use]
    pub fn max_thread_count(&self) -> usize {
        self.environment.max_concurrency()
    }

    /// Pool configuration.
    #[must_use]
    pub const fn config(&self) -> &ThreadsConfig {
        &self.config
    }

    /// An empty task queue sized from the configuration.
    #[must_use]
    pub const fn task_queue(&self) -> TaskQueue {
        TaskQueue::new(self.config.max_queue_size)
    }

    /// Utilization snapshot.
    #[must_use]
    pub fn stats(&self) -> ThreadsStats {
        let threads = self.threads.read();
        let running = threads
            .iter()
            .filter(|t| t.state() == ThreadState::Running)
            .count();
        self.counters.snapshot(threads.len(), running)
    }

    fn ensure_ready(&self) -> Result<(), ThreadsError> {
        match self.state() {
            PoolState::Loaded => Ok(()),
            PoolState::Initialized => {
                warn!("threads not loaded, loading now; call load() first to avoid this");
                self.load()
            }
            PoolState::Loading => Err(ThreadsError::Loading),
            PoolState::Error => Err(ThreadsError::PoolFailed),
            PoolState::Terminated => Err(ThreadsError::Terminated),
        }
    }

    fn check_schedulable(&self) -> Result<(), ThreadsError> {
        match self.state() {
            PoolState::Loaded => Ok(()),
            PoolState::Error => Err(ThreadsError::PoolFailed),
            PoolState::Terminated => Err(ThreadsError::Terminated),
            PoolState::Loading => Err(ThreadsError::Loading),
            other @ PoolState::Initialized => Err(ThreadsError::UnexpectedState(other)),
        }
    }

    fn dedicated_executor(&self) -> Result<Box<dyn Executor>, ThreadsError> {
        if self.state() == PoolState::Terminated {
            return Err(ThreadsError::Terminated);
        }
        let id = self.dedicated_ids.fetch_add(1, Ordering::Relaxed);
        debug!(executor_id = id, "creating dedicated executor");
        self.environment.executor_factory().create(id)
    }

    /// Build the call's context, schedule it, and hand leftovers back.
    async fn run(
        &self,
        queue: &mut TaskQueue,
        options: &ExecuteOptions,
        mode: Mode,
        units: usize,
    ) -> Result<Vec<Option<Value>>, ThreadsError> {
        let call_id = Uuid::new_v4();
        let ctx = Arc::new(TransferContext::new(call_id, std::mem::take(queue), options));
        let restore = RestoreQueue {
            queue,
            ctx: Arc::clone(&ctx),
        };

        self.counters.calls.fetch_add(1, Ordering::Relaxed);
        self.counters
            .submitted_tasks
            .fetch_add(ctx.total_size() as u64, Ordering::Relaxed);
        debug!(
            call_id = %call_id,
            mode = ?mode,
            units = units,
            tasks = ctx.total_size(),
            "scheduling call"
        );

        let outcome = self.load_and_run(mode, &ctx, units).await;
        drop(restore);
        outcome.map(|()| ctx.take_results())
    }

    /// Claim up to `amount` units for `ctx` in ticket order, then wait for
    /// all of them to stop draining.
    ///
    /// A pool failure only fails the call while it holds no unit. Once a unit
    /// is draining, the call stops acquiring and returns what it produced.
    async fn load_and_run(
        &self,
        mode: Mode,
        ctx: &Arc<TransferContext>,
        amount: usize,
    ) -> Result<(), ThreadsError> {
        let mut ticket = self.tickets.issue();
        let mut running: Vec<DrainHandle> = Vec::with_capacity(amount);

        let acquired = async {
            while running.len() < amount && !ctx.is_empty() {
                if let Err(e) = self.check_schedulable() {
                    if running.is_empty() {
                        return Err(e);
                    }
                    debug!(
                        call_id = %ctx.call_id(),
                        error = %e,
                        claimed = running.len(),
                        "pool stopped scheduling, keeping claimed threads"
                    );
                    break;
                }

                // Subscribe before looking for an idle unit so a completion
                // in between is not missed.
                let completed = self.events.once(ThreadEventKind::Complete);
                ticket.wait_for_turn().await;

                if let Some((thread_id, handle)) = self.dispatch_idle(ctx, mode) {
                    running.push(handle);
                    debug!(
                        call_id = %ctx.call_id(),
                        ticket = ticket.value(),
                        thread_id = thread_id,
                        quota = amount - running.len(),
                        "thread claimed"
                    );
                    continue;
                }

                if !self.has_usable_thread() {
                    if running.is_empty() {
                        return Err(ThreadsError::NoUsableThreads);
                    }
                    break;
                }
                let _ = completed.await;
            }
            Ok::<(), ThreadsError>(())
        }
        .await;

        ticket.release();

        let mut failure = acquired.err();
        for handle in running {
            match handle.await {
                Ok(Ok(DrainOutcome::Failed(task_failure))) => {
                    debug!(
                        call_id = %ctx.call_id(),
                        error = %task_failure,
                        "thread stopped on failure"
                    );
                }
                Ok(Ok(DrainOutcome::Drained | DrainOutcome::Interrupted)) => {}
                Ok(Err(e)) => {
                    self.mark_failed();
                    failure.get_or_insert(e);
                }
                Err(join_error) => {
                    self.mark_failed();
                    error!(call_id = %ctx.call_id(), error = %join_error, "thread drain panicked");
                    failure.get_or_insert(ThreadsError::Executor(join_error.to_string()));
                }
            }
        }

        failure.map_or(Ok(()), Err)
    }

    /// Start `ctx` on the first idle unit.
    fn dispatch_idle(
        &self,
        ctx: &Arc<TransferContext>,
        mode: Mode,
    ) -> Option<(usize, DrainHandle)> {
        self.threads
            .read()
            .iter()
            .find_map(|t| t.execute(ctx, mode).ok().map(|handle| (t.id(), handle)))
    }

    fn has_usable_thread(&self) -> bool {
        self.threads
            .read()
            .iter()
            .any(|t| t.state() != ThreadState::Interrupted)
    }

    fn mark_failed(&self) {
        let mut state = self.state.write();
        if *state == PoolState::Loaded {
            *state = PoolState::Error;
        }
    }
}

/// Hands the undrained tasks back to the caller's queue however the call
/// ends, including when its future is dropped.
struct RestoreQueue<'a> {
    queue: &'a mut TaskQueue,
    ctx: Arc<TransferContext>,
}

impl Drop for RestoreQueue<'_> {
    fn drop(&mut self) {
        *self.queue = self.ctx.take_remaining();
        if !self.queue.is_empty() {
            debug!(
                call_id = %self.ctx.call_id(),
                remaining = self.queue.len(),
                "tasks left in queue"
            );
        }
    }
}

impl Drop for Threads {
    fn drop(&mut self) {
        for thread in self.threads.get_mut().iter() {
            thread.terminate();
        }
    }
}

impl std::fmt::Debug for Threads {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Threads")
            .field("state", &self.state())
            .field("thread_states", &self.thread_states())
            .finish_non_exhaustive()
    }
}
