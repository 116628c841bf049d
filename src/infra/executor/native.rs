//! Native executor: one dedicated OS thread per execution unit.
//!
//! The unit sends `Run` commands over a channel; the thread dispatches into
//! its own copy of the handler registry and answers on a oneshot. Dropping
//! or terminating the executor closes the channel and the thread exits.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use async_trait::async_trait;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, error};

use crate::config::ThreadsConfig;
use crate::core::{
    Executor, ExecutorFactory, HandlerRegistry, LiveChannel, Outcome, TaskFailure, ThreadsError,
};

/// Message sent from an execution unit to its executor thread.
enum Command {
    Run {
        handler: String,
        input: Option<Value>,
        reply: oneshot::Sender<Outcome>,
    },
    RunLive {
        handler: String,
        input: Option<Value>,
        channel: LiveChannel,
        reply: oneshot::Sender<Outcome>,
    },
    Terminate,
}

/// Executor backed by a dedicated OS thread.
pub struct NativeExecutor {
    name: String,
    command_tx: Mutex<Option<Sender<Command>>>,
}

impl NativeExecutor {
    /// Spawn the executor thread.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadsError::Executor`] if the OS refuses to create the thread.
    pub fn spawn(
        name: impl Into<String>,
        registry: HandlerRegistry,
        stack_size: usize,
    ) -> Result<Self, ThreadsError> {
        let name = name.into();
        let (command_tx, command_rx) = unbounded::<Command>();

        let thread_name = name.clone();
        thread::Builder::new()
            .name(name.clone())
            .stack_size(stack_size)
            .spawn(move || executor_loop(&thread_name, &command_rx, &registry))
            .map_err(|e| {
                error!(executor = %name, error = %e, "failed to spawn executor thread");
                ThreadsError::Executor(format!("failed to spawn {name}: {e}"))
            })?;

        Ok(Self {
            name,
            command_tx: Mutex::new(Some(command_tx)),
        })
    }

    /// Thread name of this executor.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the executor still accepts work.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.command_tx.lock().is_some()
    }

    /// Send the command built around `reply` and wait for its outcome.
    async fn request<F>(&self, command: F) -> Outcome
    where
        F: FnOnce(oneshot::Sender<Outcome>) -> Command,
    {
        let (reply, response) = oneshot::channel();
        let sent = {
            let command_tx = self.command_tx.lock();
            command_tx
                .as_ref()
                .is_some_and(|tx| tx.send(command(reply)).is_ok())
        };
        if !sent {
            return Err(TaskFailure::executor(format!("{} is not running", self.name)));
        }

        response.await.unwrap_or_else(|_| {
            Err(TaskFailure::executor(format!("{} dropped the task", self.name)))
        })
    }
}

#[async_trait]
impl Executor for NativeExecutor {
    async fn run(&self, handler: &str, input: Option<Value>) -> Outcome {
        self.request(|reply| Command::Run {
            handler: handler.to_owned(),
            input,
            reply,
        })
        .await
    }

    async fn run_live(
        &self,
        handler: &str,
        input: Option<Value>,
        channel: LiveChannel,
    ) -> Outcome {
        self.request(|reply| Command::RunLive {
            handler: handler.to_owned(),
            input,
            channel,
            reply,
        })
        .await
    }

    fn terminate(&self) {
        if let Some(command_tx) = self.command_tx.lock().take() {
            let _ = command_tx.send(Command::Terminate);
            debug!(executor = %self.name, "executor terminated");
        }
    }
}

impl Drop for NativeExecutor {
    fn drop(&mut self) {
        // The thread is detached, not joined: an in-flight handler finishes on its own.
        self.terminate();
    }
}

/// Blocking receive loop of an executor thread.
fn executor_loop(name: &str, command_rx: &Receiver<Command>, registry: &HandlerRegistry) {
    debug!(executor = %name, "executor thread started");

    while let Ok(command) = command_rx.recv() {
        match command {
            Command::Run {
                handler,
                input,
                reply,
            } => {
                let outcome = dispatch(registry, &handler, input);
                let _ = reply.send(outcome);
            }
            Command::RunLive {
                handler,
                input,
                channel,
                reply,
            } => {
                let outcome = dispatch_live(registry, &handler, input, &channel);
                let _ = reply.send(outcome);
            }
            Command::Terminate => break,
        }
    }

    debug!(executor = %name, "executor thread exiting");
}

/// Run one handler, turning errors and panics into task failures.
fn dispatch(registry: &HandlerRegistry, handler: &str, input: Option<Value>) -> Outcome {
    let Some(function) = registry.get(handler) else {
        return Err(TaskFailure::task(format!("unknown handler `{handler}`")));
    };

    settle(handler, panic::catch_unwind(AssertUnwindSafe(|| function(input))))
}

/// Run one live handler against `channel`.
fn dispatch_live(
    registry: &HandlerRegistry,
    handler: &str,
    input: Option<Value>,
    channel: &LiveChannel,
) -> Outcome {
    let Some(function) = registry.get_live(handler) else {
        return Err(TaskFailure::task(format!("unknown live handler `{handler}`")));
    };

    settle(handler, panic::catch_unwind(AssertUnwindSafe(|| function(input, channel))))
}

fn settle(handler: &str, result: thread::Result<Result<Value, String>>) -> Outcome {
    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(message)) => Err(TaskFailure::task(message)),
        Err(payload) => Err(TaskFailure::task(format!(
            "handler `{handler}` panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into())
}

/// Factory spawning one [`NativeExecutor`] per execution unit.
#[derive(Debug, Clone)]
pub struct NativeExecutorFactory {
    registry: HandlerRegistry,
    name_prefix: String,
    stack_size: usize,
}

impl NativeExecutorFactory {
    /// Factory using the thread naming and stack size from `config`.
    #[must_use]
    pub fn new(registry: HandlerRegistry, config: &ThreadsConfig) -> Self {
        Self {
            registry,
            name_prefix: config.thread_name_prefix.clone(),
            stack_size: config.thread_stack_size,
        }
    }
}

impl ExecutorFactory for NativeExecutorFactory {
    fn create(&self, thread_id: usize) -> Result<Box<dyn Executor>, ThreadsError> {
        let executor = NativeExecutor::spawn(
            format!("{}-{thread_id}", self.name_prefix),
            self.registry.clone(),
            self.stack_size,
        )?;
        Ok(Box::new(executor))
    }
}
