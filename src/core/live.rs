//! Bidirectional channel between a caller and a long-running task.
//!
//! The caller's side is a latest-value slot: a task reading it sees only the
//! most recent value, and only once. The task's side is an unbounded stream
//! the caller drains in order.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::executor::Outcome;
use super::ThreadsError;

/// A task body that can talk to its caller while it runs.
pub type LiveHandler =
    Arc<dyn Fn(Option<Value>, &LiveChannel) -> Result<Value, String> + Send + Sync>;

#[derive(Default)]
struct LiveSlot {
    value: Option<Value>,
    updated: bool,
}

/// Task-side end of a live connection.
#[derive(Clone)]
pub struct LiveChannel {
    inbox: Arc<Mutex<LiveSlot>>,
    outbox: mpsc::UnboundedSender<Value>,
}

impl LiveChannel {
    /// The caller's latest value, if it changed since the last call.
    #[must_use]
    pub fn receive(&self) -> Option<Value> {
        let mut slot = self.inbox.lock();
        if !slot.updated {
            return None;
        }
        slot.updated = false;
        slot.value.clone()
    }

    /// Push `value` to the caller. Returns `false` once the caller is gone.
    pub fn send(&self, value: Value) -> bool {
        self.outbox.send(value).is_ok()
    }
}

impl fmt::Debug for LiveChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveChannel")
            .field("updated", &self.inbox.lock().updated)
            .finish_non_exhaustive()
    }
}

/// Caller-side handle of a running live task.
pub struct LiveTask {
    inbox: Arc<Mutex<LiveSlot>>,
    outbox: mpsc::UnboundedReceiver<Value>,
    handle: JoinHandle<Outcome>,
}

impl LiveTask {
    /// Publish `value` to the task. Sending the value it already holds is a
    /// no-op, so the task does not see it twice.
    pub fn send(&self, value: Value) {
        let mut slot = self.inbox.lock();
        if slot.value.as_ref() == Some(&value) {
            return;
        }
        slot.value = Some(value);
        slot.updated = true;
    }

    /// Next value the task sent, or `None` once the task finished and every
    /// sent value was read.
    pub async fn receive(&mut self) -> Option<Value> {
        self.outbox.recv().await
    }

    /// Next value the task sent, without waiting.
    pub fn try_receive(&mut self) -> Option<Value> {
        self.outbox.try_recv().ok()
    }

    /// Whether the task has returned.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the task's final value.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadsError::Task`] when the handler failed, or
    /// [`ThreadsError::Executor`] if the task was lost.
    pub async fn join(self) -> Result<Value, ThreadsError> {
        match self.handle.await {
            Ok(outcome) => outcome.map_err(ThreadsError::Task),
            Err(e) => Err(ThreadsError::Executor(format!("live task lost: {e}"))),
        }
    }
}

impl fmt::Debug for LiveTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveTask")
            .field("finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}

/// Create both ends of a connection. `start` receives the task's end and
/// returns the handle of whatever drives it.
pub(crate) fn connect<F>(start: F) -> LiveTask
where
    F: FnOnce(LiveChannel) -> JoinHandle<Outcome>,
{
    let inbox = Arc::new(Mutex::new(LiveSlot::default()));
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = start(LiveChannel {
        inbox: Arc::clone(&inbox),
        outbox: tx,
    });
    LiveTask {
        inbox,
        outbox: rx,
        handle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::executor::TaskFailure;
    use serde_json::json;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_latest_value_is_seen_once() {
        let (channel_tx, channel_rx) = oneshot::channel();
        let task = connect(|channel| {
            tokio::spawn(async move {
                let _ = channel_tx.send(channel);
                Ok(Value::Null)
            })
        });
        let channel = channel_rx.await.unwrap();

        assert_eq!(channel.receive(), None);
        task.send(json!(1));
        task.send(json!(2));
        assert_eq!(channel.receive(), Some(json!(2)));
        assert_eq!(channel.receive(), None);

        task.send(json!(2));
        assert_eq!(channel.receive(), None);
        task.send(json!(3));
        assert_eq!(channel.receive(), Some(json!(3)));
    }

    #[tokio::test]
    async fn test_task_values_arrive_in_order_then_close() {
        let mut task = connect(|channel| {
            tokio::spawn(async move {
                for n in 0..3 {
                    channel.send(json!(n));
                }
                Ok(json!("done"))
            })
        });

        assert_eq!(task.receive().await, Some(json!(0)));
        assert_eq!(task.receive().await, Some(json!(1)));
        assert_eq!(task.try_receive(), Some(json!(2)));
        assert_eq!(task.receive().await, None);
        assert_eq!(task.join().await.unwrap(), json!("done"));
    }

    #[tokio::test]
    async fn test_join_surfaces_failure() {
        let task = connect(|_| tokio::spawn(async { Err(TaskFailure::task("bad input")) }));
        let err = task.join().await.unwrap_err();
        assert!(matches!(err, ThreadsError::Task(f) if f.message == "bad input"));
    }
}
