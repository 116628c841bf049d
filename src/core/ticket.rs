//! FIFO ticket lock serializing concurrent scheduling calls on one pool.
//!
//! A call draws a ticket, waits until its ticket is the lowest pending one,
//! claims the units it needs, then releases the ticket into the loaded set.
//! Once nothing is pending both sets are cleared and numbering restarts.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::event::{EventBus, ListenerId, ListenerOptions};

/// Ticket queue events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TicketEvent {
    /// A ticket was released into the loaded set.
    Push,
    /// A ticket was dropped from the pending set.
    Remove,
}

#[derive(Debug, Default)]
struct TicketState {
    pending: BTreeSet<u64>,
    loaded: BTreeSet<u64>,
}

/// Sorted pending tickets plus the set of already released ones.
#[derive(Default)]
pub struct TicketQueue {
    state: Mutex<TicketState>,
    events: EventBus<TicketEvent, u64>,
}

impl TicketQueue {
    /// Create an empty ticket queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next ticket: `from + 1`, or one past the highest known ticket.
    pub fn increment(&self, from: Option<u64>) -> u64 {
        let mut state = self.state.lock();
        let highest = state
            .pending
            .last()
            .copied()
            .max(state.loaded.last().copied())
            .unwrap_or(0);
        let value = from.map_or(highest, |f| f.max(highest)) + 1;
        state.pending.insert(value);
        value
    }

    /// Issue a ticket wrapped in a guard that releases it when dropped.
    pub fn issue(self: &Arc<Self>) -> Ticket {
        let value = self.increment(None);
        Ticket {
            value,
            queue: Arc::clone(self),
            released: false,
        }
    }

    /// Mark `value` as loaded. Clears the queue once nothing is pending.
    pub fn push(&self, value: u64) {
        {
            let mut state = self.state.lock();
            state.pending.remove(&value);
            state.loaded.insert(value);
            if state.pending.is_empty() {
                state.loaded.clear();
            }
        }
        self.events.emit(TicketEvent::Push, &value);
    }

    /// Drop a pending ticket without marking it loaded.
    pub fn remove_by_value(&self, value: u64) {
        let removed = {
            let mut state = self.state.lock();
            let removed = state.pending.remove(&value);
            if state.pending.is_empty() {
                state.loaded.clear();
            }
            removed
        };
        if removed {
            self.events.emit(TicketEvent::Remove, &value);
        }
    }

    /// Highest loaded ticket.
    #[must_use]
    pub fn highest(&self) -> Option<u64> {
        self.state.lock().loaded.last().copied()
    }

    /// Highest pending ticket.
    #[must_use]
    pub fn last(&self) -> Option<u64> {
        self.state.lock().pending.last().copied()
    }

    /// Pending tickets in ascending order.
    #[must_use]
    pub fn pending(&self) -> Vec<u64> {
        self.state.lock().pending.iter().copied().collect()
    }

    /// Number of pending tickets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Whether no ticket is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().pending.is_empty()
    }

    /// Whether `ticket` may pass the fairness gate.
    #[must_use]
    pub fn is_next(&self, ticket: u64) -> bool {
        self.state.lock().pending.first() == Some(&ticket)
    }

    /// Forget every ticket.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.pending.clear();
        state.loaded.clear();
    }

    /// Subscribe to ticket queue changes.
    pub fn on<F>(&self, event: TicketEvent, callback: F, options: ListenerOptions) -> ListenerId
    where
        F: Fn(&u64) + Send + Sync + 'static,
    {
        self.events.on(event, callback, options)
    }

    /// Suspend until `ticket` is the lowest pending ticket.
    ///
    /// Woken by every push/remove rather than polled. Returns immediately if
    /// the ticket is no longer pending.
    pub async fn wait_for_turn(&self, ticket: u64) {
        loop {
            let (wake, woken) = oneshot::channel::<()>();
            let wake = Arc::new(Mutex::new(Some(wake)));
            let listeners = [TicketEvent::Push, TicketEvent::Remove].map(|kind| {
                let wake = Arc::clone(&wake);
                let id = self.events.on(
                    kind,
                    move |_| {
                        if let Some(tx) = wake.lock().take() {
                            let _ = tx.send(());
                        }
                    },
                    ListenerOptions::once(),
                );
                (kind, id)
            });

            let ready = {
                let state = self.state.lock();
                state.pending.first() == Some(&ticket) || !state.pending.contains(&ticket)
            };
            if !ready {
                tracing::trace!(ticket = ticket, "waiting for ticket turn");
                let _ = woken.await;
            }

            for (kind, id) in listeners {
                self.events.off(kind, id);
            }
            if ready {
                return;
            }
        }
    }
}

/// A pending ticket. Dropping it releases the ticket.
pub struct Ticket {
    value: u64,
    queue: Arc<TicketQueue>,
    released: bool,
}

impl Ticket {
    /// Ticket number.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.value
    }

    /// Wait until this ticket is first in line.
    pub async fn wait_for_turn(&self) {
        self.queue.wait_for_turn(self.value).await;
    }

    /// Release the ticket into the loaded set.
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.queue.push(self.value);
        }
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            self.queue.remove_by_value(self.value);
        }
    }
}
