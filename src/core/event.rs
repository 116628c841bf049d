//! Minimal typed publish/subscribe bus.
//!
//! Listeners are snapshotted before each emit, so callbacks may subscribe or
//! unsubscribe re-entrantly. A `once` listener is claimed with an atomic swap
//! and therefore fires at most once even when two emits race.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Identifier returned by [`EventBus::on`], used to unsubscribe.
pub type ListenerId = u64;

/// Subscription options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerOptions {
    /// Remove the listener after its first invocation.
    pub once: bool,
}

impl ListenerOptions {
    /// Options for a listener that fires a single time.
    #[must_use]
    pub const fn once() -> Self {
        Self { once: true }
    }
}

type Callback<D> = Box<dyn Fn(&D) + Send + Sync>;

struct Listener<D> {
    id: ListenerId,
    once: bool,
    fired: AtomicBool,
    callback: Callback<D>,
}

/// Typed event bus keyed by event kind `K`, carrying data `D`.
pub struct EventBus<K, D> {
    listeners: Mutex<HashMap<K, Vec<Arc<Listener<D>>>>>,
    next_id: AtomicU64,
}

impl<K, D> Default for EventBus<K, D>
where
    K: Eq + Hash + Copy,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, D> EventBus<K, D>
where
    K: Eq + Hash + Copy,
{
    /// Create a bus with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribe `callback` to `kind`.
    pub fn on<F>(&self, kind: K, callback: F, options: ListenerOptions) -> ListenerId
    where
        F: Fn(&D) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let listener = Arc::new(Listener {
            id,
            once: options.once,
            fired: AtomicBool::new(false),
            callback: Box::new(callback),
        });
        self.listeners.lock().entry(kind).or_default().push(listener);
        id
    }

    /// Remove a listener. Returns whether it was still registered.
    pub fn off(&self, kind: K, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let Some(entries) = listeners.get_mut(&kind) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|l| l.id != id);
        before != entries.len()
    }

    /// Invoke every listener registered for `kind`.
    pub fn emit(&self, kind: K, data: &D) {
        let snapshot: Vec<Arc<Listener<D>>> = match self.listeners.lock().get(&kind) {
            Some(entries) if !entries.is_empty() => entries.clone(),
            _ => return,
        };

        let mut spent = false;
        for listener in &snapshot {
            if listener.once {
                if listener.fired.swap(true, Ordering::AcqRel) {
                    continue;
                }
                spent = true;
            }
            (listener.callback)(data);
        }

        if spent {
            if let Some(entries) = self.listeners.lock().get_mut(&kind) {
                entries.retain(|l| !(l.once && l.fired.load(Ordering::Acquire)));
            }
        }
    }

    /// Number of listeners currently registered for `kind`.
    #[must_use]
    pub fn listener_count(&self, kind: K) -> usize {
        self.listeners.lock().get(&kind).map_or(0, Vec::len)
    }
}

impl<K, D> EventBus<K, D>
where
    K: Eq + Hash + Copy,
    D: Clone + Send + 'static,
{
    /// Future-style subscription: resolves with the data of the next `kind`
    /// event. Register before checking the condition you wait on so no
    /// wake-up is lost.
    pub fn once(&self, kind: K) -> oneshot::Receiver<D> {
        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        self.on(
            kind,
            move |data: &D| {
                if let Some(tx) = tx.lock().take() {
                    let _ = tx.send(data.clone());
                }
            },
            ListenerOptions::once(),
        );
        rx
    }
}
