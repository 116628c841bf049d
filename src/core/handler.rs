//! Statically-known dispatch table shared by executors.
//!
//! Tasks never carry code. They name a handler registered here and carry a
//! serializable payload; each executor receives a clone of the registry at
//! construction time and dispatches by name.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::live::{LiveChannel, LiveHandler};

/// Identifier of a registered handler.
pub type HandlerId = String;

/// A compiled task body: optional input in, value or error message out.
pub type Handler = Arc<dyn Fn(Option<Value>) -> Result<Value, String> + Send + Sync>;

/// Name → handler table.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<HandlerId, Handler>,
    live_handlers: HashMap<HandlerId, LiveHandler>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any previous entry.
    #[must_use]
    pub fn with_handler<F>(mut self, name: impl Into<HandlerId>, handler: F) -> Self
    where
        F: Fn(Option<Value>) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.register(name, handler);
        self
    }

    /// Register `handler` under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: impl Into<HandlerId>, handler: F)
    where
        F: Fn(Option<Value>) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(handler));
    }

    /// Register a live handler under `name`, replacing any previous entry.
    #[must_use]
    pub fn with_live_handler<F>(mut self, name: impl Into<HandlerId>, handler: F) -> Self
    where
        F: Fn(Option<Value>, &LiveChannel) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.register_live(name, handler);
        self
    }

    /// Register a live handler under `name`, replacing any previous entry.
    pub fn register_live<F>(&mut self, name: impl Into<HandlerId>, handler: F)
    where
        F: Fn(Option<Value>, &LiveChannel) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.live_handlers.insert(name.into(), Arc::new(handler));
    }

    /// Look up a live handler by name.
    #[must_use]
    pub fn get_live(&self, name: &str) -> Option<LiveHandler> {
        self.live_handlers.get(name).cloned()
    }

    /// Look up a handler by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Handler> {
        self.handlers.get(name).cloned()
    }

    /// Whether a handler is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Number of registered handlers, live ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len() + self.live_handlers.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty() && self.live_handlers.is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        let mut live: Vec<&str> = self.live_handlers.keys().map(String::as_str).collect();
        live.sort_unstable();
        f.debug_struct("HandlerRegistry")
            .field("handlers", &names)
            .field("live_handlers", &live)
            .finish()
    }
}
