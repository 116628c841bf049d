//! Host environment handed to the pool: concurrency ceiling and executor factory.

use std::fmt;
use std::sync::Arc;

use crate::core::ExecutorFactory;

/// Recommended upper bound on execution units: available parallelism minus
/// one, never less than one.
#[must_use]
pub fn default_max_concurrency() -> usize {
    num_cpus::get().saturating_sub(1).max(1)
}

/// Explicit environment object passed to [`Threads::new`](crate::core::Threads::new).
#[derive(Clone)]
pub struct Environment {
    max_concurrency: usize,
    factory: Arc<dyn ExecutorFactory>,
}

impl Environment {
    /// Environment with a custom factory and concurrency ceiling.
    pub fn new<F>(max_concurrency: usize, factory: F) -> Self
    where
        F: ExecutorFactory,
    {
        Self {
            max_concurrency: max_concurrency.max(1),
            factory: Arc::new(factory),
        }
    }

    /// Environment running tasks on dedicated OS threads that dispatch into
    /// `registry`.
    #[cfg(not(target_arch = "wasm32"))]
    #[must_use]
    pub fn native(
        registry: crate::core::HandlerRegistry,
        config: &crate::config::ThreadsConfig,
    ) -> Self {
        Self::new(
            default_max_concurrency(),
            crate::infra::executor::NativeExecutorFactory::new(registry, config),
        )
    }

    /// Override the concurrency ceiling.
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Upper bound on execution units.
    #[must_use]
    pub const fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Factory creating one executor per unit.
    #[must_use]
    pub fn executor_factory(&self) -> &dyn ExecutorFactory {
        self.factory.as_ref()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("max_concurrency", &self.max_concurrency)
            .finish_non_exhaustive()
    }
}
