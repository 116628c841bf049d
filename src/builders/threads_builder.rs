//! Build a loaded [`Threads`] pool from configuration.

use tracing::info;

use crate::config::{Environment, ThreadsConfig};
use crate::core::{HandlerRegistry, Threads, ThreadsError};

/// Validate `config`, bind a native environment over `registry`, and spawn
/// the pool's units.
///
/// # Errors
///
/// Returns [`ThreadsError::InvalidConfig`] for an invalid configuration, or
/// the executor factory's error if a unit cannot be created.
#[cfg(not(target_arch = "wasm32"))]
pub fn build_threads(
    config: ThreadsConfig,
    registry: HandlerRegistry,
) -> Result<Threads, ThreadsError> {
    let environment = Environment::native(registry, &config);
    build_threads_with_environment(config, environment)
}

/// Like [`build_threads`] with a caller-supplied environment.
///
/// # Errors
///
/// Returns [`ThreadsError::InvalidConfig`] for an invalid configuration, or
/// the executor factory's error if a unit cannot be created.
pub fn build_threads_with_environment(
    config: ThreadsConfig,
    environment: Environment,
) -> Result<Threads, ThreadsError> {
    let threads = Threads::new(config, environment)?;
    threads.load()?;
    info!(
        thread_count = threads.thread_count(),
        max_thread_count = threads.max_thread_count(),
        "pool built"
    );
    Ok(threads)
}
