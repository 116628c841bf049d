//! Concrete executors.

#[cfg(not(target_arch = "wasm32"))]
pub mod native;

#[cfg(not(target_arch = "wasm32"))]
pub use native::{NativeExecutor, NativeExecutorFactory};
