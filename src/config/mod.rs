//! Configuration models for the pool and its host environment.

pub mod environment;
pub mod threads;

pub use environment::{default_max_concurrency, Environment};
pub use threads::ThreadsConfig;
