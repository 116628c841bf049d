//! Builders to construct a ready pool from configuration.

pub mod threads_builder;

pub use threads_builder::{build_threads, build_threads_with_environment};
