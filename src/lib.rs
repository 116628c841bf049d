//! # Prometheus Threads
//!
//! A fair, fixed-size pool of reusable execution units for CPU-bound work.
//!
//! Callers hand the pool a [`TaskQueue`](core::TaskQueue) of named handler
//! invocations. The pool drains it on one unit (sequential mode, each result
//! feeding the next task) or on several units at once (parallel mode), and
//! returns the results in submission order.
//!
//! ## Key Features
//!
//! - **Fair scheduling**: concurrent calls are served in arrival order through
//!   a ticket queue; a later call never takes a unit an earlier one is owed
//! - **Bounded units**: a call never occupies more units than it asked for
//! - **Fault isolation**: a failing task stops only the unit that ran it;
//!   executor failures move the pool to an error state until respawn
//! - **Throttling and progress**: optional async throttle predicate and a
//!   per-result step callback
//! - **Pluggable executors**: the default runs each unit on a dedicated OS
//!   thread dispatching into a [`HandlerRegistry`](core::HandlerRegistry)
//! - **One-shot and live tasks**: `run_once` and `run_live` use a dedicated
//!   executor; live tasks exchange values with the caller while they run
//! - **Cancel-safe calls**: dropping a call hands its untaken tasks back
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use prometheus_threads::builders::build_threads;
//! use prometheus_threads::config::ThreadsConfig;
//! use prometheus_threads::core::{ExecuteOptions, HandlerRegistry, TaskQueue};
//! use serde_json::json;
//!
//! let registry = HandlerRegistry::new().with_handler("square", |input| {
//!     let n = input.and_then(|v| v.as_i64()).unwrap_or(2);
//!     Ok(json!(n * n))
//! });
//! let threads = build_threads(ThreadsConfig::new().with_thread_count(2), registry)?;
//!
//! let mut queue = threads.task_queue();
//! queue.push(["square", "square", "square", "square"])?;
//! let results = threads
//!     .execute_sequential(&mut queue, ExecuteOptions::new())
//!     .await?;
//! // [4, 16, 256, 65536]
//! ```
//!
//! ## Configuration
//!
//! [`ThreadsConfig`](config::ThreadsConfig) can be built in code, parsed from
//! JSON, or read from `THREADS_*` environment variables (a `.env` file is
//! honoured). Call [`util::telemetry::init_tracing`] to get log output.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core pool abstractions: queues, tickets, execution units and the pool manager.
pub mod core;
/// Configuration models for the pool and its host environment.
pub mod config;
/// Builders to construct a ready pool from configuration.
pub mod builders;
/// Infrastructure adapters: executor backends.
pub mod infra;
/// Shared utilities.
pub mod util;
