//! Infrastructure adapters: concrete executors behind the core traits.

pub mod executor;
