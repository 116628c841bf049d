//! Pool utilization counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of pool activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadsStats {
    /// Number of execution units in the pool.
    pub thread_count: usize,

    /// Units currently draining a call.
    pub running_threads: usize,

    /// Scheduling calls accepted.
    pub calls: u64,

    /// Tasks handed to the pool across all calls.
    pub submitted_tasks: u64,

    /// Tasks that produced a value.
    pub completed_tasks: u64,

    /// Tasks whose executor returned a failure.
    pub failed_tasks: u64,
}

/// Internal counters for pool statistics (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct ThreadsCounters {
    pub calls: AtomicU64,
    pub submitted_tasks: AtomicU64,
    pub completed_tasks: AtomicU64,
    pub failed_tasks: AtomicU64,
}

impl ThreadsCounters {
    /// Get a snapshot of current statistics.
    pub fn snapshot(&self, thread_count: usize, running_threads: usize) -> ThreadsStats {
        ThreadsStats {
            thread_count,
            running_threads,
            calls: self.calls.load(Ordering::Relaxed),
            submitted_tasks: self.submitted_tasks.load(Ordering::Relaxed),
            completed_tasks: self.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: self.failed_tasks.load(Ordering::Relaxed),
        }
    }
}
