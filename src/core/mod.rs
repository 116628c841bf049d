//! Core pool abstractions: queues, tickets, execution units and the pool manager.

pub mod error;
pub mod event;
pub mod executor;
pub mod handler;
pub mod live;
pub mod stats;
pub mod task_queue;
pub mod thread;
pub mod threads;
pub mod ticket;
pub mod transfer;

pub use error::{AppResult, CapacityError, ThreadsError};
pub use event::{EventBus, ListenerId, ListenerOptions};
pub use executor::{Executor, ExecutorFactory, Outcome, TaskFailure, TaskFailureKind};
pub use handler::{Handler, HandlerId, HandlerRegistry};
pub use live::{LiveChannel, LiveHandler, LiveTask};
pub use stats::ThreadsStats;
pub use task_queue::{Task, TaskQueue, DEFAULT_MAX_SIZE};
pub use thread::{Mode, Thread, ThreadEvent, ThreadEventKind, ThreadEvents, ThreadState};
pub use threads::{PoolState, Threads};
pub use ticket::{Ticket, TicketEvent, TicketQueue};
pub use transfer::{ExecuteOptions, FnThrottle, StepCallback, Throttle};
