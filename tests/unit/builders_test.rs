//! Tests for builder modules

use prometheus_threads::builders::{build_threads, build_threads_with_environment};
use prometheus_threads::config::{Environment, ThreadsConfig};
use prometheus_threads::core::{
    ExecuteOptions, Executor, HandlerRegistry, PoolState, TaskQueue, ThreadState, ThreadsError,
};
use serde_json::json;

#[tokio::test]
async fn test_build_threads_runs_tasks() {
    let registry = HandlerRegistry::new().with_handler("double", |input| {
        let n = input.and_then(|v| v.as_i64()).unwrap_or(1);
        Ok(json!(n * 2))
    });
    let threads = build_threads(ThreadsConfig::new().with_thread_count(2), registry).unwrap();
    assert_eq!(threads.state(), PoolState::Loaded);

    let mut queue = threads.task_queue();
    queue.push(["double", "double", "double"]).unwrap();
    let results = threads
        .execute_sequential(&mut queue, ExecuteOptions::new())
        .await
        .unwrap();
    assert_eq!(results, vec![Some(json!(2)), Some(json!(4)), Some(json!(8))]);
}

#[test]
fn test_build_threads_clamps_to_environment() {
    let env = Environment::new(2, |_id: usize| -> Result<Box<dyn Executor>, ThreadsError> {
        Err(ThreadsError::Executor("no executors here".into()))
    });
    let err = build_threads_with_environment(ThreadsConfig::new(), env).unwrap_err();
    assert!(matches!(err, ThreadsError::Executor(_)));

    let threads = build_threads(
        ThreadsConfig::new().with_thread_count(64),
        HandlerRegistry::new(),
    )
    .unwrap();
    assert!(threads.thread_count() <= threads.max_thread_count());
    assert!(threads
        .thread_states()
        .iter()
        .all(|s| *s == ThreadState::Idle));
}

#[test]
fn test_task_queue_uses_configured_capacity() {
    let threads = build_threads(
        ThreadsConfig::new().with_thread_count(1).with_max_queue_size(2),
        HandlerRegistry::new(),
    )
    .unwrap();
    let mut queue: TaskQueue = threads.task_queue();
    assert_eq!(queue.max_size(), 2);
    assert!(queue.push(["a", "b", "c"]).is_err());
}
