//! Tests for ticket ordering

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use prometheus_threads::core::TicketQueue;

#[test]
fn test_tickets_are_monotonic_until_drained() {
    let queue = Arc::new(TicketQueue::new());
    let mut first = queue.issue();
    let second = queue.issue();
    assert_eq!(first.value() + 1, second.value());
    assert!(queue.is_next(first.value()));
    assert!(!queue.is_next(second.value()));

    first.release();
    assert_eq!(queue.highest(), Some(first.value()));
    assert!(queue.is_next(second.value()));

    let third = queue.issue();
    assert_eq!(third.value(), second.value() + 1);
    assert_eq!(queue.last(), Some(third.value()));

    drop(second);
    drop(third);
    assert!(queue.is_empty());
    assert_eq!(queue.highest(), None);
    assert_eq!(queue.increment(Some(10)), 11);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_waiters_proceed_in_ticket_order() {
    let queue = Arc::new(TicketQueue::new());
    let order = Arc::new(Mutex::new(Vec::new()));

    let gate = queue.issue();
    let mut waiters = Vec::new();
    for n in 0..4_u64 {
        let mut ticket = queue.issue();
        let order = Arc::clone(&order);
        waiters.push(tokio::spawn(async move {
            ticket.wait_for_turn().await;
            order.lock().push(n);
            tokio::time::sleep(Duration::from_millis(5)).await;
            ticket.release();
        }));
    }

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(order.lock().is_empty());
    drop(gate);

    for waiter in waiters {
        waiter.await.unwrap();
    }
    assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
    assert!(queue.is_empty());
}
