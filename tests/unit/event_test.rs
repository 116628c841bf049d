//! Tests for the event bus

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use prometheus_threads::core::{EventBus, ListenerOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Signal {
    Started,
    Stopped,
}

#[test]
fn test_events_are_routed_by_kind() {
    let bus: EventBus<Signal, u32> = EventBus::new();
    let started = Arc::new(AtomicUsize::new(0));
    let stopped = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&started);
    bus.on(
        Signal::Started,
        move |n: &u32| {
            counter.fetch_add(*n as usize, Ordering::SeqCst);
        },
        ListenerOptions::default(),
    );
    let counter = Arc::clone(&stopped);
    bus.on(
        Signal::Stopped,
        move |_: &u32| {
            counter.fetch_add(1, Ordering::SeqCst);
        },
        ListenerOptions::once(),
    );

    bus.emit(Signal::Started, &5);
    bus.emit(Signal::Started, &2);
    bus.emit(Signal::Stopped, &0);
    bus.emit(Signal::Stopped, &0);

    assert_eq!(started.load(Ordering::SeqCst), 7);
    assert_eq!(stopped.load(Ordering::SeqCst), 1);
    assert_eq!(bus.listener_count(Signal::Started), 1);
    assert_eq!(bus.listener_count(Signal::Stopped), 0);
}

#[tokio::test]
async fn test_once_future_receives_payload() {
    let bus: Arc<EventBus<Signal, String>> = Arc::new(EventBus::new());
    let next = bus.once(Signal::Stopped);

    let emitter = Arc::clone(&bus);
    tokio::spawn(async move {
        emitter.emit(Signal::Stopped, &"done".to_owned());
    });

    assert_eq!(next.await.unwrap(), "done");
    assert_eq!(bus.listener_count(Signal::Stopped), 0);
}

#[test]
fn test_emit_without_listeners_is_noop() {
    let bus: EventBus<Signal, ()> = EventBus::default();
    bus.emit(Signal::Started, &());
    assert!(!bus.off(Signal::Started, 42));
}
