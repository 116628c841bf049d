//! Tests for task queue indexing under arbitrary mutation sequences

use prometheus_threads::core::{Task, TaskQueue};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

fn assert_matches_model(queue: &TaskQueue, model: &[u64]) {
    assert_eq!(queue.len(), model.len());
    for (offset, (task, expected)) in queue.tasks().iter().zip(model).enumerate() {
        assert_eq!(task.index(), offset, "index drifted at offset {offset}");
        assert_eq!(task.message, Some(json!(expected)));
    }
}

#[test]
fn test_random_mutations_keep_indexes_contiguous() {
    let mut rng = StdRng::seed_from_u64(0x7453_6b51);
    let mut queue = TaskQueue::new(64);
    let mut model: Vec<u64> = Vec::new();
    let mut next_id = 0_u64;

    for _ in 0..2_000 {
        let len = model.len();
        match rng.random_range(0..6) {
            0 => {
                let count = rng.random_range(1..4);
                let ids: Vec<u64> = (next_id..next_id + count).collect();
                next_id += count;
                let tasks: Vec<Task> = ids
                    .iter()
                    .map(|id| Task::with_message("noop", json!(id)))
                    .collect();
                if queue.push(tasks).is_ok() {
                    model.extend(ids);
                } else {
                    assert!(len + ids.len() > queue.max_size());
                }
            }
            1 => {
                let at = rng.random_range(0..=len);
                let id = next_id;
                next_id += 1;
                if queue.insert(at, [Task::with_message("noop", json!(id))]).is_ok() {
                    model.insert(at.min(len), id);
                }
            }
            2 if len > 0 => {
                let at = rng.random_range(0..len);
                let count = rng.random_range(0..3);
                queue.remove(at, count);
                model.drain(at..(at + count).min(len));
            }
            3 if len > 0 => {
                let at = rng.random_range(0..len);
                let grabbed = queue.grab(at, 2);
                let expected: Vec<u64> = model.drain(at..(at + 2).min(len)).collect();
                assert_eq!(grabbed.len(), expected.len());
            }
            4 => {
                let shifted = queue.shift();
                let expected = (!model.is_empty()).then(|| model.remove(0));
                assert_eq!(shifted.map(|t| t.message), expected.map(|id| Some(json!(id))));
            }
            5 if len > 0 => {
                let at = rng.random_range(0..len);
                let id = next_id;
                next_id += 1;
                queue.replace(at, [Task::with_message("noop", json!(id))]).unwrap();
                model[at] = id;
            }
            _ => {}
        }
        assert_matches_model(&queue, &model);
    }
}

#[test]
fn test_capacity_rejects_without_partial_push() {
    let mut queue = TaskQueue::new(3);
    queue.push(["a", "b"]).unwrap();

    let err = queue.push(["c", "d"]).unwrap_err();
    assert_eq!(err.requested, 2);
    assert_eq!(err.accepted, 1);
    assert_eq!(queue.len(), 2);

    queue.push(["c"]).unwrap();
    assert!(queue.insert(0, ["x"]).is_err());
    assert_eq!(queue.get(0).unwrap().handler, "a");
}

#[test]
fn test_chained_mutations() {
    let mut queue = TaskQueue::default();
    queue
        .push(["a", "b", "c", "d"])
        .unwrap()
        .remove(1, 2)
        .push(["e"])
        .unwrap();
    let handlers: Vec<&str> = queue.tasks().iter().map(|t| t.handler.as_str()).collect();
    assert_eq!(handlers, ["a", "d", "e"]);
    assert_eq!(queue.pop().unwrap().index(), 2);
    assert!(queue.clear().is_empty());
}
