//! Ordered, capacity-bounded task queue with stable positional indexing.
//!
//! Every public mutation renumbers the remaining tasks so that
//! `task.index() == offset`. Execution units are the only exception: while a
//! scheduling call drains the queue they take tasks from the front without
//! renumbering, so each task's index still names its slot in the results.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::CapacityError;
use super::handler::HandlerId;

/// Default capacity of a [`TaskQueue`].
pub const DEFAULT_MAX_SIZE: usize = 999;

/// A unit of work: a handler name plus an optional explicit input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    index: usize,
    /// Registered handler the executor dispatches to.
    pub handler: HandlerId,
    /// Explicit input. In sequential mode `None` means "use the previous result".
    pub message: Option<Value>,
}

impl Task {
    /// Task without an explicit input.
    pub fn new(handler: impl Into<HandlerId>) -> Self {
        Self {
            index: 0,
            handler: handler.into(),
            message: None,
        }
    }

    /// Task with an explicit input.
    pub fn with_message(handler: impl Into<HandlerId>, message: Value) -> Self {
        Self {
            index: 0,
            handler: handler.into(),
            message: Some(message),
        }
    }

    /// Current position of this task in its queue.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }
}

impl From<&str> for Task {
    fn from(handler: &str) -> Self {
        Self::new(handler)
    }
}

impl From<(&str, Value)> for Task {
    fn from((handler, message): (&str, Value)) -> Self {
        Self::with_message(handler, message)
    }
}

/// Ordered collection of pending tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskQueue {
    tasks: Vec<Task>,
    max_size: usize,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE)
    }
}

impl TaskQueue {
    /// Create an empty queue holding at most `max_size` tasks.
    #[must_use]
    pub const fn new(max_size: usize) -> Self {
        Self {
            tasks: Vec::new(),
            max_size,
        }
    }

    /// Append tasks at the back.
    ///
    /// # Errors
    ///
    /// Returns [`CapacityError`] and leaves the queue untouched if the tasks
    /// do not all fit.
    pub fn push<I, T>(&mut self, tasks: I) -> Result<&mut Self, CapacityError>
    where
        I: IntoIterator<Item = T>,
        T: Into<Task>,
    {
        let tasks: Vec<Task> = tasks.into_iter().map(Into::into).collect();
        self.check_size(tasks.len(), "push")?;

        self.tasks.extend(tasks);
        self.reindex();
        Ok(self)
    }

    /// Splice tasks in before `index` (appends when `index >= len`).
    ///
    /// # Errors
    ///
    /// Returns [`CapacityError`] and leaves the queue untouched if the tasks
    /// do not all fit.
    pub fn insert<I, T>(&mut self, index: usize, tasks: I) -> Result<&mut Self, CapacityError>
    where
        I: IntoIterator<Item = T>,
        T: Into<Task>,
    {
        let tasks: Vec<Task> = tasks.into_iter().map(Into::into).collect();
        self.check_size(tasks.len(), "insert")?;

        let at = index.min(self.tasks.len());
        self.tasks.splice(at..at, tasks);
        self.reindex();
        Ok(self)
    }

    /// Overwrite `tasks.len()` entries starting at `index`, growing the
    /// queue if the replacement runs past the end.
    ///
    /// # Errors
    ///
    /// Returns [`CapacityError`] and leaves the queue untouched if the growth
    /// does not fit.
    pub fn replace<I, T>(&mut self, index: usize, tasks: I) -> Result<&mut Self, CapacityError>
    where
        I: IntoIterator<Item = T>,
        T: Into<Task>,
    {
        let tasks: Vec<Task> = tasks.into_iter().map(Into::into).collect();
        let at = index.min(self.tasks.len());
        let end = (at + tasks.len()).min(self.tasks.len());
        let growth = tasks.len() - (end - at);
        self.check_size(growth, "replace")?;

        self.tasks.splice(at..end, tasks);
        self.reindex();
        Ok(self)
    }

    /// Remove and return `length` tasks starting at `index`.
    pub fn grab(&mut self, index: usize, length: usize) -> Vec<Task> {
        let range = self.clamp_range(index, length);
        let grabbed: Vec<Task> = self.tasks.drain(range).collect();
        self.reindex();
        grabbed
    }

    /// Discard `length` tasks starting at `index`.
    pub fn remove(&mut self, index: usize, length: usize) -> &mut Self {
        let range = self.clamp_range(index, length);
        self.tasks.drain(range);
        self.reindex();
        self
    }

    /// Remove the front task.
    pub fn shift(&mut self) -> Option<Task> {
        if self.tasks.is_empty() {
            return None;
        }
        let task = self.tasks.remove(0);
        self.reindex();
        Some(task)
    }

    /// Remove the back task. Offsets of the remaining tasks are unchanged.
    pub fn pop(&mut self) -> Option<Task> {
        self.tasks.pop()
    }

    /// Remove every task.
    pub fn clear(&mut self) -> &mut Self {
        self.tasks.clear();
        self
    }

    /// Task at `index`, if any.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Task> {
        self.tasks.get(index)
    }

    /// Read-only view of the pending tasks.
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Number of pending tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no task is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Capacity of this queue.
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }

    /// Consume the queue, keeping each task's current index.
    pub(crate) fn into_tasks(self) -> Vec<Task> {
        self.tasks
    }

    /// Rebuild a queue from leftover tasks, renumbered from zero.
    pub(crate) fn from_tasks(tasks: impl IntoIterator<Item = Task>, max_size: usize) -> Self {
        let mut queue = Self {
            tasks: tasks.into_iter().collect(),
            max_size,
        };
        queue.reindex();
        queue
    }

    /// Renumber every task to its current offset.
    fn reindex(&mut self) {
        for (offset, task) in self.tasks.iter_mut().enumerate() {
            task.index = offset;
        }
    }

    fn clamp_range(&self, index: usize, length: usize) -> std::ops::Range<usize> {
        let start = index.min(self.tasks.len());
        let end = start.saturating_add(length).min(self.tasks.len());
        start..end
    }

    fn check_size(&self, adding: usize, operation: &str) -> Result<(), CapacityError> {
        if adding == 0 || self.tasks.len() + adding <= self.max_size {
            return Ok(());
        }
        let accepted = self.max_size.saturating_sub(self.tasks.len());
        tracing::warn!(
            operation = operation,
            requested = adding,
            accepted = accepted,
            max_size = self.max_size,
            "task queue would exceed max size"
        );
        Err(CapacityError {
            requested: adding,
            accepted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assert_indexed(queue: &TaskQueue) {
        for (offset, task) in queue.tasks().iter().enumerate() {
            assert_eq!(task.index(), offset);
        }
    }

    fn messages(queue: &TaskQueue) -> Vec<Option<Value>> {
        queue.tasks().iter().map(|t| t.message.clone()).collect()
    }

    #[test]
    fn test_push_insert_remove() {
        let mut queue = TaskQueue::new(30);
        queue
            .push([
                Task::new("square"),
                Task::with_message("square", json!(3)),
                Task::new("square"),
                Task::new("square"),
            ])
            .unwrap();
        queue.insert(1, [("square", json!(10))]).unwrap();

        assert_eq!(queue.len(), 5);
        assert_eq!(queue.get(1).unwrap().message, Some(json!(10)));
        assert_eq!(queue.get(2).unwrap().message, Some(json!(3)));
        assert_eq!(queue.get(3).unwrap().index(), 3);
        assert_indexed(&queue);

        queue.remove(1, 1);
        assert_eq!(queue.len(), 4);
        assert_eq!(queue.get(1).unwrap().message, Some(json!(3)));
        assert_eq!(queue.get(2).unwrap().message, None);
        assert_indexed(&queue);

        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_replace_grab_shift_pop() {
        let mut queue = TaskQueue::new(30);
        queue
            .push([
                Task::new("square"),
                Task::with_message("square", json!(2)),
                Task::with_message("square", json!(3)),
                Task::new("square"),
            ])
            .unwrap();
        queue.replace(1, [("square", json!(10))]).unwrap();

        assert_eq!(queue.len(), 4);
        assert_eq!(
            messages(&queue),
            vec![None, Some(json!(10)), Some(json!(3)), None]
        );
        assert_indexed(&queue);

        let grabbed = queue.grab(0, 1);
        assert_eq!(grabbed.len(), 1);
        assert_eq!(grabbed[0].message, None);
        assert_eq!(messages(&queue), vec![Some(json!(10)), Some(json!(3)), None]);
        assert_indexed(&queue);

        queue.shift();
        assert_eq!(messages(&queue), vec![Some(json!(3)), None]);
        assert_indexed(&queue);

        queue.pop();
        assert_eq!(messages(&queue), vec![Some(json!(3))]);
        assert_indexed(&queue);
    }

    #[test]
    fn test_replace_past_end_grows() {
        let mut queue = TaskQueue::new(3);
        queue.push(["a", "b"]).unwrap();
        queue.replace(1, ["c", "d"]).unwrap();
        let handlers: Vec<&str> = queue.tasks().iter().map(|t| t.handler.as_str()).collect();
        assert_eq!(handlers, vec!["a", "c", "d"]);

        let err = queue.replace(2, ["e", "f"]).unwrap_err();
        assert_eq!(err.accepted, 0);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_capacity_rejects_without_partial_insert() {
        let mut queue = TaskQueue::new(2);
        queue.push(["square", "square"]).unwrap();

        let err = queue.push(["square"]).unwrap_err();
        assert_eq!(err, CapacityError { requested: 1, accepted: 0 });
        assert_eq!(queue.len(), 2);

        let err = queue.insert(1, ["square"]).unwrap_err();
        assert_eq!(err.accepted, 0);
        assert_eq!(queue.len(), 2);

        let mut queue = TaskQueue::new(3);
        queue.push(["a"]).unwrap();
        let err = queue.push(["b", "c", "d"]).unwrap_err();
        assert_eq!(err, CapacityError { requested: 3, accepted: 2 });
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_out_of_bounds_ranges_are_clamped() {
        let mut queue = TaskQueue::new(10);
        queue.push(["a", "b", "c"]).unwrap();
        assert!(queue.grab(5, 2).is_empty());
        assert_eq!(queue.grab(2, 10).len(), 1);
        queue.insert(99, ["z"]).unwrap();
        assert_eq!(queue.get(2).unwrap().handler, "z");
        assert_indexed(&queue);
    }

    #[test]
    fn test_from_tasks_renumbers_leftovers() {
        let mut queue = TaskQueue::new(10);
        queue.push(["a", "b", "c"]).unwrap();

        let mut tasks = queue.into_tasks();
        let first = tasks.remove(0);
        assert_eq!(first.index(), 0);
        assert_eq!(tasks[0].index(), 1);

        let rebuilt = TaskQueue::from_tasks(tasks, 10);
        assert_eq!(rebuilt.max_size(), 10);
        assert_eq!(rebuilt.get(0).unwrap().handler, "b");
        assert_indexed(&rebuilt);
    }
}
