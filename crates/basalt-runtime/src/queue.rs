//! FIFO task queue.

use crate::error::Result;
use crate::task::Task;
use std::collections::VecDeque;

/// First-in first-out sequence of pending work.
///
/// Generic so the ordering rules can be exercised without a device; the
/// context always uses `TaskQueue<Task>`.
#[derive(Debug)]
pub struct TaskQueue<T = Task> {
    pending: VecDeque<T>,
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
        }
    }

    /// Append at the tail.
    pub fn push(&mut self, item: T) {
        self.pending.push_back(item);
    }

    /// Remove the head.
    pub fn pop(&mut self) -> Option<T> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Pop and run items head first until the queue is empty.
    ///
    /// Each item is removed before `run` sees it. The first error stops the
    /// drain; the failed item is consumed and the rest stay queued.
    pub fn drain<R, F>(&mut self, mut run: F) -> Result<Vec<R>>
    where
        F: FnMut(T) -> Result<R>,
    {
        let mut results = Vec::with_capacity(self.pending.len());
        while let Some(item) = self.pop() {
            results.push(run(item)?);
        }
        Ok(results)
    }
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
