// Copyright 2026 the Stillframe Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Execution context injection.
//!
//! Capture sessions live on one logical sequence. Copy results and the
//! "directive finished" notification are delivered by posting tasks to that
//! sequence through a [`TaskRunner`] handed to the session at construction,
//! so nothing ever runs re-entrantly inside the call that triggered it.

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use core::cell::RefCell;
use core::fmt;

/// A unit of work posted to a sequence.
pub type Task = Box<dyn FnOnce()>;

/// Posts tasks to run later, in order, on a single sequence.
pub trait TaskRunner {
    /// Queues `task` to run after every task already posted.
    fn post_task(&self, task: Task);
}

/// A [`TaskRunner`] drained explicitly by its owner.
///
/// Embedders that pump their own event loop call
/// [`run_until_idle`](Self::run_until_idle) from it; tests use it to control
/// exactly when posted work runs.
#[derive(Default)]
pub struct ManualTaskRunner {
    queue: RefCell<VecDeque<Task>>,
}

impl fmt::Debug for ManualTaskRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualTaskRunner")
            .field("pending", &self.pending_task_count())
            .finish()
    }
}

impl ManualTaskRunner {
    /// Creates a runner with an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs queued tasks, including ones posted while draining, until the
    /// queue is empty. Returns the number of tasks run.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        // The queue borrow must end before the task runs; tasks may post.
        while let Some(task) = self.pop() {
            task();
            ran += 1;
        }
        ran
    }

    /// Runs at most one queued task. Returns `false` if the queue was empty.
    pub fn run_one(&self) -> bool {
        match self.pop() {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Returns `true` if any task is queued.
    #[must_use]
    pub fn has_pending_tasks(&self) -> bool {
        !self.queue.borrow().is_empty()
    }

    /// Number of queued tasks.
    #[must_use]
    pub fn pending_task_count(&self) -> usize {
        self.queue.borrow().len()
    }

    fn pop(&self) -> Option<Task> {
        self.queue.borrow_mut().pop_front()
    }
}

impl TaskRunner for ManualTaskRunner {
    fn post_task(&self, task: Task) {
        self.queue.borrow_mut().push_back(task);
    }
}
