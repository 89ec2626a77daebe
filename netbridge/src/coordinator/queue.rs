//! Pending queue of tasks waiting for an idle worker.

use netbridge_core::correlation::CorrelationId;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// A task waiting for, or travelling to, a worker.
#[derive(Debug)]
pub(crate) struct QueuedTask<P> {
    pub(crate) id: CorrelationId,
    pub(crate) payload: P,
    /// Dispatches already made for this task.
    pub(crate) attempts: u32,
}

impl<P> QueuedTask<P> {
    pub(crate) const fn new(id: CorrelationId, payload: P) -> Self {
        Self {
            id,
            payload,
            attempts: 0,
        }
    }
}

/// FIFO of [`QueuedTask`]s. Requeued tasks go back to the head.
pub(crate) struct PendingQueue<P> {
    tasks: Mutex<VecDeque<QueuedTask<P>>>,
}

impl<P> PendingQueue<P> {
    pub(crate) fn new() -> Self {
        Self {
            tasks: Mutex::new(VecDeque::new()),
        }
    }

    pub(crate) fn push_back(&self, task: QueuedTask<P>) {
        self.tasks.lock().push_back(task);
    }

    pub(crate) fn push_front(&self, task: QueuedTask<P>) {
        self.tasks.lock().push_front(task);
    }

    /// Pop the head, but only if `claim` produces a taker for it.
    ///
    /// `claim` runs with the queue locked, so an empty queue never claims a
    /// worker and a claimed worker always gets the task that was at the head.
    pub(crate) fn pop_with<C>(&self, claim: impl FnOnce() -> Option<C>) -> Option<(QueuedTask<P>, C)> {
        let mut tasks = self.tasks.lock();
        if tasks.is_empty() {
            return None;
        }
        let taker = claim()?;
        let task = tasks.pop_front()?;
        Some((task, taker))
    }

    /// Withdraw a task that has not been dispatched yet.
    pub(crate) fn remove(&self, id: CorrelationId) -> Option<QueuedTask<P>> {
        let mut tasks = self.tasks.lock();
        let pos = tasks.iter().position(|t| t.id == id)?;
        tasks.remove(pos)
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub(crate) fn drain(&self) -> Vec<QueuedTask<P>> {
        self.tasks.lock().drain(..).collect()
    }
}
