//! Completion correlator: one-shot wait/notify slots keyed by task id.
//!
//! A caller registers interest in a [`CorrelationId`] before the task can
//! possibly complete, then waits on it. Whoever processes the matching result
//! publishes it. Each id is fulfilled at most once; results for ids without a
//! slot are discarded.
//!
//! ```text
//!   submit ──register(id)──▶ ┌──────────────┐ ◀──publish(id, r)── session
//!                            │  senders     │
//!   await ───wait(id)──────▶ │  receivers   │
//!                            └──────────────┘
//! ```
//!
//! Senders and receivers live in separate maps: a result published before
//! the caller starts waiting is buffered in the oneshot channel, and the
//! caller still finds its receiver.

use futures::channel::oneshot;
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

use crate::correlation::CorrelationId;
use crate::error::TaskError;

type Outcome<T> = Result<T, TaskError>;

struct Table<T> {
    senders: HashMap<CorrelationId, oneshot::Sender<Outcome<T>>>,
    receivers: HashMap<CorrelationId, oneshot::Receiver<Outcome<T>>>,
    closed: bool,
}

/// Pending-call table mapping task ids to single-fulfillment slots.
pub struct Correlator<T> {
    table: Mutex<Table<T>>,
}

impl<T> Default for Correlator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Correlator<T> {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(Table {
                senders: HashMap::new(),
                receivers: HashMap::new(),
                closed: false,
            }),
        }
    }

    /// Create the slot for `id`.
    ///
    /// Must happen before the task is dispatched, otherwise a fast result
    /// could be published into nothing.
    pub fn register(&self, id: CorrelationId) -> Result<(), TaskError> {
        let mut table = self.table.lock();
        if table.closed {
            return Err(TaskError::Closed);
        }
        if table.senders.contains_key(&id) || table.receivers.contains_key(&id) {
            return Err(TaskError::DuplicateId(id));
        }
        let (tx, rx) = oneshot::channel();
        table.senders.insert(id, tx);
        table.receivers.insert(id, rx);
        Ok(())
    }

    /// Fulfill the slot for `id` with a result.
    ///
    /// Returns `false` (and logs) when no slot exists: the result is stale
    /// or a duplicate and is dropped.
    pub fn publish(&self, id: CorrelationId, value: T) -> bool {
        self.complete(id, Ok(value))
    }

    /// Fulfill the slot for `id` with a failure.
    pub fn fail(&self, id: CorrelationId, error: TaskError) -> bool {
        self.complete(id, Err(error))
    }

    fn complete(&self, id: CorrelationId, outcome: Outcome<T>) -> bool {
        let sender = self.table.lock().senders.remove(&id);
        match sender {
            Some(tx) => {
                if tx.send(outcome).is_err() {
                    debug!(task = %id, "waiter went away before result arrived");
                }
                true
            }
            None => {
                warn!(task = %id, "discarding result for unknown or completed task");
                false
            }
        }
    }

    /// Wait until `id` is published, failed, or `deadline` elapses.
    ///
    /// On timeout the slot is removed; a result arriving afterwards is
    /// treated as stale.
    pub async fn wait(&self, id: CorrelationId, deadline: Option<Duration>) -> Outcome<T> {
        let rx = self
            .table
            .lock()
            .receivers
            .remove(&id)
            .ok_or(TaskError::NotPending(id))?;

        let received = match deadline {
            None => rx.await,
            Some(after) => match compio::time::timeout(after, rx).await {
                Ok(received) => received,
                Err(_elapsed) => {
                    self.table.lock().senders.remove(&id);
                    debug!(task = %id, ?after, "wait timed out");
                    return Err(TaskError::Timeout { id, after });
                }
            },
        };

        // Sender dropped without a value: the correlator was closed.
        received.unwrap_or(Err(TaskError::Closed))
    }

    /// Remove any slot for `id` without fulfilling it.
    pub fn cancel(&self, id: CorrelationId) -> bool {
        let mut table = self.table.lock();
        let had_sender = table.senders.remove(&id).is_some();
        let had_receiver = table.receivers.remove(&id).is_some();
        had_sender || had_receiver
    }

    /// Whether a result for `id` would still be delivered to someone.
    pub fn is_pending(&self, id: CorrelationId) -> bool {
        self.table.lock().senders.contains_key(&id)
    }

    /// Number of slots still awaiting a result.
    pub fn pending(&self) -> usize {
        self.table.lock().senders.len()
    }

    /// Number of slots nobody has waited on or cancelled yet, including
    /// ones holding a buffered result.
    pub fn tracked(&self) -> usize {
        self.table.lock().receivers.len()
    }

    /// Fail every outstanding waiter with [`TaskError::Closed`] and refuse
    /// new registrations.
    pub fn close(&self) {
        let mut table = self.table.lock();
        table.closed = true;
        for (_, tx) in table.senders.drain() {
            let _ = tx.send(Err(TaskError::Closed));
        }
    }
}
