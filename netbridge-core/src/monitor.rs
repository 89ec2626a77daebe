//! Pool event monitoring.
//!
//! The coordinator can hand out a channel of lifecycle events for workers
//! and tasks. Events are informational only; nothing in the dispatch path
//! waits on a monitor being read.

use std::fmt;
use std::net::SocketAddr;

use crate::correlation::{CorrelationId, WorkerId};

/// Worker and task lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    /// The listener is bound.
    Listening(SocketAddr),

    /// A worker connection was admitted to the pool.
    WorkerConnected { worker: WorkerId, peer: SocketAddr },

    /// A worker connection ended (EOF, I/O error, or protocol error).
    WorkerDisconnected { worker: WorkerId, reason: String },

    /// The reaper removed a dead worker record.
    WorkerReaped { worker: WorkerId, busy: bool },

    /// A task was written to a worker.
    TaskDispatched { task: CorrelationId, worker: WorkerId },

    /// A worker answered a task (completed or failed).
    TaskCompleted { task: CorrelationId, worker: WorkerId },

    /// A task went back to the head of the queue after a worker loss.
    TaskRequeued { task: CorrelationId, attempt: u32 },

    /// A task ran out of dispatch attempts.
    TaskLost { task: CorrelationId, attempts: u32 },

    /// A result frame with no matching in-flight task was discarded.
    StaleResult {
        task: Option<CorrelationId>,
        worker: WorkerId,
    },
}

impl fmt::Display for PoolEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Listening(addr) => write!(f, "Listening on tcp://{addr}"),
            Self::WorkerConnected { worker, peer } => {
                write!(f, "{worker} connected from {peer}")
            }
            Self::WorkerDisconnected { worker, reason } => {
                write!(f, "{worker} disconnected: {reason}")
            }
            Self::WorkerReaped { worker, busy } => {
                write!(f, "{worker} reaped (busy: {busy})")
            }
            Self::TaskDispatched { task, worker } => write!(f, "Task {task} sent to {worker}"),
            Self::TaskCompleted { task, worker } => {
                write!(f, "Task {task} answered by {worker}")
            }
            Self::TaskRequeued { task, attempt } => {
                write!(f, "Task {task} requeued after attempt {attempt}")
            }
            Self::TaskLost { task, attempts } => {
                write!(f, "Task {task} lost after {attempts} attempt(s)")
            }
            Self::StaleResult {
                task: Some(task),
                worker,
            } => write!(f, "Stale result for {task} from {worker}"),
            Self::StaleResult { task: None, worker } => {
                write!(f, "Undecodable result from {worker}")
            }
        }
    }
}

/// Handle for receiving pool events.
pub type PoolMonitor = flume::Receiver<PoolEvent>;

/// Sending half held by the coordinator.
pub type PoolEventSender = flume::Sender<PoolEvent>;

#[must_use]
pub fn create_monitor() -> (PoolEventSender, PoolMonitor) {
    flume::unbounded()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_event_display() {
        let addr: SocketAddr = "127.0.0.1:1300".parse().unwrap();
        assert_eq!(
            PoolEvent::Listening(addr).to_string(),
            "Listening on tcp://127.0.0.1:1300"
        );

        let worker = WorkerId::next();
        let event = PoolEvent::WorkerReaped { worker, busy: false };
        assert_eq!(event.to_string(), format!("{worker} reaped (busy: false)"));
    }

    #[test]
    fn test_monitor_channel() {
        let (sender, receiver) = create_monitor();
        let task = CorrelationId::next();
        sender
            .send(PoolEvent::TaskRequeued { task, attempt: 1 })
            .unwrap();

        let event = receiver.recv().unwrap();
        assert_eq!(event, PoolEvent::TaskRequeued { task, attempt: 1 });
    }
}
