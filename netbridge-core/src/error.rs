/// NetBridge Error Types
///
/// Transport-level failures (`NetBridgeError`) stay inside the coordinator
/// and worker loops; task-level failures (`TaskError`) are what a caller of
/// `await_result` sees.

use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::correlation::CorrelationId;
use crate::endpoint::EndpointError;

/// Main error type for connection and protocol operations
#[derive(Error, Debug)]
pub enum NetBridgeError {
    /// IO error during accept/connect/read/write
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Protocol error (undecodable frame body, malformed header)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Declared frame length exceeds the configured limit
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// Peer closed the connection
    #[error("Connection closed")]
    ConnectionClosed,

    /// A write was cancelled part-way; the stream cannot be trusted
    #[error("Connection poisoned by cancelled I/O")]
    Poisoned,

    /// Invalid endpoint in configuration
    #[error("Endpoint error: {0}")]
    Endpoint(#[from] EndpointError),
}

/// Result type alias for connection and protocol operations
pub type Result<T> = std::result::Result<T, NetBridgeError>;

impl NetBridgeError {
    /// Create a protocol error with a message
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Check if this error means the connection must be torn down.
    ///
    /// Protocol errors count: a peer that sent one undecodable frame is
    /// not trusted to continue.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::Io(e) => !matches!(e.kind(), io::ErrorKind::Interrupted),
            Self::Protocol(_)
            | Self::FrameTooLarge { .. }
            | Self::ConnectionClosed
            | Self::Poisoned => true,
            Self::Endpoint(_) => false,
        }
    }
}

/// Failure of a single submitted task, as seen by the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The caller's deadline elapsed before a result arrived
    #[error("Task {id} timed out after {after:?}")]
    Timeout { id: CorrelationId, after: Duration },

    /// Every worker the task was dispatched to disconnected mid-flight
    #[error("Task {id} lost after {attempts} dispatch attempt(s)")]
    WorkerLost { id: CorrelationId, attempts: u32 },

    /// The worker's handler reported an error
    #[error("Task {id} failed on worker: {message}")]
    Failed { id: CorrelationId, message: String },

    /// No waiter is registered for this id (never submitted, already
    /// collected, or already being awaited)
    #[error("No pending call for task {0}")]
    NotPending(CorrelationId),

    /// A waiter for this id is already registered
    #[error("Duplicate correlation id {0}")]
    DuplicateId(CorrelationId),

    /// The coordinator was closed
    #[error("Coordinator closed")]
    Closed,
}

impl TaskError {
    /// The task this error refers to, if any.
    #[must_use]
    pub const fn task_id(&self) -> Option<CorrelationId> {
        match self {
            Self::Timeout { id, .. }
            | Self::WorkerLost { id, .. }
            | Self::Failed { id, .. }
            | Self::NotPending(id)
            | Self::DuplicateId(id) => Some(*id),
            Self::Closed => None,
        }
    }
}
