//! # NetBridge
//!
//! Remote task execution over plain TCP: a [`Coordinator`] hands typed
//! tasks to a pool of [`Worker`] processes and gives each caller back the
//! typed result of its own task.
//!
//! ## Architecture
//!
//! NetBridge is layered the same way on both ends of the wire:
//!
//! - **`netbridge-core`**: identifiers, the completion correlator, options,
//!   errors, reconnect backoff, pool events
//! - **`netbridge-wire`**: length-prefixed JSON frames, task/result
//!   envelopes, the framed connection
//! - **`netbridge`**: the coordinator (worker pool, pending queue, dispatch)
//!   and the worker loop (this crate)
//!
//! ## Quick Start
//!
//! ### Coordinator
//!
//! ```rust,no_run
//! use netbridge::prelude::*;
//!
//! #[compio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = CoordinatorOptions::default().with_endpoint("tcp://0.0.0.0:1300")?;
//!     let coordinator: Coordinator<(i64, i64), i64> = Coordinator::bind(options).await?;
//!
//!     // Queued until a worker connects.
//!     let sum = coordinator.run((2, 3)).await?;
//!     assert_eq!(sum, 5);
//!     Ok(())
//! }
//! ```
//!
//! ### Worker
//!
//! ```rust,no_run
//! use netbridge::prelude::*;
//!
//! #[compio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = WorkerOptions::default().with_endpoint("tcp://127.0.0.1:1300")?;
//!     let mut worker = Worker::new(options, |(a, b): (i64, i64)| {
//!         a.checked_add(b).ok_or("overflow")
//!     });
//!     worker.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Delivery
//!
//! A task whose worker disconnects mid-flight is requeued at the head of
//! the queue, up to `max_dispatch_attempts` dispatches, so handlers should
//! be idempotent. After the last attempt the caller gets
//! [`TaskError::WorkerLost`]. A handler error reaches the caller as
//! [`TaskError::Failed`] and leaves the worker connected.

#![warn(clippy::all)]

pub mod coordinator;
pub mod dev_tracing;
pub mod worker;

pub use coordinator::{Coordinator, TaskState};
pub use worker::{HandlerError, TaskHandler, Worker, WorkerExit, WorkerState, WorkerStopper};

pub use netbridge_core::correlation::{CorrelationId, WorkerId};
pub use netbridge_core::endpoint::{Endpoint, EndpointError};
pub use netbridge_core::error::{NetBridgeError, TaskError};
pub use netbridge_core::monitor::{PoolEvent, PoolMonitor};
pub use netbridge_core::options::{CoordinatorOptions, WorkerOptions, DEFAULT_PORT};
pub use netbridge_core::reconnect::ReconnectError;
pub use netbridge_wire::{ResultEnvelope, TaskEnvelope, TaskOutcome};

/// Convenient imports for coordinator and worker programs.
///
/// ```rust
/// use netbridge::prelude::*;
///
/// let options = CoordinatorOptions::default().with_max_connections(4);
/// assert_eq!(options.max_connections, 4);
/// ```
pub mod prelude {
    pub use crate::{
        Coordinator, CoordinatorOptions, CorrelationId, PoolEvent, TaskError, TaskState, Worker,
        WorkerOptions,
    };
}
