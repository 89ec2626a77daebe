//! NetBridge Core
//!
//! Runtime-agnostic building blocks shared by the coordinator and worker:
//! - Task and worker identifiers (`correlation`)
//! - Completion correlator: one-shot result slots keyed by task id (`correlator`)
//! - Coordinator/worker options (`options`) and endpoint parsing (`endpoint`)
//! - Reconnect backoff (`reconnect`)
//! - Pool lifecycle events (`monitor`)
//! - Cancellation safety for frame writes (`poison`) and I/O deadlines (`timeout`)
//! - TCP tuning (`tcp`)
//! - Error types (`error`)

// The tcp module needs raw fd/socket access for socket configuration
#![cfg_attr(not(test), deny(unsafe_code))]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::match_same_arms)]

pub mod correlation;
pub mod correlator;
pub mod endpoint;
pub mod error;
pub mod monitor;
pub mod options;
pub mod poison;
pub mod reconnect;
pub mod tcp;
pub mod timeout;

pub mod prelude {
    pub use crate::correlation::{CorrelationId, WorkerId};
    pub use crate::correlator::Correlator;
    pub use crate::endpoint::{Endpoint, EndpointError};
    pub use crate::error::{NetBridgeError, Result, TaskError};
    pub use crate::monitor::{PoolEvent, PoolMonitor};
    pub use crate::options::{CoordinatorOptions, WorkerOptions};
    pub use crate::poison::PoisonGuard;
    pub use crate::reconnect::{ReconnectError, ReconnectState};
    pub use crate::tcp::enable_tcp_nodelay;
}
