//! Coordinator and worker configuration
//!
//! Plain option structs with defaults and `with_*` builders. Where the values
//! come from (flags, files, environment) is left to the embedding program.

use std::net::SocketAddr;
use std::time::Duration;

use crate::endpoint::{Endpoint, EndpointError};

/// Default TCP port the coordinator listens on.
pub const DEFAULT_PORT: u16 = 1300;

/// Default upper bound on one frame body (16 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Default read chunk size for connection buffers.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8192;

/// Coordinator configuration.
///
/// # Examples
///
/// ```
/// use netbridge_core::options::CoordinatorOptions;
/// use std::time::Duration;
///
/// let opts = CoordinatorOptions::default()
///     .with_endpoint("tcp://127.0.0.1:0").unwrap()
///     .with_max_connections(8)
///     .with_task_timeout(Some(Duration::from_secs(30)));
/// assert_eq!(opts.max_connections, 8);
/// ```
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Address the listener binds to. Port 0 picks an ephemeral port.
    pub listen: SocketAddr,

    /// Maximum number of simultaneously registered workers.
    ///
    /// While the pool is full the accept loop stalls for `accept_backoff`
    /// before looking again.
    pub max_connections: usize,

    /// How often the reaper sweeps disconnected workers out of the pool.
    pub reap_interval: Duration,

    /// Fallback re-check period of the assignment loop.
    ///
    /// Assignment is normally woken by submit/release/admission events;
    /// this bounds how long a missed wakeup can delay a queued task.
    pub idle_backoff: Duration,

    /// Stall period of the accept loop while the pool is at capacity.
    pub accept_backoff: Duration,

    /// Per-dispatch wait for the worker's answer.
    ///
    /// - `None`: wait as long as the connection stays up (default)
    /// - `Some(d)`: treat the worker as lost after `d`
    pub result_timeout: Option<Duration>,

    /// Caller-side deadline applied by `await_result`.
    ///
    /// - `None`: wait indefinitely (default)
    pub task_timeout: Option<Duration>,

    /// Number of dispatches a task gets before its caller sees
    /// `WorkerLost`. A task is requeued after each worker loss until this is
    /// reached.
    pub max_dispatch_attempts: u32,

    /// Largest frame body accepted from a worker.
    pub max_frame_size: usize,

    /// Read chunk size for per-worker connection buffers.
    pub read_buffer_size: usize,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_connections: 100,
            reap_interval: Duration::from_secs(10),
            idle_backoff: Duration::from_secs(1),
            accept_backoff: Duration::from_secs(1),
            result_timeout: None,
            task_timeout: None,
            max_dispatch_attempts: 3,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl CoordinatorOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the listen address from an endpoint string (`tcp://ip:port` or
    /// `ip:port`).
    pub fn with_endpoint(mut self, endpoint: &str) -> Result<Self, EndpointError> {
        self.listen = Endpoint::parse(endpoint)?.socket_addr();
        Ok(self)
    }

    #[must_use]
    pub const fn with_listen(mut self, addr: SocketAddr) -> Self {
        self.listen = addr;
        self
    }

    #[must_use]
    pub const fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    #[must_use]
    pub const fn with_reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_idle_backoff(mut self, backoff: Duration) -> Self {
        self.idle_backoff = backoff;
        self
    }

    #[must_use]
    pub const fn with_accept_backoff(mut self, backoff: Duration) -> Self {
        self.accept_backoff = backoff;
        self
    }

    #[must_use]
    pub const fn with_result_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.result_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_task_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.task_timeout = timeout;
        self
    }

    /// Values below 1 are raised to 1: every task is dispatched at least once.
    #[must_use]
    pub fn with_max_dispatch_attempts(mut self, attempts: u32) -> Self {
        self.max_dispatch_attempts = attempts.max(1);
        self
    }

    #[must_use]
    pub const fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    #[must_use]
    pub const fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Coordinator address to connect to.
    pub coordinator: SocketAddr,

    /// Maximum time to wait for the TCP connect to complete.
    /// `Duration::ZERO` leaves it to the OS.
    pub connect_timeout: Duration,

    /// Initial delay before reconnecting after a lost or failed connection.
    pub reconnect_ivl: Duration,

    /// Upper bound for the exponential reconnect delay.
    /// `Duration::ZERO` disables growth: every retry waits `reconnect_ivl`.
    pub reconnect_ivl_max: Duration,

    /// Give up after this many consecutive failed connects.
    /// `None` retries forever.
    pub max_reconnect_attempts: Option<u32>,

    /// Largest frame body accepted from the coordinator.
    pub max_frame_size: usize,

    /// Read chunk size for the connection buffer.
    pub read_buffer_size: usize,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            coordinator: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            connect_timeout: Duration::from_secs(10),
            reconnect_ivl: Duration::from_millis(100),
            reconnect_ivl_max: Duration::from_secs(30),
            max_reconnect_attempts: None,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl WorkerOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the coordinator address from an endpoint string.
    pub fn with_endpoint(mut self, endpoint: &str) -> Result<Self, EndpointError> {
        self.coordinator = Endpoint::parse(endpoint)?.socket_addr();
        Ok(self)
    }

    #[must_use]
    pub const fn with_coordinator(mut self, addr: SocketAddr) -> Self {
        self.coordinator = addr;
        self
    }

    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_reconnect_ivl(mut self, ivl: Duration) -> Self {
        self.reconnect_ivl = ivl;
        self
    }

    #[must_use]
    pub const fn with_reconnect_ivl_max(mut self, max: Duration) -> Self {
        self.reconnect_ivl_max = max;
        self
    }

    #[must_use]
    pub const fn with_max_reconnect_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    #[must_use]
    pub const fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    #[must_use]
    pub const fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Connect timeout as an optional deadline (`None` for the OS default).
    #[must_use]
    pub fn connect_deadline(&self) -> Option<Duration> {
        (!self.connect_timeout.is_zero()).then_some(self.connect_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinator_defaults() {
        let opts = CoordinatorOptions::default();
        assert_eq!(opts.listen.port(), 1300);
        assert_eq!(opts.max_connections, 100);
        assert_eq!(opts.reap_interval, Duration::from_secs(10));
        assert_eq!(opts.idle_backoff, Duration::from_secs(1));
        assert_eq!(opts.max_dispatch_attempts, 3);
        assert!(opts.task_timeout.is_none());
    }

    #[test]
    fn test_coordinator_builder() {
        let opts = CoordinatorOptions::new()
            .with_endpoint("tcp://127.0.0.1:0")
            .unwrap()
            .with_reap_interval(Duration::from_millis(50))
            .with_max_dispatch_attempts(0);

        assert_eq!(opts.listen, "127.0.0.1:0".parse().unwrap());
        assert_eq!(opts.reap_interval, Duration::from_millis(50));
        assert_eq!(opts.max_dispatch_attempts, 1);
    }

    #[test]
    fn test_worker_defaults() {
        let opts = WorkerOptions::default();
        assert_eq!(opts.coordinator, "127.0.0.1:1300".parse().unwrap());
        assert_eq!(opts.connect_deadline(), Some(Duration::from_secs(10)));
        assert!(opts.max_reconnect_attempts.is_none());
    }

    #[test]
    fn test_worker_zero_connect_timeout() {
        let opts = WorkerOptions::default().with_connect_timeout(Duration::ZERO);
        assert_eq!(opts.connect_deadline(), None);
    }

    #[test]
    fn test_bad_endpoint() {
        assert!(WorkerOptions::default().with_endpoint("udp://1.2.3.4:5").is_err());
    }
}
