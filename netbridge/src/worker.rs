//! Worker-side loop.
//!
//! A [`Worker`] connects to a coordinator, receives task envelopes one at a
//! time, runs them through its [`TaskHandler`] and sends back a result
//! envelope carrying the same correlation id. Handler errors are reported to
//! the coordinator as failed outcomes; the connection stays up.
//!
//! ```rust,no_run
//! use netbridge::{Worker, WorkerOptions};
//!
//! #[compio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = WorkerOptions::default().with_endpoint("tcp://127.0.0.1:1300")?;
//!     let mut worker = Worker::new(options, |text: String| {
//!         Ok::<_, std::convert::Infallible>(text.len())
//!     });
//!
//!     // Reconnects forever unless `max_reconnect_attempts` is set.
//!     worker.run().await?;
//!     Ok(())
//! }
//! ```

use compio::net::TcpStream;
use futures::{select, FutureExt};
use netbridge_core::correlation::CorrelationId;
use netbridge_core::error::NetBridgeError;
use netbridge_core::options::WorkerOptions;
use netbridge_core::reconnect::{ReconnectError, ReconnectState};
use netbridge_core::tcp::enable_tcp_nodelay;
use netbridge_core::timeout::deadline;
use netbridge_wire::{decode_payload, peek_id, Connection, ResultEnvelope, TaskEnvelope};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use tracing::{debug, info, trace, warn};

/// Error returned by a [`TaskHandler`]; its message travels back to the
/// coordinator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Business logic run by a worker for every task it receives.
///
/// Runs on the worker's own connection loop, so a slow handler only delays
/// this worker's next task.
pub trait TaskHandler<P, R> {
    fn handle(&mut self, payload: P) -> Result<R, HandlerError>;
}

impl<P, R, E, F> TaskHandler<P, R> for F
where
    F: FnMut(P) -> Result<R, E>,
    E: fmt::Display,
{
    fn handle(&mut self, payload: P) -> Result<R, HandlerError> {
        self(payload).map_err(|e| HandlerError(e.to_string()))
    }
}

/// Connection state of a [`Worker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    Disconnected,
    Connecting,
    Connected,
}

/// Why a connected session ended.
#[derive(Debug)]
pub enum WorkerExit {
    /// The coordinator closed the connection cleanly.
    CoordinatorClosed,
    /// Read, write or framing failure.
    ConnectionLost(NetBridgeError),
    /// [`WorkerStopper::stop`] was called.
    Stopped,
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CoordinatorClosed => f.write_str("coordinator closed the connection"),
            Self::ConnectionLost(e) => write!(f, "connection lost: {e}"),
            Self::Stopped => f.write_str("stopped"),
        }
    }
}

/// Asks a running [`Worker`] to finish.
///
/// The worker notices between tasks, while connecting, or while backing off;
/// a handler that is already running completes and its result is dropped.
#[derive(Clone)]
pub struct WorkerStopper {
    tx: flume::Sender<()>,
}

impl WorkerStopper {
    pub fn stop(&self) {
        let _ = self.tx.try_send(());
    }
}

pub struct Worker<P, R, H> {
    options: WorkerOptions,
    handler: H,
    state: WorkerState,
    tasks_completed: u64,
    stop_tx: flume::Sender<()>,
    stop_rx: flume::Receiver<()>,
    _marker: PhantomData<fn(P) -> R>,
}

impl<P, R, H> Worker<P, R, H>
where
    P: DeserializeOwned,
    R: Serialize,
    H: TaskHandler<P, R>,
{
    pub fn new(options: WorkerOptions, handler: H) -> Self {
        let (stop_tx, stop_rx) = flume::bounded(1);
        Self {
            options,
            handler,
            state: WorkerState::Disconnected,
            tasks_completed: 0,
            stop_tx,
            stop_rx,
            _marker: PhantomData,
        }
    }

    pub const fn state(&self) -> WorkerState {
        self.state
    }

    /// Tasks answered over the worker's lifetime, failed ones included.
    pub const fn tasks_completed(&self) -> u64 {
        self.tasks_completed
    }

    pub const fn options(&self) -> &WorkerOptions {
        &self.options
    }

    pub fn stopper(&self) -> WorkerStopper {
        WorkerStopper {
            tx: self.stop_tx.clone(),
        }
    }

    /// Connect once and serve tasks until the connection ends.
    ///
    /// `Err` means no connection was made; whether to retry is up to the
    /// caller (see [`run`](Self::run)).
    pub async fn run_once(&mut self) -> Result<WorkerExit, NetBridgeError> {
        let addr = self.options.coordinator;
        self.state = WorkerState::Connecting;
        debug!(%addr, "connecting to coordinator");

        let connected = select! {
            res = deadline(
                self.options.connect_deadline(),
                "connect",
                TcpStream::connect(addr),
            ).fuse() => Some(res),
            _ = self.stop_rx.recv_async().fuse() => None,
        };
        let stream = match connected {
            Some(Ok(stream)) => stream,
            Some(Err(e)) => {
                self.state = WorkerState::Disconnected;
                return Err(e.into());
            }
            None => {
                self.state = WorkerState::Disconnected;
                return Ok(WorkerExit::Stopped);
            }
        };

        if let Err(e) = enable_tcp_nodelay(&stream) {
            debug!(error = %e, "could not set TCP_NODELAY");
        }
        self.state = WorkerState::Connected;
        info!(%addr, "connected to coordinator");

        let mut conn = Connection::with_limits(
            stream,
            self.options.max_frame_size,
            self.options.read_buffer_size,
        );
        let exit = self.serve(&mut conn).await;
        let _ = conn.close().await;

        self.state = WorkerState::Disconnected;
        info!(%addr, %exit, "disconnected from coordinator");
        Ok(exit)
    }

    async fn serve(&mut self, conn: &mut Connection) -> WorkerExit {
        loop {
            let received = select! {
                res = conn.recv_frame().fuse() => res,
                _ = self.stop_rx.recv_async().fuse() => return WorkerExit::Stopped,
            };
            let frame = match received {
                Ok(Some(frame)) => frame,
                Ok(None) => return WorkerExit::CoordinatorClosed,
                Err(e) => return WorkerExit::ConnectionLost(e),
            };

            let reply = match self.answer(&frame) {
                Ok(reply) => reply,
                Err(e) => return WorkerExit::ConnectionLost(e),
            };
            if let Err(e) = conn.send(&reply).await {
                return WorkerExit::ConnectionLost(e);
            }
            self.tasks_completed += 1;
        }
    }

    /// Run one task frame through the handler.
    ///
    /// A body whose id is readable but whose payload is not is answered with
    /// a failed outcome; one without a readable id is a protocol error.
    fn answer(&mut self, frame: &[u8]) -> Result<ResultEnvelope<R>, NetBridgeError> {
        let task: TaskEnvelope<P> = match decode_payload(frame) {
            Ok(task) => task,
            Err(e) => {
                let id: CorrelationId = peek_id(frame)?;
                warn!(task = %id, error = %e, "undecodable task payload");
                return Ok(ResultEnvelope::failed(id, format!("undecodable payload: {e}")));
            }
        };

        let id = task.id;
        trace!(task = %id, "running task");
        Ok(match self.handler.handle(task.payload) {
            Ok(value) => ResultEnvelope::completed(id, value),
            Err(e) => {
                warn!(task = %id, error = %e, "handler failed");
                ResultEnvelope::failed(id, e.0)
            }
        })
    }

    /// Serve the coordinator, reconnecting with exponential backoff.
    ///
    /// A session that connected resets the backoff. Returns `Ok` once
    /// stopped, or an error when `max_reconnect_attempts` consecutive
    /// attempts have failed.
    pub async fn run(&mut self) -> Result<(), ReconnectError> {
        let mut reconnect = ReconnectState::new(&self.options);
        loop {
            match self.run_once().await {
                Ok(WorkerExit::Stopped) => return Ok(()),
                Ok(_) => reconnect.reset(),
                Err(e) => warn!(
                    addr = %self.options.coordinator,
                    attempt = reconnect.attempt() + 1,
                    error = %e,
                    "could not reach coordinator"
                ),
            }

            let delay = reconnect.fail()?;
            debug!(?delay, "reconnecting after backoff");
            let stopped = select! {
                _ = compio::time::sleep(delay).fuse() => false,
                _ = self.stop_rx.recv_async().fuse() => true,
            };
            if stopped {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_handler() {
        let mut double = |x: i64| {
            if x < 0 {
                Err("negative input")
            } else {
                Ok(x * 2)
            }
        };
        assert_eq!(TaskHandler::<i64, i64>::handle(&mut double, 21), Ok(42));
        assert_eq!(
            TaskHandler::<i64, i64>::handle(&mut double, -1),
            Err(HandlerError::new("negative input"))
        );
    }

    #[test]
    fn test_answer_wraps_outcomes() {
        let mut worker = Worker::new(WorkerOptions::default(), |x: u32| {
            x.checked_sub(1).ok_or("underflow")
        });
        let id = CorrelationId::next();

        let ok = serde_json::to_vec(&TaskEnvelope::new(id, 5_u32)).unwrap();
        assert_eq!(worker.answer(&ok).unwrap(), ResultEnvelope::completed(id, 4));

        let failed = serde_json::to_vec(&TaskEnvelope::new(id, 0_u32)).unwrap();
        assert_eq!(worker.answer(&failed).unwrap(), ResultEnvelope::failed(id, "underflow"));
    }

    #[test]
    fn test_answer_bad_payload() {
        let mut worker = Worker::new(WorkerOptions::default(), |x: u32| {
            Ok::<_, HandlerError>(x)
        });
        let id = CorrelationId::next();

        let bad = serde_json::to_vec(&TaskEnvelope::new(id, "not a number")).unwrap();
        let reply = worker.answer(&bad).unwrap();
        assert_eq!(reply.id, id);
        assert!(matches!(reply.result, netbridge_wire::TaskOutcome::Failed(_)));

        assert!(worker.answer(b"{\"payload\":1}").is_err());
    }

    #[compio::test]
    async fn test_stop_before_run() {
        let mut worker = Worker::new(
            WorkerOptions::default().with_coordinator("127.0.0.1:9".parse().unwrap()),
            |x: u32| Ok::<_, HandlerError>(x),
        );
        worker.stopper().stop();
        assert!(worker.run().await.is_ok());
        assert_eq!(worker.state(), WorkerState::Disconnected);
    }
}
