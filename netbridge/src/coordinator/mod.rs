//! The coordinator: worker pool, pending queue and dispatch.
//!
//! ```text
//!  submit ──▶ PendingQueue ──assign loop──▶ session(worker-1) ◀──TCP──▶ worker
//!     │                           │        session(worker-2) ◀──TCP──▶ worker
//!     │                           └─claims─ WorkerPool
//!     └─register──▶ Correlator ◀──publish── session
//!  await_result ──wait──┘
//! ```
//!
//! Three background loops run on the compio runtime that called
//! [`Coordinator::bind`]: accept, reap and assign. Each admitted worker gets
//! a session task that owns its socket and runs one task at a time.

mod dispatch;
mod pool;
mod queue;
mod session;

use dashmap::DashMap;
use netbridge_core::correlation::{CorrelationId, WorkerId};
use netbridge_core::correlator::Correlator;
use netbridge_core::error::TaskError;
use netbridge_core::monitor::{create_monitor, PoolEvent, PoolEventSender, PoolMonitor};
use netbridge_core::options::CoordinatorOptions;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use self::pool::WorkerPool;
use self::queue::{PendingQueue, QueuedTask};

/// Where a submitted task currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Waiting in the pending queue.
    Queued,
    /// Handed to a worker's session, not yet written to the socket.
    Assigned,
    /// Written to the worker; waiting for its result envelope.
    AwaitingResult,
    /// The worker answered with a value.
    Completed,
    /// The worker reported a handler error, or every dispatch attempt lost
    /// its worker.
    Failed,
}

impl TaskState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

pub(crate) struct Shared<P, R> {
    pub(crate) options: CoordinatorOptions,
    pub(crate) local_addr: SocketAddr,
    pub(crate) pool: WorkerPool<QueuedTask<P>>,
    pub(crate) queue: PendingQueue<P>,
    pub(crate) correlator: Correlator<R>,
    pub(crate) states: DashMap<CorrelationId, TaskState>,
    wake_tx: flume::Sender<()>,
    pub(crate) wake_rx: flume::Receiver<()>,
    shutdown_tx: Mutex<Option<flume::Sender<()>>>,
    pub(crate) shutdown_rx: flume::Receiver<()>,
    monitor: Mutex<Option<PoolEventSender>>,
    closed: AtomicBool,
}

impl<P, R> Shared<P, R> {
    pub(crate) fn new(options: CoordinatorOptions, local_addr: SocketAddr) -> Self {
        let (wake_tx, wake_rx) = flume::bounded(1);
        let (shutdown_tx, shutdown_rx) = flume::bounded(1);
        Self {
            options,
            local_addr,
            pool: WorkerPool::new(),
            queue: PendingQueue::new(),
            correlator: Correlator::new(),
            states: DashMap::new(),
            wake_tx,
            wake_rx,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            shutdown_rx,
            monitor: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Nudge the assignment loop. Wakeups coalesce.
    pub(crate) fn wake(&self) {
        let _ = self.wake_tx.try_send(());
    }

    pub(crate) fn emit(&self, event: PoolEvent) {
        let mut monitor = self.monitor.lock();
        if let Some(tx) = monitor.as_ref() {
            if tx.send(event).is_err() {
                *monitor = None;
            }
        }
    }

    /// Update the state of a task still being tracked. Tasks whose caller has
    /// already collected or abandoned them are not resurrected.
    pub(crate) fn set_state(&self, id: CorrelationId, state: TaskState) {
        if let Some(mut entry) = self.states.get_mut(&id) {
            *entry = state;
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Handle to a running coordinator.
///
/// Cheap to clone; all clones drive the same pool. The background loops
/// keep running until [`close`](Self::close) is called.
///
/// # Example
///
/// ```rust,no_run
/// use netbridge::{Coordinator, CoordinatorOptions};
///
/// #[compio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let coordinator: Coordinator<String, usize> =
///         Coordinator::bind(CoordinatorOptions::default()).await?;
///
///     let len = coordinator.run("hello".to_string()).await?;
///     println!("remote length: {len}");
///     coordinator.close();
///     Ok(())
/// }
/// ```
pub struct Coordinator<P, R> {
    shared: Arc<Shared<P, R>>,
}

impl<P, R> Clone for Coordinator<P, R> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<P, R> Coordinator<P, R>
where
    P: Serialize + 'static,
    R: DeserializeOwned + 'static,
{
    /// Bind the listener and start the accept, reap and assignment loops on
    /// the current compio runtime.
    pub async fn bind(options: CoordinatorOptions) -> io::Result<Self> {
        let listener = compio::net::TcpListener::bind(options.listen).await?;
        let local_addr = listener.local_addr()?;

        let shared = Arc::new(Shared::new(options, local_addr));

        compio::runtime::spawn(dispatch::accept_loop(shared.clone(), listener)).detach();
        compio::runtime::spawn(dispatch::reap_loop(shared.clone())).detach();
        compio::runtime::spawn(dispatch::assign_loop(shared.clone())).detach();

        info!(addr = %local_addr, "coordinator listening");
        Ok(Self { shared })
    }
}

impl<P, R> Coordinator<P, R> {
    /// Queue `payload` for execution and return its correlation id.
    ///
    /// The result slot is registered before the task becomes visible to the
    /// assignment loop. Fails only after [`close`](Self::close).
    ///
    /// The task stays tracked until [`await_result`](Self::await_result)
    /// returns for it. Callers that never await a task must
    /// [`cancel`](Self::cancel) it, even after it has finished, or its slot
    /// and state entry are kept until the coordinator closes.
    pub fn submit(&self, payload: P) -> Result<CorrelationId, TaskError> {
        let shared = &self.shared;
        if shared.is_closed() {
            return Err(TaskError::Closed);
        }

        let id = CorrelationId::next();
        shared.correlator.register(id)?;
        shared.states.insert(id, TaskState::Queued);
        shared.queue.push_back(QueuedTask::new(id, payload));
        shared.wake();

        debug!(task = %id, "task queued");
        Ok(id)
    }

    /// Wait for the result of a submitted task.
    ///
    /// Applies `task_timeout` from the options. On timeout a task that is
    /// still queued is withdrawn; one already running is left to finish and
    /// its result is discarded. The task stops being tracked once this
    /// returns, except for [`TaskError::NotPending`].
    pub async fn await_result(&self, id: CorrelationId) -> Result<R, TaskError> {
        let shared = &self.shared;
        let result = shared.correlator.wait(id, shared.options.task_timeout).await;

        match &result {
            Err(TaskError::NotPending(_)) => return result,
            Err(TaskError::Timeout { after, .. }) => {
                if shared.queue.remove(id).is_some() {
                    debug!(task = %id, ?after, "withdrew timed-out task from queue");
                }
            }
            _ => {}
        }
        shared.states.remove(&id);
        result
    }

    /// `submit` followed by `await_result`.
    pub async fn run(&self, payload: P) -> Result<R, TaskError> {
        let id = self.submit(payload)?;
        self.await_result(id).await
    }

    /// Abandon a submitted task without waiting for it.
    ///
    /// A queued task is withdrawn; one already sent to a worker runs to
    /// completion and its result is dropped. A finished but uncollected
    /// result is discarded. Returns `false` for an unknown or already
    /// collected id.
    pub fn cancel(&self, id: CorrelationId) -> bool {
        let shared = &self.shared;
        let withdrawn = shared.queue.remove(id).is_some();
        let known = shared.correlator.cancel(id);
        shared.states.remove(&id);
        if known {
            debug!(task = %id, withdrawn, "task cancelled");
        }
        known
    }

    /// Subscribe to pool lifecycle events.
    ///
    /// Only the most recent monitor receives events. The first event is
    /// always [`PoolEvent::Listening`].
    pub fn monitor(&self) -> PoolMonitor {
        let (tx, rx) = create_monitor();
        let _ = tx.send(PoolEvent::Listening(self.shared.local_addr));
        *self.shared.monitor.lock() = Some(tx);
        rx
    }

    /// Stop accepting, drop every worker, and fail every waiter with
    /// [`TaskError::Closed`]. Idempotent.
    pub fn close(&self) {
        let shared = &self.shared;
        if shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        // Dropping the sender wakes every loop and session.
        shared.shutdown_tx.lock().take();
        let workers = shared.pool.clear();
        let queued = shared.queue.drain().len();
        shared.correlator.close();
        shared.states.clear();

        info!(workers, queued, "coordinator closed");
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.shared.local_addr
    }

    /// Live workers in the pool.
    pub fn worker_count(&self) -> usize {
        self.shared.pool.live_count()
    }

    pub fn idle_workers(&self) -> usize {
        self.shared.pool.idle_count()
    }

    /// The worker the next assignment would go to, if any is idle.
    pub fn find_idle(&self) -> Option<WorkerId> {
        self.shared.pool.find_idle()
    }

    /// `Some(true)` while the worker has a task in flight; `None` once it
    /// has left the pool.
    pub fn is_worker_busy(&self, worker: WorkerId) -> Option<bool> {
        self.shared.pool.is_busy(worker)
    }

    /// Remote address of a worker still in the pool.
    pub fn worker_peer(&self, worker: WorkerId) -> Option<SocketAddr> {
        self.shared.pool.peer(worker)
    }

    pub fn queued_len(&self) -> usize {
        self.shared.queue.len()
    }

    /// Submitted tasks whose result has not been delivered yet.
    pub fn pending_calls(&self) -> usize {
        self.shared.correlator.pending()
    }

    pub fn task_state(&self, id: CorrelationId) -> Option<TaskState> {
        self.shared.states.get(&id).map(|s| *s)
    }

    /// Submitted tasks not yet collected or cancelled, finished ones
    /// included.
    pub fn tracked_tasks(&self) -> usize {
        self.shared.states.len()
    }
}
