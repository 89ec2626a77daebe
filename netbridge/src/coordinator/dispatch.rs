//! Background loops of the coordinator and the task bookkeeping shared by
//! the sessions.

use compio::net::{TcpListener, TcpStream};
use futures::{select, FutureExt};
use netbridge_core::correlation::{CorrelationId, WorkerId};
use netbridge_core::error::TaskError;
use netbridge_core::monitor::PoolEvent;
use netbridge_core::tcp::enable_tcp_nodelay;
use netbridge_wire::{ResultEnvelope, TaskOutcome};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use super::pool::WorkerRecord;
use super::queue::QueuedTask;
use super::{session, Shared, TaskState};

/// Sleep for `period`, or return `false` early if the coordinator shuts down.
async fn pause<P, R>(shared: &Shared<P, R>, period: Duration) -> bool {
    select! {
        _ = compio::time::sleep(period).fuse() => true,
        _ = shared.shutdown_rx.recv_async().fuse() => false,
    }
}

pub(crate) async fn accept_loop<P, R>(shared: Arc<Shared<P, R>>, listener: TcpListener)
where
    P: Serialize + 'static,
    R: DeserializeOwned + 'static,
{
    let backoff = shared.options.accept_backoff;
    loop {
        if shared.pool.live_count() >= shared.options.max_connections {
            trace!(max = shared.options.max_connections, "pool full, accept stalled");
            if !pause(&shared, backoff).await {
                break;
            }
            continue;
        }

        let accepted = select! {
            res = listener.accept().fuse() => Some(res),
            _ = shared.shutdown_rx.recv_async().fuse() => None,
        };

        match accepted {
            Some(Ok((stream, peer))) => admit(&shared, stream, peer),
            Some(Err(e)) => {
                warn!(error = %e, "accept failed");
                if !pause(&shared, backoff).await {
                    break;
                }
            }
            None => break,
        }
    }
    debug!("accept loop stopped");
}

fn admit<P, R>(shared: &Arc<Shared<P, R>>, stream: TcpStream, peer: SocketAddr)
where
    P: Serialize + 'static,
    R: DeserializeOwned + 'static,
{
    if let Err(e) = enable_tcp_nodelay(&stream) {
        debug!(%peer, error = %e, "could not set TCP_NODELAY");
    }

    let (tx, rx) = flume::bounded(1);
    let record = WorkerRecord::new(WorkerId::next(), peer, tx);
    let worker = record.id;
    let alive = record.alive.clone();
    shared.pool.insert(record);

    compio::runtime::spawn(session::run(shared.clone(), worker, stream, rx, alive)).detach();

    info!(%worker, %peer, "worker connected");
    shared.emit(PoolEvent::WorkerConnected { worker, peer });
    shared.wake();
}

pub(crate) async fn reap_loop<P, R>(shared: Arc<Shared<P, R>>) {
    while pause(&shared, shared.options.reap_interval).await {
        let reaped = shared.pool.reap();
        if reaped.is_empty() {
            continue;
        }
        for (worker, busy) in reaped {
            shared.emit(PoolEvent::WorkerReaped { worker, busy });
            debug!(%worker, busy, "reaped worker");
        }
        debug!(remaining = shared.pool.len(), "reap pass done");
    }
    debug!("reap loop stopped");
}

pub(crate) async fn assign_loop<P, R>(shared: Arc<Shared<P, R>>) {
    loop {
        assign_ready(&shared);

        let running = select! {
            woke = shared.wake_rx.recv_async().fuse() => woke.is_ok(),
            _ = compio::time::sleep(shared.options.idle_backoff).fuse() => true,
            _ = shared.shutdown_rx.recv_async().fuse() => false,
        };
        if !running || shared.is_closed() {
            break;
        }
    }
    debug!("assign loop stopped");
}

/// Pair queued tasks with idle workers until one of them runs out.
pub(crate) fn assign_ready<P, R>(shared: &Shared<P, R>) {
    while let Some((task, claim)) = shared.queue.pop_with(|| shared.pool.claim_idle()) {
        let id = task.id;
        match claim.tx.try_send(task) {
            Ok(()) => {
                shared.set_state(id, TaskState::Assigned);
                trace!(task = %id, worker = %claim.worker, "task assigned");
            }
            Err(e) => {
                // The session is gone; its record goes to the reaper.
                shared.queue.push_front(e.into_inner());
                shared.pool.mark_dead(claim.worker);
                debug!(worker = %claim.worker, "assignment channel closed");
            }
        }
    }
}

/// A worker answered `id`: release it first, then deliver the outcome.
pub(crate) fn complete<P, R>(
    shared: &Shared<P, R>,
    worker: WorkerId,
    id: CorrelationId,
    envelope: ResultEnvelope<R>,
) {
    shared.pool.release(worker);
    shared.wake();

    let delivered = match envelope.result {
        TaskOutcome::Completed(value) => {
            shared.set_state(id, TaskState::Completed);
            shared.correlator.publish(id, value)
        }
        TaskOutcome::Failed(message) => {
            warn!(task = %id, %worker, %message, "task failed on worker");
            shared.set_state(id, TaskState::Failed);
            shared.correlator.fail(id, TaskError::Failed { id, message })
        }
    };

    if delivered {
        trace!(task = %id, %worker, "result delivered");
    }
    shared.emit(PoolEvent::TaskCompleted { task: id, worker });
}

/// The worker running `task` is gone: requeue at the head or give up.
pub(crate) fn recover<P, R>(shared: &Shared<P, R>, worker: WorkerId, task: QueuedTask<P>) {
    shared.pool.mark_dead(worker);
    let id = task.id;

    if shared.is_closed() || !shared.correlator.is_pending(id) {
        debug!(task = %id, "dropping task lost with its worker; nobody is waiting");
        return;
    }

    let attempts = task.attempts;
    if attempts < shared.options.max_dispatch_attempts {
        info!(task = %id, %worker, attempt = attempts, "requeueing task lost with its worker");
        shared.set_state(id, TaskState::Queued);
        shared.queue.push_front(task);
        shared.emit(PoolEvent::TaskRequeued { task: id, attempt: attempts });
        shared.wake();
    } else {
        warn!(task = %id, %worker, attempts, "task lost, no attempts left");
        shared.set_state(id, TaskState::Failed);
        shared.correlator.fail(id, TaskError::WorkerLost { id, attempts });
        shared.emit(PoolEvent::TaskLost { task: id, attempts });
    }
}

/// Put back tasks a finished session received but never wrote. No attempt
/// was made, so the dispatch count is left as it was.
pub(crate) fn return_unsent<P, R>(
    shared: &Shared<P, R>,
    worker: WorkerId,
    assignments: &flume::Receiver<QueuedTask<P>>,
) {
    let unsent: Vec<_> = assignments.try_iter().collect();
    if unsent.is_empty() {
        return;
    }

    for task in unsent.into_iter().rev() {
        let (id, attempt) = (task.id, task.attempts);
        if shared.is_closed() || !shared.correlator.is_pending(id) {
            debug!(task = %id, %worker, "dropping unsent task; nobody is waiting");
            continue;
        }
        info!(task = %id, %worker, attempt, "returning unsent task to the queue");
        shared.set_state(id, TaskState::Queued);
        shared.queue.push_front(task);
        shared.emit(PoolEvent::TaskRequeued { task: id, attempt });
    }
    shared.wake();
}

/// A frame that does not answer the worker's in-flight task.
pub(crate) fn stale<P, R>(shared: &Shared<P, R>, worker: WorkerId, task: Option<CorrelationId>) {
    match task {
        Some(id) => warn!(task = %id, %worker, "discarding stale result"),
        None => warn!(%worker, "discarding undecodable frame"),
    }
    shared.emit(PoolEvent::StaleResult { task, worker });
}
