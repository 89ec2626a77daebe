//! Per-worker session.
//!
//! One session task owns one accepted socket. A read pump, spawned by the
//! session, decodes frames continuously and forwards them over a channel,
//! so the session can wait on incoming frames, assignments and shutdown at
//! once without ever cancelling a socket read. While idle, the outstanding
//! read is what notices a worker that went away.

use bytes::Bytes;
use compio::net::TcpStream;
use futures::{pin_mut, select, select_biased, FutureExt};
use netbridge_core::correlation::{CorrelationId, WorkerId};
use netbridge_core::monitor::PoolEvent;
use netbridge_wire::{decode_payload, peek_id, Connection, ResultEnvelope, TaskEnvelope};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace};

use super::dispatch;
use super::queue::QueuedTask;
use super::{Shared, TaskState};

/// What the read pump reports.
enum Inbound {
    Frame(Bytes),
    Closed(String),
}

enum Wake<P> {
    Inbound(Inbound),
    Assigned(Option<QueuedTask<P>>),
    Shutdown,
}

enum Reply {
    Inbound(Inbound),
    TimedOut,
    Shutdown,
}

async fn read_pump(stream: Rc<TcpStream>, tx: flume::Sender<Inbound>, max_frame: usize, buffer: usize) {
    let mut conn = Connection::with_limits(&*stream, max_frame, buffer);
    loop {
        let event = match conn.recv_frame().await {
            Ok(Some(frame)) => Inbound::Frame(frame),
            Ok(None) => Inbound::Closed("peer closed the connection".into()),
            Err(e) => Inbound::Closed(e.to_string()),
        };
        let closed = matches!(event, Inbound::Closed(_));
        if tx.send(event).is_err() || closed {
            break;
        }
    }
}

pub(crate) async fn run<P, R>(
    shared: Arc<Shared<P, R>>,
    worker: WorkerId,
    stream: TcpStream,
    assignments: flume::Receiver<QueuedTask<P>>,
    alive: Arc<AtomicBool>,
) where
    P: Serialize + 'static,
    R: DeserializeOwned + 'static,
{
    let stream = Rc::new(stream);
    let (inbound_tx, inbound) = flume::unbounded();
    let pump = compio::runtime::spawn(read_pump(
        stream.clone(),
        inbound_tx,
        shared.options.max_frame_size,
        shared.options.read_buffer_size,
    ));

    serve(&shared, worker, &stream, inbound, assignments, &alive).await;
    drop(pump);
}

async fn serve<P, R>(
    shared: &Shared<P, R>,
    worker: WorkerId,
    stream: &TcpStream,
    inbound: flume::Receiver<Inbound>,
    assignments: flume::Receiver<QueuedTask<P>>,
    alive: &AtomicBool,
) where
    P: Serialize,
    R: DeserializeOwned,
{
    let mut session = Session {
        shared,
        worker,
        writer: Connection::with_limits(
            stream,
            shared.options.max_frame_size,
            shared.options.read_buffer_size,
        ),
        inbound,
    };

    let reason = loop {
        // Biased: a connection that already closed must not take a task.
        let wake = select_biased! {
            ev = session.inbound.recv_async().fuse() => match ev {
                Ok(ev) => Wake::Inbound(ev),
                Err(_) => Wake::Inbound(Inbound::Closed("read pump stopped".into())),
            },
            _ = shared.shutdown_rx.recv_async().fuse() => Wake::Shutdown,
            task = assignments.recv_async().fuse() => Wake::Assigned(task.ok()),
        };

        match wake {
            Wake::Inbound(Inbound::Frame(frame)) => {
                // Nothing is in flight, so any frame is unsolicited.
                match peek_id(&frame) {
                    Ok(id) => dispatch::stale(shared, worker, Some(id)),
                    Err(e) => break format!("protocol error: {e}"),
                }
            }
            Wake::Inbound(Inbound::Closed(reason)) => break reason,
            Wake::Assigned(Some(task)) => {
                if let Err(reason) = session.execute(task).await {
                    break reason;
                }
            }
            Wake::Assigned(None) => break "removed from pool".to_string(),
            Wake::Shutdown => break "coordinator closed".to_string(),
        }
    };

    // Any in-flight task has been recovered by now. An assignment that
    // arrived after the loop stopped listening was never sent.
    alive.store(false, Ordering::Release);
    dispatch::return_unsent(shared, worker, &assignments);
    let _ = session.writer.close().await;

    info!(%worker, %reason, "worker disconnected");
    shared.emit(PoolEvent::WorkerDisconnected { worker, reason });
}

struct Session<'a, P, R> {
    shared: &'a Shared<P, R>,
    worker: WorkerId,
    writer: Connection<&'a TcpStream>,
    inbound: flume::Receiver<Inbound>,
}

impl<P, R> Session<'_, P, R>
where
    P: Serialize,
    R: DeserializeOwned,
{
    /// Send one task and wait for its result.
    ///
    /// `Err` means the connection is finished; the task has already been
    /// requeued or failed.
    async fn execute(&mut self, mut task: QueuedTask<P>) -> Result<(), String> {
        let shared = self.shared;
        let worker = self.worker;
        let id = task.id;

        if !shared.correlator.is_pending(id) {
            // The caller gave up while the task was on its way here.
            debug!(task = %id, %worker, "skipping abandoned task");
            shared.pool.release(worker);
            shared.wake();
            return Ok(());
        }

        task.attempts += 1;
        let sent = self
            .writer
            .send(&TaskEnvelope::new(id, &task.payload))
            .await;
        if let Err(e) = sent {
            dispatch::recover(shared, worker, task);
            return Err(format!("send failed: {e}"));
        }

        shared.set_state(id, TaskState::AwaitingResult);
        shared.emit(PoolEvent::TaskDispatched { task: id, worker });
        trace!(task = %id, %worker, attempt = task.attempts, "task sent");

        match self.await_reply(id).await {
            Ok(envelope) => {
                dispatch::complete(shared, worker, id, envelope);
                Ok(())
            }
            Err(reason) => {
                dispatch::recover(shared, worker, task);
                Err(reason)
            }
        }
    }

    /// Wait for the result envelope answering `id`, discarding anything else.
    async fn await_reply(&mut self, id: CorrelationId) -> Result<ResultEnvelope<R>, String> {
        let shared = self.shared;
        let limit = shared.options.result_timeout;
        let deadline = async move {
            match limit {
                Some(after) => compio::time::sleep(after).await,
                None => futures::future::pending::<()>().await,
            }
        }
        .fuse();
        pin_mut!(deadline);

        loop {
            let reply = select! {
                ev = self.inbound.recv_async().fuse() => match ev {
                    Ok(ev) => Reply::Inbound(ev),
                    Err(_) => Reply::Inbound(Inbound::Closed("read pump stopped".into())),
                },
                _ = deadline => Reply::TimedOut,
                _ = shared.shutdown_rx.recv_async().fuse() => Reply::Shutdown,
            };

            match reply {
                Reply::Inbound(Inbound::Frame(frame)) => match peek_id(&frame) {
                    Ok(got) if got == id => {
                        return decode_payload::<ResultEnvelope<R>>(&frame)
                            .map_err(|e| format!("undecodable result for {id}: {e}"));
                    }
                    Ok(other) => dispatch::stale(shared, self.worker, Some(other)),
                    Err(e) => return Err(format!("protocol error: {e}")),
                },
                Reply::Inbound(Inbound::Closed(reason)) => return Err(reason),
                Reply::TimedOut => {
                    return Err(format!("no result within {:?}", limit.unwrap_or_default()))
                }
                Reply::Shutdown => return Err("coordinator closed".to_string()),
            }
        }
    }
}
