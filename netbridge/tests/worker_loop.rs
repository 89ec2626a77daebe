//! Worker-side loop against a hand-driven coordinator socket.

use compio::net::{TcpListener, TcpStream};
use netbridge::dev_tracing::init_tracing;
use netbridge::{
    CorrelationId, HandlerError, NetBridgeError, ReconnectError, ResultEnvelope, TaskEnvelope,
    TaskOutcome, Worker, WorkerExit, WorkerOptions, WorkerState,
};
use netbridge_wire::Connection;
use std::net::SocketAddr;
use std::time::Duration;

/// An address nothing listens on.
fn dead_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

fn options(addr: SocketAddr) -> WorkerOptions {
    WorkerOptions::default()
        .with_coordinator(addr)
        .with_connect_timeout(Duration::from_secs(2))
        .with_reconnect_ivl(Duration::from_millis(10))
        .with_reconnect_ivl_max(Duration::from_millis(40))
}

fn halve(x: u32) -> Result<u32, HandlerError> {
    if x % 2 == 0 {
        Ok(x / 2)
    } else {
        Err(HandlerError::new(format!("{x} is odd")))
    }
}

#[compio::test]
async fn test_connect_failure_is_reported() {
    init_tracing();
    let mut worker = Worker::new(options(dead_addr()), halve);

    let err = worker.run_once().await.unwrap_err();
    assert!(matches!(err, NetBridgeError::Io(_)));
    assert_eq!(worker.state(), WorkerState::Disconnected);
    assert_eq!(worker.tasks_completed(), 0);
}

#[compio::test]
async fn test_reconnect_gives_up_after_cap() {
    init_tracing();
    let mut worker = Worker::new(
        options(dead_addr()).with_max_reconnect_attempts(Some(2)),
        halve,
    );

    let err = worker.run().await.unwrap_err();
    assert_eq!(err, ReconnectError::MaxAttemptsReached { attempts: 2 });
}

#[compio::test]
async fn test_serves_tasks_until_coordinator_closes() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut worker = Worker::new(options(listener.local_addr().unwrap()), halve);

    let even = CorrelationId::next();
    let odd = CorrelationId::next();

    let coordinator = async {
        let (stream, _) = listener.accept().await.unwrap();
        let mut conn = Connection::new(stream);

        conn.send(&TaskEnvelope::new(even, 10_u32)).await.unwrap();
        let reply: ResultEnvelope<u32> = conn.recv().await.unwrap().unwrap();
        assert_eq!(reply, ResultEnvelope::completed(even, 5));

        conn.send(&TaskEnvelope::new(odd, 7_u32)).await.unwrap();
        let reply: ResultEnvelope<u32> = conn.recv().await.unwrap().unwrap();
        assert_eq!(reply.id, odd);
        assert_eq!(reply.result, TaskOutcome::Failed("7 is odd".to_string()));

        // A payload of the wrong type is answered, not fatal.
        let bad = CorrelationId::next();
        conn.send(&TaskEnvelope::new(bad, "seven")).await.unwrap();
        let reply: ResultEnvelope<u32> = conn.recv().await.unwrap().unwrap();
        assert_eq!(reply.id, bad);
        assert!(matches!(reply.result, TaskOutcome::Failed(_)));
    };

    let (exit, ()) = futures::join!(worker.run_once(), coordinator);
    assert!(matches!(exit.unwrap(), WorkerExit::CoordinatorClosed));
    assert_eq!(worker.tasks_completed(), 3);
    assert_eq!(worker.state(), WorkerState::Disconnected);
}

#[compio::test]
async fn test_garbage_frame_drops_connection() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut worker = Worker::new(options(listener.local_addr().unwrap()), halve);

    let coordinator = async {
        let (stream, _) = listener.accept().await.unwrap();
        let mut conn = Connection::new(stream);
        conn.send(&serde_json::json!({ "no_id": true })).await.unwrap();
        // Keep the socket open until the worker hangs up.
        let eof: Option<ResultEnvelope<u32>> = conn.recv().await.unwrap();
        assert!(eof.is_none());
    };

    let (exit, ()) = futures::join!(worker.run_once(), coordinator);
    assert!(matches!(exit.unwrap(), WorkerExit::ConnectionLost(_)));
    assert_eq!(worker.tasks_completed(), 0);
}

#[compio::test]
async fn test_reconnects_after_coordinator_restart() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut worker = Worker::new(options(listener.local_addr().unwrap()), halve);
    let stopper = worker.stopper();

    let coordinator = async {
        // Two sessions in a row: the worker must come back after the first ends.
        for round in 0..2_u32 {
            let (stream, _): (TcpStream, _) = listener.accept().await.unwrap();
            let mut conn = Connection::new(stream);
            let id = CorrelationId::next();
            conn.send(&TaskEnvelope::new(id, round * 4)).await.unwrap();
            let reply: ResultEnvelope<u32> = conn.recv().await.unwrap().unwrap();
            assert_eq!(reply, ResultEnvelope::completed(id, round * 2));
        }
        stopper.stop();
    };

    let (result, ()) = futures::join!(worker.run(), coordinator);
    assert!(result.is_ok());
    assert_eq!(worker.tasks_completed(), 2);
}
