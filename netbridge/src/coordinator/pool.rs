//! Worker pool: the records of every admitted worker connection.
//!
//! Records are kept in admission order; `find_idle` and `claim_idle` return
//! the first live, non-busy record. The connection itself is owned by the
//! worker's session task; the record holds only what dispatch needs (the
//! busy flag, a liveness flag the session clears, and the assignment
//! channel into the session).

use flume::Sender;
use netbridge_core::correlation::WorkerId;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub(crate) struct WorkerRecord<T> {
    pub(crate) id: WorkerId,
    pub(crate) peer: SocketAddr,
    pub(crate) busy: bool,
    pub(crate) alive: Arc<AtomicBool>,
    pub(crate) tx: Sender<T>,
}

impl<T> WorkerRecord<T> {
    pub(crate) fn new(id: WorkerId, peer: SocketAddr, tx: Sender<T>) -> Self {
        Self {
            id,
            peer,
            busy: false,
            alive: Arc::new(AtomicBool::new(true)),
            tx,
        }
    }

    #[inline]
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    #[inline]
    fn is_idle(&self) -> bool {
        !self.busy && self.is_alive()
    }
}

/// A worker handed out by [`WorkerPool::claim_idle`], already marked busy.
pub(crate) struct Claim<T> {
    pub(crate) worker: WorkerId,
    pub(crate) tx: Sender<T>,
}

pub(crate) struct WorkerPool<T> {
    records: Mutex<Vec<WorkerRecord<T>>>,
}

impl<T> WorkerPool<T> {
    pub(crate) fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn insert(&self, record: WorkerRecord<T>) {
        self.records.lock().push(record);
    }

    /// Records present, including dead ones the reaper has not swept yet.
    pub(crate) fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub(crate) fn live_count(&self) -> usize {
        self.records.lock().iter().filter(|r| r.is_alive()).count()
    }

    pub(crate) fn idle_count(&self) -> usize {
        self.records.lock().iter().filter(|r| r.is_idle()).count()
    }

    pub(crate) fn find_idle(&self) -> Option<WorkerId> {
        self.records.lock().iter().find(|r| r.is_idle()).map(|r| r.id)
    }

    /// Mark the first idle worker busy and return it.
    pub(crate) fn claim_idle(&self) -> Option<Claim<T>> {
        let mut records = self.records.lock();
        let record = records.iter_mut().find(|r| r.is_idle())?;
        record.busy = true;
        Some(Claim {
            worker: record.id,
            tx: record.tx.clone(),
        })
    }

    /// Clear the busy flag. Returns `false` if the worker is gone.
    pub(crate) fn release(&self, worker: WorkerId) -> bool {
        let mut records = self.records.lock();
        match records.iter_mut().find(|r| r.id == worker) {
            Some(record) => {
                record.busy = false;
                true
            }
            None => false,
        }
    }

    pub(crate) fn mark_dead(&self, worker: WorkerId) {
        if let Some(record) = self.records.lock().iter().find(|r| r.id == worker) {
            record.alive.store(false, Ordering::Release);
        }
    }

    pub(crate) fn is_busy(&self, worker: WorkerId) -> Option<bool> {
        self.records
            .lock()
            .iter()
            .find(|r| r.id == worker)
            .map(|r| r.busy)
    }

    pub(crate) fn peer(&self, worker: WorkerId) -> Option<SocketAddr> {
        self.records
            .lock()
            .iter()
            .find(|r| r.id == worker)
            .map(|r| r.peer)
    }

    /// Remove dead records, returning `(id, was_busy)` for each.
    pub(crate) fn reap(&self) -> Vec<(WorkerId, bool)> {
        let mut reaped = Vec::new();
        self.records.lock().retain(|r| {
            if r.is_alive() {
                true
            } else {
                reaped.push((r.id, r.busy));
                false
            }
        });
        reaped
    }

    /// Drop every record, disconnecting every session's assignment channel.
    pub(crate) fn clear(&self) -> usize {
        let mut records = self.records.lock();
        let n = records.len();
        records.clear();
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pool: &WorkerPool<u32>) -> (WorkerId, Arc<AtomicBool>, flume::Receiver<u32>) {
        let (tx, rx) = flume::bounded(1);
        let rec = WorkerRecord::new(WorkerId::next(), "127.0.0.1:9".parse().unwrap(), tx);
        let id = rec.id;
        let alive = rec.alive.clone();
        pool.insert(rec);
        (id, alive, rx)
    }

    #[test]
    fn test_find_idle_prefers_admission_order() {
        let pool = WorkerPool::new();
        let (a, _, _ra) = record(&pool);
        let (b, _, _rb) = record(&pool);

        assert_eq!(pool.find_idle(), Some(a));
        let claim = pool.claim_idle().unwrap();
        assert_eq!(claim.worker, a);
        assert_eq!(pool.find_idle(), Some(b));
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn test_claim_is_exclusive() {
        let pool = WorkerPool::new();
        let (a, _, _ra) = record(&pool);

        assert!(pool.claim_idle().is_some());
        assert!(pool.claim_idle().is_none());
        assert_eq!(pool.is_busy(a), Some(true));

        assert!(pool.release(a));
        assert_eq!(pool.claim_idle().map(|c| c.worker), Some(a));
    }

    #[test]
    fn test_dead_worker_never_selected_and_reaped() {
        let pool = WorkerPool::new();
        let (a, alive_a, _ra) = record(&pool);
        let (b, _, _rb) = record(&pool);

        alive_a.store(false, Ordering::Release);
        assert_eq!(pool.find_idle(), Some(b));
        assert_eq!(pool.live_count(), 1);
        assert_eq!(pool.len(), 2);

        assert_eq!(pool.reap(), vec![(a, false)]);
        assert_eq!(pool.len(), 1);
        assert!(!pool.release(a));
    }

    #[test]
    fn test_reap_reports_busy() {
        let pool = WorkerPool::new();
        let (a, _, _ra) = record(&pool);
        pool.claim_idle().unwrap();
        pool.mark_dead(a);

        assert_eq!(pool.reap(), vec![(a, true)]);
    }

    #[test]
    fn test_clear_disconnects_sessions() {
        let pool = WorkerPool::new();
        let (_, _, rx) = record(&pool);
        assert_eq!(pool.clear(), 1);
        assert!(rx.recv().is_err());
    }
}
