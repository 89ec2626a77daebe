//! Process-unique identifiers for tasks and workers.
//!
//! A [`CorrelationId`] is the sole key tying a task envelope to the result
//! envelope that answers it. Ids are 128 bits: a random 64-bit seed drawn
//! once per process, followed by a 64-bit counter. Two ids minted by the
//! same process can never collide; ids minted by different processes
//! collide only if their seeds do.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

static PROCESS_SEED: Lazy<u64> = Lazy::new(|| rand::random());

static TASK_COUNTER: AtomicU64 = AtomicU64::new(1);

static WORKER_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Correlation identifier of one submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Mint a fresh id.
    #[must_use]
    pub fn next() -> Self {
        let seq = TASK_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(Uuid::from_u64_pair(*PROCESS_SEED, seq))
    }

    /// Wrap an existing UUID (e.g. one received from a peer).
    #[inline]
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    #[inline]
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Identity assigned to an accepted worker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u64);

impl WorkerId {
    /// Mint a fresh worker identity.
    #[must_use]
    pub fn next() -> Self {
        Self(WORKER_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_correlation_ids_unique() {
        let ids: HashSet<_> = (0..10_000).map(|_| CorrelationId::next()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn test_correlation_ids_unique_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| (0..1_000).map(|_| CorrelationId::next()).collect::<Vec<_>>()))
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(all.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(all.len(), 4_000);
    }

    #[test]
    fn test_correlation_id_display_is_hyphenated_uuid() {
        let id = CorrelationId::next();
        assert_eq!(id.to_string().len(), 36);
        assert_eq!(CorrelationId::from_uuid(*id.as_uuid()), id);
    }

    #[test]
    fn test_worker_id_display() {
        let a = WorkerId::next();
        let b = WorkerId::next();
        assert!(b.get() > a.get());
        assert_eq!(a.to_string(), format!("worker-{}", a.get()));
    }
}
