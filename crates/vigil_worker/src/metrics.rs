//! Upload worker counters.
//!
//! Lock-free atomics; one global instance per process.

use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    pub uploads_queued: AtomicU64,
    pub uploads_rejected: AtomicU64,
    pub uploads_committed: AtomicU64,
    pub uploads_completed: AtomicU64,
    pub uploads_cancelled: AtomicU64,
    pub uploads_failed: AtomicU64,
    pub workers_reaped: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            uploads_queued: AtomicU64::new(0),
            uploads_rejected: AtomicU64::new(0),
            uploads_committed: AtomicU64::new(0),
            uploads_completed: AtomicU64::new(0),
            uploads_cancelled: AtomicU64::new(0),
            uploads_failed: AtomicU64::new(0),
            workers_reaped: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uploads_queued: self.uploads_queued.load(Ordering::Relaxed),
            uploads_rejected: self.uploads_rejected.load(Ordering::Relaxed),
            uploads_committed: self.uploads_committed.load(Ordering::Relaxed),
            uploads_completed: self.uploads_completed.load(Ordering::Relaxed),
            uploads_cancelled: self.uploads_cancelled.load(Ordering::Relaxed),
            uploads_failed: self.uploads_failed.load(Ordering::Relaxed),
            workers_reaped: self.workers_reaped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub uploads_queued: u64,
    pub uploads_rejected: u64,
    pub uploads_committed: u64,
    pub uploads_completed: u64,
    pub uploads_cancelled: u64,
    pub uploads_failed: u64,
    pub workers_reaped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_counters() {
        let metrics = Metrics::new();
        Metrics::inc(&metrics.uploads_queued);
        Metrics::inc(&metrics.uploads_queued);
        Metrics::inc(&metrics.uploads_cancelled);
        let snap = metrics.snapshot();
        assert_eq!(snap.uploads_queued, 2);
        assert_eq!(snap.uploads_cancelled, 1);
        assert_eq!(snap.uploads_failed, 0);
    }
}
