//! Controller counters
//!
//! Lock-free atomics, one global instance per process. Upload counters live
//! in `vigil_worker::METRICS` and are folded into the snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics instance
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    // Scan traffic
    pub scans_received: AtomicU64,
    pub authorizations: AtomicU64,
    pub rejected_tokens: AtomicU64,

    // Motion state
    pub motion_armed: AtomicU64,
    pub motion_disarmed: AtomicU64,
    pub control_errors: AtomicU64,

    // File sync
    pub filesync_requests: AtomicU64,
    pub cancel_broadcasts: AtomicU64,

    // Reader health
    pub scanner_failures: AtomicU64,
    pub reboots: AtomicU64,
    pub reboots_suppressed: AtomicU64,

    // Alerts
    pub watchdog_alerts: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            scans_received: AtomicU64::new(0),
            authorizations: AtomicU64::new(0),
            rejected_tokens: AtomicU64::new(0),
            motion_armed: AtomicU64::new(0),
            motion_disarmed: AtomicU64::new(0),
            control_errors: AtomicU64::new(0),
            filesync_requests: AtomicU64::new(0),
            cancel_broadcasts: AtomicU64::new(0),
            scanner_failures: AtomicU64::new(0),
            reboots: AtomicU64::new(0),
            reboots_suppressed: AtomicU64::new(0),
            watchdog_alerts: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let uploads = vigil_worker::METRICS.snapshot();
        MetricsSnapshot {
            scans_received: self.scans_received.load(Ordering::Relaxed),
            authorizations: self.authorizations.load(Ordering::Relaxed),
            rejected_tokens: self.rejected_tokens.load(Ordering::Relaxed),
            motion_armed: self.motion_armed.load(Ordering::Relaxed),
            motion_disarmed: self.motion_disarmed.load(Ordering::Relaxed),
            control_errors: self.control_errors.load(Ordering::Relaxed),
            filesync_requests: self.filesync_requests.load(Ordering::Relaxed),
            cancel_broadcasts: self.cancel_broadcasts.load(Ordering::Relaxed),
            uploads_queued: uploads.uploads_queued,
            uploads_committed: uploads.uploads_committed,
            uploads_cancelled: uploads.uploads_cancelled,
            uploads_failed: uploads.uploads_failed,
            scanner_failures: self.scanner_failures.load(Ordering::Relaxed),
            reboots: self.reboots.load(Ordering::Relaxed),
            reboots_suppressed: self.reboots_suppressed.load(Ordering::Relaxed),
            watchdog_alerts: self.watchdog_alerts.load(Ordering::Relaxed),
        }
    }
}

/// Immutable snapshot of metrics for reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub scans_received: u64,
    pub authorizations: u64,
    pub rejected_tokens: u64,
    pub motion_armed: u64,
    pub motion_disarmed: u64,
    pub control_errors: u64,
    pub filesync_requests: u64,
    pub cancel_broadcasts: u64,
    pub uploads_queued: u64,
    pub uploads_committed: u64,
    pub uploads_cancelled: u64,
    pub uploads_failed: u64,
    pub scanner_failures: u64,
    pub reboots: u64,
    pub reboots_suppressed: u64,
    pub watchdog_alerts: u64,
}

impl MetricsSnapshot {
    /// One-line summary for the shutdown log.
    pub fn summary(&self) -> String {
        format!(
            "scans={} auth={} rejected={} armed={} disarmed={} uploads(q/c/x/f)={}/{}/{}/{} \
             scanner_failures={} reboots={} watchdog_alerts={}",
            self.scans_received,
            self.authorizations,
            self.rejected_tokens,
            self.motion_armed,
            self.motion_disarmed,
            self.uploads_queued,
            self.uploads_committed,
            self.uploads_cancelled,
            self.uploads_failed,
            self.scanner_failures,
            self.reboots,
            self.watchdog_alerts,
        )
    }
}
