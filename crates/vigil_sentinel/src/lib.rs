//! Vigil sentinel library
//!
//! The long-running roles: token scan reporting, motion arming, upload
//! orchestration, status LED aggregation and the motion heartbeat watchdog.

pub mod effects;
pub mod filesync;
pub mod metrics;
pub mod motion;
pub mod scanner;
pub mod status;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod watchdog;

pub use effects::{
    Blinker, Clock, CommandBlinker, CommandMotionControl, CommandNotifier, CommandReboot,
    CommandTokenReader, EffectError, LogNotifier, MotionControl, Notifier, RebootAction,
    SystemClock, TokenReader,
};
pub use filesync::{FileSyncOrchestrator, FilesyncEvent, FilesyncSettings};
pub use metrics::{MetricsSnapshot, METRICS};
pub use motion::{CycleReport, MotionController, MotionEffects, MotionSettings, MotionState, Transition};
pub use scanner::{ScanOutcome, ScanReporter, ScannerEffects, ScannerSettings};
pub use status::StatusAggregator;
pub use watchdog::Watchdog;

use tracing::warn;
use vigil_protocol::{Publish, Topic};

/// Publish and log on failure. Controllers keep running when the bus is
/// gone; the watchdog notices the silence.
pub(crate) fn publish_or_warn(publisher: &dyn Publish, topic: &Topic, payload: &str) {
    if let Err(e) = publisher.publish(topic, payload) {
        warn!("Publish to {} failed: {}", topic, e);
    }
}
