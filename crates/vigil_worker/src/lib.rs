//! Vigil upload workers
//!
//! One tokio task per queued file. Each task waits out a grace window during
//! which the upload can still be cancelled, then commits and runs the upload
//! to completion.

pub mod backend;
pub mod cancel;
pub mod command;
pub mod metrics;
pub mod queue;
pub mod upload;

pub use backend::{BackendError, CommandBackend, TransferBackend};
pub use cancel::{CancelAttempt, CommitGate, JobState};
pub use command::{CommandError, CommandOutput, CommandTemplate};
pub use metrics::METRICS;
pub use queue::{CancelSummary, QueueError, UploadQueue};
pub use upload::{JobId, Notice, UploadJob, UploadMessages, WorkerOutcome, WorkerResult};
