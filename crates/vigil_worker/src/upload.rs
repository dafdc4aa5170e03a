//! A single upload worker.
//!
//! Lifecycle:
//! 1. Race the cancellation inbox against the grace window.
//! 2. Cancelled: delete the file, publish `cancel` (then `error` if the
//!    delete failed). The upload never runs.
//! 3. Grace elapsed and the gate commits: publish `start`, upload to
//!    completion, publish `end` (or `error` if the upload failed).
//!
//! Every path ends with exactly one terminal publish for the file
//! (`end`, `cancel`, or `error`), plus `error` after `cancel` on a failed
//! delete.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use vigil_protocol::{Publish, Topic};

use crate::backend::TransferBackend;
use crate::cancel::{CancelInbox, CommitGate};
use crate::metrics::{Metrics, METRICS};

pub type JobId = u64;

/// A topic + payload pair published at a lifecycle point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub topic: Topic,
    pub payload: String,
}

impl Notice {
    pub fn new(topic: Topic, payload: impl Into<String>) -> Self {
        Self {
            topic,
            payload: payload.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadMessages {
    pub start: Notice,
    pub end: Notice,
    pub cancel: Notice,
    pub error: Notice,
}

/// Everything one worker needs. Owned by the queue until the worker is
/// spawned, then moved into it.
#[derive(Clone)]
pub struct UploadJob {
    pub file_id: String,
    pub grace: Duration,
    pub backend: Arc<dyn TransferBackend>,
    pub messages: UploadMessages,
}

impl std::fmt::Debug for UploadJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadJob")
            .field("file_id", &self.file_id)
            .field("grace", &self.grace)
            .field("messages", &self.messages)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerResult {
    Uploaded,
    Cancelled,
    UploadFailed(String),
    DeleteFailed(String),
    /// The task died without reporting; detected at reap time
    Panicked,
}

impl WorkerResult {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            WorkerResult::UploadFailed(_) | WorkerResult::DeleteFailed(_) | WorkerResult::Panicked
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerOutcome {
    pub job_id: JobId,
    pub file_id: String,
    pub result: WorkerResult,
}

pub(crate) async fn run_worker(
    job_id: JobId,
    job: UploadJob,
    gate: CommitGate,
    mut inbox: CancelInbox,
    publisher: Arc<dyn Publish>,
    results: mpsc::UnboundedSender<WorkerOutcome>,
) {
    debug!("Upload worker {} ({}) alive, grace {:?}", job_id, job.file_id, job.grace);

    let committed = tokio::select! {
        biased;
        _ = inbox.signalled() => false,
        _ = tokio::time::sleep(job.grace) => gate.try_commit(),
    };

    let result = if committed {
        upload(job_id, &job, publisher.as_ref()).await
    } else {
        discard(job_id, &job, publisher.as_ref()).await
    };

    gate.finish();
    debug!("Upload worker {} ({}) exiting: {:?}", job_id, job.file_id, result);

    // Closed only when the queue itself is gone.
    let _ = results.send(WorkerOutcome {
        job_id,
        file_id: job.file_id.clone(),
        result,
    });
}

async fn upload(job_id: JobId, job: &UploadJob, publisher: &dyn Publish) -> WorkerResult {
    Metrics::inc(&METRICS.uploads_committed);
    info!("Upload {} committed: {}", job_id, job.file_id);
    publish(publisher, &job.messages.start);

    match job.backend.upload(&job.file_id).await {
        Ok(()) => {
            Metrics::inc(&METRICS.uploads_completed);
            info!("Upload {} finished: {}", job_id, job.file_id);
            publish(publisher, &job.messages.end);
            WorkerResult::Uploaded
        }
        Err(e) => {
            Metrics::inc(&METRICS.uploads_failed);
            error!("Upload {} failed for {}: {}", job_id, job.file_id, e);
            publish(publisher, &job.messages.error);
            WorkerResult::UploadFailed(e.to_string())
        }
    }
}

async fn discard(job_id: JobId, job: &UploadJob, publisher: &dyn Publish) -> WorkerResult {
    Metrics::inc(&METRICS.uploads_cancelled);
    info!("Upload {} cancelled inside grace window: {}", job_id, job.file_id);

    let deleted = job.backend.delete(&job.file_id).await;
    publish(publisher, &job.messages.cancel);

    match deleted {
        Ok(()) => WorkerResult::Cancelled,
        Err(e) => {
            Metrics::inc(&METRICS.uploads_failed);
            error!("Delete {} failed for {}: {}", job_id, job.file_id, e);
            publish(publisher, &job.messages.error);
            WorkerResult::DeleteFailed(e.to_string())
        }
    }
}

pub(crate) fn publish(publisher: &dyn Publish, notice: &Notice) {
    if let Err(e) = publisher.publish(&notice.topic, &notice.payload) {
        warn!("Failed to publish {} {}: {}", notice.topic, notice.payload, e);
    }
}
