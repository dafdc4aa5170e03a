//! Upload queue
//!
//! Design principles:
//! - `queue()` spawns the worker immediately and never waits on it
//! - Workers tracked with JoinHandles and reaped without blocking
//! - Workers report through a result channel; a finished handle with no
//!   report means the task panicked, and the queue publishes the error
//!   terminal on its behalf
//! - Concurrency is capped; at capacity `queue()` rejects instead of growing

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use vigil_protocol::Publish;

use crate::cancel::{cancel_channel, CancelAttempt, CancelSignal, CommitGate, JobState};
use crate::metrics::{Metrics, METRICS};
use crate::upload::{self, JobId, Notice, UploadJob, WorkerOutcome, WorkerResult};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Upload queue at capacity ({max} workers), rejecting {file_id}")]
    AtCapacity { max: usize, file_id: String },
}

/// Result of a broadcast `cancel()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CancelSummary {
    /// Still inside their grace window; will delete instead of upload
    pub cancelled: usize,
    /// Past the commit point; unaffected
    pub already_committed: usize,
    /// Cancelled by an earlier broadcast
    pub already_cancelled: usize,
    /// Done, waiting to be reaped
    pub already_finished: usize,
}

struct WorkerHandle {
    file_id: String,
    gate: CommitGate,
    signal: CancelSignal,
    error_notice: Notice,
    join_handle: JoinHandle<()>,
}

/// Tracks every spawned upload worker until it is reaped.
pub struct UploadQueue {
    publisher: Arc<dyn Publish>,
    max_workers: usize,
    next_job_id: JobId,
    workers: HashMap<JobId, WorkerHandle>,
    result_tx: mpsc::UnboundedSender<WorkerOutcome>,
    result_rx: mpsc::UnboundedReceiver<WorkerOutcome>,
    /// Reports from workers whose handles have not been reaped yet
    unclaimed: HashMap<JobId, WorkerOutcome>,
}

impl UploadQueue {
    pub fn new(publisher: Arc<dyn Publish>, max_workers: usize) -> Self {
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        Self {
            publisher,
            max_workers: max_workers.max(1),
            next_job_id: 1,
            workers: HashMap::new(),
            result_tx,
            result_rx,
            unclaimed: HashMap::new(),
        }
    }

    /// Spawn a worker for `job`. Must be called from within a tokio runtime.
    pub fn queue(&mut self, job: UploadJob) -> Result<JobId, QueueError> {
        let active = self.active_count();
        if active >= self.max_workers {
            Metrics::inc(&METRICS.uploads_rejected);
            warn!(
                "At max capacity ({} workers), rejecting upload {}",
                self.max_workers, job.file_id
            );
            return Err(QueueError::AtCapacity {
                max: self.max_workers,
                file_id: job.file_id,
            });
        }

        let job_id = self.next_job_id;
        self.next_job_id += 1;

        let gate = CommitGate::new();
        let (signal, inbox) = cancel_channel();
        let file_id = job.file_id.clone();
        let error_notice = job.messages.error.clone();

        info!(
            "QUEUE upload {} -> {} (grace {:?}, {} active)",
            job_id,
            file_id,
            job.grace,
            active + 1
        );

        let join_handle = tokio::spawn(upload::run_worker(
            job_id,
            job,
            gate.clone(),
            inbox,
            Arc::clone(&self.publisher),
            self.result_tx.clone(),
        ));

        self.workers.insert(
            job_id,
            WorkerHandle {
                file_id,
                gate,
                signal,
                error_notice,
                join_handle,
            },
        );
        Metrics::inc(&METRICS.uploads_queued);
        Ok(job_id)
    }

    /// Signal every tracked worker. Workers past their commit point ignore it.
    pub fn cancel(&self) -> CancelSummary {
        let mut summary = CancelSummary::default();
        for (job_id, worker) in &self.workers {
            match worker.gate.cancel() {
                CancelAttempt::Cancelled => {
                    worker.signal.send();
                    summary.cancelled += 1;
                    debug!("Cancel signalled upload {} ({})", job_id, worker.file_id);
                }
                CancelAttempt::AlreadyCommitted => summary.already_committed += 1,
                CancelAttempt::AlreadyCancelled => summary.already_cancelled += 1,
                CancelAttempt::AlreadyFinished => summary.already_finished += 1,
            }
        }
        info!(
            "CANCEL broadcast: {} cancelled, {} committed, {} already cancelled, {} finished",
            summary.cancelled,
            summary.already_committed,
            summary.already_cancelled,
            summary.already_finished
        );
        summary
    }

    /// Cancel a single job. Returns false once it has committed or exited.
    pub fn cancel_job(&self, job_id: JobId) -> bool {
        match self.workers.get(&job_id) {
            Some(worker) if worker.gate.try_cancel() => {
                worker.signal.send();
                true
            }
            _ => false,
        }
    }

    /// Remove finished workers and return their outcomes. Never waits.
    pub fn reap(&mut self) -> Vec<WorkerOutcome> {
        let finished: Vec<JobId> = self
            .workers
            .iter()
            .filter(|(_, worker)| worker.join_handle.is_finished())
            .map(|(job_id, _)| *job_id)
            .collect();

        // A worker reports before its task finishes, so every report for a
        // finished handle is already in the channel.
        while let Ok(outcome) = self.result_rx.try_recv() {
            self.unclaimed.insert(outcome.job_id, outcome);
        }

        let mut outcomes = Vec::with_capacity(finished.len());
        for job_id in finished {
            let Some(worker) = self.workers.remove(&job_id) else {
                continue;
            };
            let outcome = match self.unclaimed.remove(&job_id) {
                Some(outcome) => outcome,
                None => {
                    Metrics::inc(&METRICS.uploads_failed);
                    error!("Upload worker {} ({}) died without reporting", job_id, worker.file_id);
                    upload::publish(self.publisher.as_ref(), &worker.error_notice);
                    WorkerOutcome {
                        job_id,
                        file_id: worker.file_id,
                        result: WorkerResult::Panicked,
                    }
                }
            };
            debug!("Reaped upload worker {}: {:?}", job_id, outcome.result);
            Metrics::inc(&METRICS.workers_reaped);
            outcomes.push(outcome);
        }
        outcomes.sort_by_key(|outcome| outcome.job_id);
        outcomes
    }

    /// Wait for every tracked worker, then reap them all.
    pub async fn join_all(&mut self) -> Vec<WorkerOutcome> {
        info!("Waiting for {} upload workers...", self.workers.len());
        for worker in self.workers.values_mut() {
            // Panics are reported by reap()
            let _ = (&mut worker.join_handle).await;
        }
        self.reap()
    }

    /// Workers still tracked (running or awaiting reap).
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Workers whose task has not exited yet.
    pub fn active_count(&self) -> usize {
        self.workers
            .values()
            .filter(|worker| !worker.join_handle.is_finished())
            .count()
    }

    pub fn state_of(&self, job_id: JobId) -> Option<JobState> {
        self.workers.get(&job_id).map(|worker| worker.gate.state())
    }
}
