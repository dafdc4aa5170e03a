//! Commit boundary for a single upload worker.
//!
//! The boundary is an atomic state shared by the worker and its queue. Both
//! the grace timer and `cancel()` transition out of `Pending` with a
//! compare-exchange, so exactly one of them wins. The one-slot inbox only
//! wakes the worker early; the gate decides the outcome.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum JobState {
    /// Inside the grace window
    Pending = 0,
    /// Past the commit point; the upload will run
    Committed = 1,
    /// Cancelled inside the grace window; the upload will never run
    Cancelled = 2,
    /// Worker exited
    Finished = 3,
}

impl JobState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => JobState::Pending,
            1 => JobState::Committed,
            2 => JobState::Cancelled,
            _ => JobState::Finished,
        }
    }
}

/// Result of a cancel attempt against one gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelAttempt {
    /// `Pending -> Cancelled` won; the upload will never run
    Cancelled,
    AlreadyCommitted,
    AlreadyCancelled,
    AlreadyFinished,
}

/// Shared commit flag. Clone is cheap and shares state.
#[derive(Debug, Clone)]
pub struct CommitGate {
    state: Arc<AtomicU8>,
}

impl Default for CommitGate {
    fn default() -> Self {
        Self::new()
    }
}

impl CommitGate {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(JobState::Pending as u8)),
        }
    }

    pub fn state(&self) -> JobState {
        JobState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// `Pending -> Committed`. False if a cancel got there first.
    pub fn try_commit(&self) -> bool {
        self.transition(JobState::Pending, JobState::Committed)
    }

    /// `Pending -> Cancelled`. False once committed (or already cancelled).
    pub fn try_cancel(&self) -> bool {
        self.cancel() == CancelAttempt::Cancelled
    }

    /// `Pending -> Cancelled`, reporting the state that blocked it otherwise.
    pub fn cancel(&self) -> CancelAttempt {
        match self.state.compare_exchange(
            JobState::Pending as u8,
            JobState::Cancelled as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => CancelAttempt::Cancelled,
            // A failed exchange never observes Pending; states only move forward
            Err(observed) => match JobState::from_u8(observed) {
                JobState::Committed => CancelAttempt::AlreadyCommitted,
                JobState::Cancelled => CancelAttempt::AlreadyCancelled,
                _ => CancelAttempt::AlreadyFinished,
            },
        }
    }

    pub(crate) fn finish(&self) {
        self.state.store(JobState::Finished as u8, Ordering::SeqCst);
    }

    fn transition(&self, from: JobState, to: JobState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Queue side of the one-slot cancellation inbox.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    tx: mpsc::Sender<()>,
}

impl CancelSignal {
    /// Wake the worker. A full slot already holds a signal, which is enough.
    pub fn send(&self) {
        let _ = self.tx.try_send(());
    }
}

/// Worker side of the one-slot cancellation inbox.
#[derive(Debug)]
pub struct CancelInbox {
    rx: mpsc::Receiver<()>,
}

impl CancelInbox {
    /// Resolves when a signal arrives. If the queue side is dropped without
    /// signalling, this never resolves and the grace timer decides.
    pub async fn signalled(&mut self) {
        if self.rx.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }
}

pub fn cancel_channel() -> (CancelSignal, CancelInbox) {
    let (tx, rx) = mpsc::channel(1);
    (CancelSignal { tx }, CancelInbox { rx })
}
