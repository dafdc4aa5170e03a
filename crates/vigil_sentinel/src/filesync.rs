//! File sync orchestrator
//!
//! Bridges `motion/filesync/queue/` requests and authorized scans into the
//! upload queue:
//! - a queue request (payload = file id) spawns a worker with the configured
//!   grace window and per-file start/end/cancel/error messages
//! - an authorized scan cancels every upload still inside its grace window
//!
//! Authorization is evaluated here independently of the motion controller.
//! Finished workers are reaped on every loop iteration; the receive wait is
//! bounded by the reap interval so reaping never starves.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use vigil_protocol::config::FilesyncConfig;
use vigil_protocol::topics::ids;
use vigil_protocol::{Inbox, Message, Publish, Topic, TopicNamespace};
use vigil_security::WindowedAuthorizer;
use vigil_worker::{
    CancelSummary, JobId, Notice, QueueError, TransferBackend, UploadJob, UploadMessages,
    UploadQueue, WorkerOutcome,
};

use crate::effects::Clock;
use crate::metrics::{Metrics, METRICS};
use crate::motion::shutdown_requested;
use crate::publish_or_warn;

#[derive(Debug, Clone, Copy)]
pub struct FilesyncSettings {
    pub grace: Duration,
    pub max_workers: usize,
    pub reap_interval: Duration,
}

impl From<&FilesyncConfig> for FilesyncSettings {
    fn from(config: &FilesyncConfig) -> Self {
        Self {
            grace: config.grace(),
            max_workers: config.max_workers,
            reap_interval: config.reap_interval(),
        }
    }
}

/// What handling one message did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilesyncEvent {
    Queued { job_id: JobId, file_id: String },
    Rejected { file_id: String },
    Cancelled(CancelSummary),
    Unauthorized,
    Ignored,
}

struct FilesyncTopics {
    queue: Topic,
    scan_data: Topic,
    start: Topic,
    end: Topic,
    cancel: Topic,
    error: Topic,
}

pub struct FileSyncOrchestrator {
    authorizer: WindowedAuthorizer,
    settings: FilesyncSettings,
    topics: FilesyncTopics,
    clock: Arc<dyn Clock>,
    backend: Arc<dyn TransferBackend>,
    publisher: Arc<dyn Publish>,
    queue: UploadQueue,
}

impl FileSyncOrchestrator {
    pub fn subscriptions(namespace: &TopicNamespace) -> vigil_protocol::Result<Vec<Topic>> {
        Ok(vec![
            namespace.require(ids::FILESYNC_QUEUE)?,
            namespace.require(ids::NFC_SCAN_DATA)?,
        ])
    }

    pub fn new(
        namespace: &TopicNamespace,
        authorizer: WindowedAuthorizer,
        settings: FilesyncSettings,
        clock: Arc<dyn Clock>,
        backend: Arc<dyn TransferBackend>,
        publisher: Arc<dyn Publish>,
    ) -> vigil_protocol::Result<Self> {
        let topics = FilesyncTopics {
            queue: namespace.require(ids::FILESYNC_QUEUE)?,
            scan_data: namespace.require(ids::NFC_SCAN_DATA)?,
            start: namespace.require(ids::FILESYNC_START)?,
            end: namespace.require(ids::FILESYNC_END)?,
            cancel: namespace.require(ids::FILESYNC_CANCEL)?,
            error: namespace.require(ids::FILESYNC_ERROR)?,
        };
        let queue = UploadQueue::new(Arc::clone(&publisher), settings.max_workers);
        Ok(Self {
            authorizer,
            settings,
            topics,
            clock,
            backend,
            publisher,
            queue,
        })
    }

    pub fn queue(&self) -> &UploadQueue {
        &self.queue
    }

    /// Act on one inbound message. Must run inside a tokio runtime.
    pub fn handle(&mut self, message: &Message) -> FilesyncEvent {
        if message.topic == self.topics.queue.as_str() {
            self.enqueue(message.payload.trim())
        } else if message.topic == self.topics.scan_data.as_str() {
            self.on_scan(&message.payload)
        } else {
            debug!("Ignoring {}", message.topic);
            FilesyncEvent::Ignored
        }
    }

    fn enqueue(&mut self, file_id: &str) -> FilesyncEvent {
        if file_id.is_empty() {
            warn!("Ignoring filesync request with empty file id");
            return FilesyncEvent::Ignored;
        }
        Metrics::inc(&METRICS.filesync_requests);
        if !is_plain_file_id(file_id) {
            warn!("Upload of {:?} rejected, not a plain file name", file_id);
            publish_or_warn(self.publisher.as_ref(), &self.topics.error, file_id);
            return FilesyncEvent::Rejected {
                file_id: file_id.to_string(),
            };
        }

        let job = UploadJob {
            file_id: file_id.to_string(),
            grace: self.settings.grace,
            backend: Arc::clone(&self.backend),
            messages: self.messages_for(file_id),
        };
        match self.queue.queue(job) {
            Ok(job_id) => FilesyncEvent::Queued {
                job_id,
                file_id: file_id.to_string(),
            },
            Err(QueueError::AtCapacity { max, file_id }) => {
                warn!("Upload of {} rejected, {} workers busy", file_id, max);
                publish_or_warn(self.publisher.as_ref(), &self.topics.error, &file_id);
                FilesyncEvent::Rejected { file_id }
            }
        }
    }

    fn on_scan(&mut self, payload: &str) -> FilesyncEvent {
        let now = self.clock.now();
        if !self.authorizer.verify(payload, &now) {
            debug!("Scan data did not authorize, uploads untouched");
            return FilesyncEvent::Unauthorized;
        }
        Metrics::inc(&METRICS.cancel_broadcasts);
        info!("Authorized scan, cancelling {} tracked uploads", self.queue.len());
        FilesyncEvent::Cancelled(self.queue.cancel())
    }

    fn messages_for(&self, file_id: &str) -> UploadMessages {
        UploadMessages {
            start: Notice::new(self.topics.start.clone(), file_id),
            end: Notice::new(self.topics.end.clone(), file_id),
            cancel: Notice::new(self.topics.cancel.clone(), file_id),
            error: Notice::new(self.topics.error.clone(), file_id),
        }
    }

    /// Collect finished workers without waiting.
    pub fn reap(&mut self) -> Vec<WorkerOutcome> {
        let outcomes = self.queue.reap();
        for outcome in &outcomes {
            if outcome.result.is_failure() {
                warn!("Upload {} ({}) ended with {:?}", outcome.job_id, outcome.file_id, outcome.result);
            } else {
                debug!("Upload {} ({}) ended with {:?}", outcome.job_id, outcome.file_id, outcome.result);
            }
        }
        outcomes
    }

    /// Serve until shutdown, then wait for every tracked upload. Returns the
    /// outcomes collected by that final join.
    pub async fn run(mut self, mut inbox: Inbox, mut shutdown: mpsc::Receiver<()>) -> Vec<WorkerOutcome> {
        info!(
            "filesync running (grace {:?}, max {} workers)",
            self.settings.grace, self.settings.max_workers
        );
        loop {
            self.reap();
            if shutdown_requested(&mut shutdown) {
                break;
            }

            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                message = inbox.recv_timeout(self.settings.reap_interval) => {
                    if let Some(message) = message {
                        self.handle(&message);
                    }
                }
            }
        }

        info!("filesync shutting down, waiting for {} uploads", self.queue.len());
        self.queue.join_all().await
    }
}

/// File ids land in `{file}` command arguments, so they must name a single
/// entry in the recordings directory and never parse as an option.
fn is_plain_file_id(file_id: &str) -> bool {
    !file_id.starts_with('-')
        && !file_id.contains("..")
        && !file_id.contains(|c: char| c == '/' || c == '\\' || c == '\0')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ManualClock;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;
    use vigil_protocol::testing::RecordingPublisher;
    use vigil_worker::{BackendError, WorkerResult};

    const SECRET: &str = "mysecretkey";

    #[derive(Default)]
    struct FakeBackend {
        calls: Mutex<Vec<String>>,
    }

    impl FakeBackend {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TransferBackend for FakeBackend {
        async fn upload(&self, file_id: &str) -> Result<(), BackendError> {
            tokio::time::sleep(Duration::from_secs(1)).await;
            self.calls.lock().unwrap().push(format!("upload {}", file_id));
            Ok(())
        }

        async fn delete(&self, file_id: &str) -> Result<(), BackendError> {
            self.calls.lock().unwrap().push(format!("delete {}", file_id));
            Ok(())
        }
    }

    struct Harness {
        orchestrator: FileSyncOrchestrator,
        clock: ManualClock,
        backend: Arc<FakeBackend>,
        publisher: RecordingPublisher,
        authorizer: WindowedAuthorizer,
    }

    fn harness(grace_secs: u64, max_workers: usize) -> Harness {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2016, 1, 1, 0, 0, 0).unwrap());
        let backend = Arc::new(FakeBackend::default());
        let publisher = RecordingPublisher::new();
        let authorizer = WindowedAuthorizer::new(SECRET, 30).unwrap();
        let orchestrator = FileSyncOrchestrator::new(
            &TopicNamespace::standard().unwrap(),
            authorizer.clone(),
            FilesyncSettings {
                grace: Duration::from_secs(grace_secs),
                max_workers,
                reap_interval: Duration::from_millis(250),
            },
            Arc::new(clock.clone()),
            backend.clone(),
            Arc::new(publisher.clone()),
        )
        .unwrap();
        Harness {
            orchestrator,
            clock,
            backend,
            publisher,
            authorizer,
        }
    }

    fn request(file_id: &str) -> Message {
        Message::new("motion/filesync/queue/", file_id)
    }

    impl Harness {
        fn scan(&self) -> Message {
            Message::new("nfc/scan/data/", self.authorizer.challenge(&self.clock.now()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_uploads_after_grace() {
        let mut h = harness(3, 4);
        let event = h.orchestrator.handle(&request(" cam1-0001.mkv\n"));
        assert_eq!(
            event,
            FilesyncEvent::Queued {
                job_id: 1,
                file_id: "cam1-0001.mkv".to_string()
            }
        );

        tokio::time::sleep(Duration::from_secs(5)).await;
        let outcomes = h.orchestrator.reap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].result, WorkerResult::Uploaded);
        assert_eq!(
            h.publisher.published(),
            vec![
                ("motion/filesync/start/".to_string(), "cam1-0001.mkv".to_string()),
                ("motion/filesync/end/".to_string(), "cam1-0001.mkv".to_string()),
            ]
        );
        assert!(h.orchestrator.queue().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_authorized_scan_cancels_pending_upload() {
        let mut h = harness(30, 4);
        h.orchestrator.handle(&request("cam1-0002.mkv"));
        tokio::time::sleep(Duration::from_secs(2)).await;

        let event = h.orchestrator.handle(&h.scan());
        assert_eq!(
            event,
            FilesyncEvent::Cancelled(CancelSummary {
                cancelled: 1,
                ..Default::default()
            })
        );

        let outcomes = h.orchestrator.queue.join_all().await;
        assert_eq!(outcomes[0].result, WorkerResult::Cancelled);
        assert_eq!(h.backend.calls(), vec!["delete cam1-0002.mkv"]);
        assert_eq!(h.publisher.payloads_on(&Topic::new("motion/filesync/cancel/")), vec!["cam1-0002.mkv"]);
        assert!(h.publisher.payloads_on(&Topic::new("motion/filesync/start/")).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthorized_scan_leaves_uploads() {
        let mut h = harness(2, 4);
        h.orchestrator.handle(&request("cam1-0003.mkv"));
        let event = h.orchestrator.handle(&Message::new("nfc/scan/data/", "not-a-token"));
        assert_eq!(event, FilesyncEvent::Unauthorized);

        h.orchestrator.queue.join_all().await;
        assert_eq!(h.backend.calls(), vec!["upload cam1-0003.mkv"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_request_and_foreign_topic_ignored() {
        let mut h = harness(2, 4);
        assert_eq!(h.orchestrator.handle(&request("   ")), FilesyncEvent::Ignored);
        assert_eq!(
            h.orchestrator.handle(&Message::new("motion/detected/", "x")),
            FilesyncEvent::Ignored
        );
        assert!(h.orchestrator.queue().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_request_publishes_error() {
        let mut h = harness(10, 1);
        h.orchestrator.handle(&request("a.mkv"));
        let event = h.orchestrator.handle(&request("b.mkv"));
        assert_eq!(
            event,
            FilesyncEvent::Rejected {
                file_id: "b.mkv".to_string()
            }
        );
        assert_eq!(h.publisher.payloads_on(&Topic::new("motion/filesync/error/")), vec!["b.mkv"]);
        h.orchestrator.queue.cancel();
        h.orchestrator.queue.join_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_path_like_file_ids_never_reach_backend() {
        let mut h = harness(1, 4);
        for file_id in ["../../etc/shadow", "clips/a.mkv", "-rf", "a\0b", "..", "c:\\x"] {
            assert_eq!(
                h.orchestrator.handle(&request(file_id)),
                FilesyncEvent::Rejected {
                    file_id: file_id.to_string()
                }
            );
        }
        assert!(h.orchestrator.queue().is_empty());
        assert_eq!(
            h.publisher.payloads_on(&Topic::new("motion/filesync/error/")),
            vec!["../../etc/shadow", "clips/a.mkv", "-rf", "a\0b", "..", "c:\\x"]
        );

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(h.orchestrator.reap().is_empty());
        assert!(h.backend.calls().is_empty());
    }

    #[test]
    fn test_plain_file_ids_accepted() {
        assert!(is_plain_file_id("cam1-0001.mkv"));
        assert!(is_plain_file_id("2016.01.01_12.00.mkv"));
        assert!(!is_plain_file_id("a..b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_reaps_and_joins_on_shutdown() {
        let h = harness(1, 4);
        let (tx, inbox) = vigil_protocol::inbox();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let publisher = h.publisher.clone();
        let task = tokio::spawn(h.orchestrator.run(inbox, shutdown_rx));

        tx.deliver(request("early.mkv"));
        tokio::time::sleep(Duration::from_secs(3)).await;
        tx.deliver(request("late.mkv"));
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(()).await.unwrap();

        let outcomes = task.await.unwrap();
        // early.mkv was reaped by the loop; only late.mkv is left for the join
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].file_id, "late.mkv");
        assert_eq!(outcomes[0].result, WorkerResult::Uploaded);
        assert_eq!(
            publisher.payloads_on(&Topic::new("motion/filesync/end/")),
            vec!["early.mkv", "late.mkv"]
        );
    }
}
