//! One scan on the bus drives both the motion controller and the upload
//! orchestrator.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vigil_protocol::testing::RecordingPublisher;
use vigil_protocol::{Message, Topic, TopicNamespace};
use vigil_security::WindowedAuthorizer;
use vigil_sentinel::testing::{FakeControl, ManualClock, RecordingNotifier};
use vigil_sentinel::{
    Clock, FileSyncOrchestrator, FilesyncEvent, FilesyncSettings, MotionController, MotionEffects, MotionSettings,
    Transition,
};
use vigil_worker::{BackendError, TransferBackend, WorkerResult};

const SECRET: &str = "mysecretkey";

#[derive(Default)]
struct RecordingBackend {
    calls: Mutex<Vec<String>>,
}

impl RecordingBackend {
    fn calls(&self) -> Vec<String> {
        let mut calls = self.calls.lock().unwrap().clone();
        calls.sort();
        calls
    }
}

#[async_trait]
impl TransferBackend for RecordingBackend {
    async fn upload(&self, file_id: &str) -> Result<(), BackendError> {
        self.calls.lock().unwrap().push(format!("upload {}", file_id));
        Ok(())
    }

    async fn delete(&self, file_id: &str) -> Result<(), BackendError> {
        self.calls.lock().unwrap().push(format!("delete {}", file_id));
        Ok(())
    }
}

struct Site {
    motion: MotionController,
    filesync: FileSyncOrchestrator,
    clock: ManualClock,
    control: FakeControl,
    notifier: RecordingNotifier,
    backend: Arc<RecordingBackend>,
    publisher: RecordingPublisher,
    authorizer: WindowedAuthorizer,
}

fn site() -> Site {
    let namespace = TopicNamespace::standard().unwrap();
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2016, 1, 1, 0, 0, 0).unwrap());
    let control = FakeControl::new(true);
    let notifier = RecordingNotifier::new();
    let backend = Arc::new(RecordingBackend::default());
    let publisher = RecordingPublisher::new();
    let authorizer = WindowedAuthorizer::new(SECRET, 30).unwrap();

    let motion = MotionController::new(
        &namespace,
        authorizer.clone(),
        MotionSettings {
            scan_timeout: Duration::from_secs(30),
            auth_timeout: Duration::from_secs(600),
            poll_interval: Duration::from_millis(500),
        },
        MotionEffects {
            clock: Arc::new(clock.clone()),
            control: Box::new(control.clone()),
            notifier: Arc::new(notifier.clone()),
            publisher: Arc::new(publisher.clone()),
        },
    )
    .unwrap();

    let filesync = FileSyncOrchestrator::new(
        &namespace,
        authorizer.clone(),
        FilesyncSettings {
            grace: Duration::from_secs(30),
            max_workers: 4,
            reap_interval: Duration::from_millis(250),
        },
        Arc::new(clock.clone()),
        Arc::clone(&backend) as Arc<dyn TransferBackend>,
        Arc::new(publisher.clone()),
    )
    .unwrap();

    Site {
        motion,
        filesync,
        clock,
        control,
        notifier,
        backend,
        publisher,
        authorizer,
    }
}

#[tokio::test(start_paused = true)]
async fn test_authorized_scan_disarms_and_cancels_uploads() {
    let mut site = site();
    for clip in ["clip_1", "clip_2"] {
        let event = site.filesync.handle(&Message::new("motion/filesync/queue/", clip));
        assert!(matches!(event, FilesyncEvent::Queued { .. }));
    }

    let token = site.authorizer.challenge(&site.clock.now());
    let scan = Message::new("nfc/scan/data/", token);

    let report = site.motion.cycle(Some(scan.clone())).await;
    assert!(report.authorized);
    assert_eq!(report.transition, Some(Transition::Disarmed));
    assert!(!site.control.currently_on());

    match site.filesync.handle(&scan) {
        FilesyncEvent::Cancelled(summary) => assert_eq!(summary.cancelled, 2),
        other => panic!("expected a cancel broadcast, got {:?}", other),
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    let outcomes = site.filesync.reap();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.result == WorkerResult::Cancelled));

    assert_eq!(site.backend.calls(), vec!["delete clip_1", "delete clip_2"]);
    assert_eq!(site.notifier.sent(), vec!["MOTION OFF"]);
    assert_eq!(
        site.publisher.payloads_on(&Topic::new("motion/filesync/cancel/")).len(),
        2
    );
    assert!(site.publisher.payloads_on(&Topic::new("motion/filesync/start/")).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stale_token_changes_nothing() {
    let mut site = site();
    site.filesync.handle(&Message::new("motion/filesync/queue/", "clip_1"));

    let stale = site.authorizer.challenge(&(site.clock.now() - chrono::Duration::seconds(120)));
    let scan = Message::new("nfc/scan/data/", stale);

    let report = site.motion.cycle(Some(scan.clone())).await;
    assert!(!report.authorized);
    assert_eq!(report.transition, None);
    assert!(site.control.currently_on());
    assert!(matches!(site.filesync.handle(&scan), FilesyncEvent::Unauthorized));

    // Grace expires and the upload goes ahead
    tokio::time::sleep(Duration::from_secs(31)).await;
    let outcomes = site.filesync.reap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].result, WorkerResult::Uploaded);
    assert_eq!(site.backend.calls(), vec!["upload clip_1"]);
}
