//! Motion controller
//!
//! Arms and disarms the motion detector from scan traffic. Each cycle:
//! 1. Take at most one pending message. Anything under `nfc/scan/#`
//!    refreshes scanner liveness; a valid token on `nfc/scan/data/` records
//!    an authorization and disarms.
//! 2. Re-arm if the scanner went quiet or the last authorization is stale.
//! 3. Query the detector and publish what it reports.
//!
//! Step 1 runs before step 2, so a fresh authorization always wins a
//! same-cycle timeout.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use vigil_protocol::config::MotionctlConfig;
use vigil_protocol::defaults::{AUTHORIZED_SCAN_INFO, MOTION_OFF_NOTICE, MOTION_ON_NOTICE};
use vigil_protocol::topics::ids;
use vigil_protocol::{Inbox, Message, Publish, Topic, TopicNamespace};
use vigil_security::WindowedAuthorizer;

use crate::effects::{elapsed_since, Clock, MotionControl, Notifier};
use crate::metrics::{Metrics, METRICS};
use crate::publish_or_warn;

/// Detector state as reported by the control seam.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionState {
    /// Armed: detection running
    On,
    /// Disarmed
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Armed,
    Disarmed,
}

/// What one cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub authorized: bool,
    pub transition: Option<Transition>,
    /// `None` when the detector could not be queried
    pub status: Option<MotionState>,
}

#[derive(Debug, Clone, Copy)]
pub struct MotionSettings {
    pub scan_timeout: Duration,
    pub auth_timeout: Duration,
    pub poll_interval: Duration,
}

impl From<&MotionctlConfig> for MotionSettings {
    fn from(config: &MotionctlConfig) -> Self {
        Self {
            scan_timeout: config.scan_timeout(),
            auth_timeout: config.auth_timeout(),
            poll_interval: config.poll_interval(),
        }
    }
}

/// Collaborators the controller acts through.
pub struct MotionEffects {
    pub clock: Arc<dyn Clock>,
    pub control: Box<dyn MotionControl>,
    pub notifier: Arc<dyn Notifier>,
    pub publisher: Arc<dyn Publish>,
}

struct MotionTopics {
    scan_all: Topic,
    scan_data: Topic,
    info: Topic,
    status_on: Topic,
    status_off: Topic,
}

pub struct MotionController {
    authorizer: WindowedAuthorizer,
    settings: MotionSettings,
    topics: MotionTopics,
    effects: MotionEffects,
    last_scan: DateTime<Utc>,
    last_auth: Option<DateTime<Utc>>,
}

impl MotionController {
    /// Topics the controller's inbox must be subscribed to.
    pub fn subscriptions(namespace: &TopicNamespace) -> vigil_protocol::Result<Vec<Topic>> {
        Ok(vec![namespace.require(ids::NFC_SCAN_ALL)?])
    }

    pub fn new(
        namespace: &TopicNamespace,
        authorizer: WindowedAuthorizer,
        settings: MotionSettings,
        effects: MotionEffects,
    ) -> vigil_protocol::Result<Self> {
        let topics = MotionTopics {
            scan_all: namespace.require(ids::NFC_SCAN_ALL)?,
            scan_data: namespace.require(ids::NFC_SCAN_DATA)?,
            info: namespace.require(ids::INFO)?,
            status_on: namespace.require(ids::MOTION_STATUS_ON)?,
            status_off: namespace.require(ids::MOTION_STATUS_OFF)?,
        };
        let last_scan = effects.clock.now();
        Ok(Self {
            authorizer,
            settings,
            topics,
            effects,
            last_scan,
            last_auth: None,
        })
    }

    pub fn last_scan(&self) -> DateTime<Utc> {
        self.last_scan
    }

    pub fn last_auth(&self) -> Option<DateTime<Utc>> {
        self.last_auth
    }

    /// Run one decision cycle against an optional inbound message.
    pub async fn cycle(&mut self, message: Option<Message>) -> CycleReport {
        let now = self.effects.clock.now();
        let mut report = CycleReport::default();

        if let Some(message) = message {
            self.observe(&message, now, &mut report).await;
        }

        if self.is_stale(now) {
            match self.effects.control.is_on().await {
                Ok(false) => {
                    debug!("Scan/auth timeout exceeded and motion off, turning on");
                    match self.effects.control.turn_on().await {
                        Ok(()) => {
                            Metrics::inc(&METRICS.motion_armed);
                            info!("MOTION ON");
                            self.effects.notifier.notify(MOTION_ON_NOTICE);
                            report.transition = Some(Transition::Armed);
                        }
                        Err(e) => self.control_failed("turn on", &e),
                    }
                }
                Ok(true) => {}
                Err(e) => self.control_failed("query", &e),
            }
        }

        match self.effects.control.is_on().await {
            Ok(on) => {
                let (state, topic) = if on {
                    (MotionState::On, &self.topics.status_on)
                } else {
                    (MotionState::Off, &self.topics.status_off)
                };
                publish_or_warn(self.effects.publisher.as_ref(), topic, "");
                report.status = Some(state);
            }
            Err(e) => self.control_failed("query", &e),
        }

        report
    }

    async fn observe(&mut self, message: &Message, now: DateTime<Utc>, report: &mut CycleReport) {
        if !self.topics.scan_all.matches(&message.topic) {
            debug!("Ignoring {}", message.topic);
            return;
        }
        Metrics::inc(&METRICS.scans_received);
        self.last_scan = now;

        if message.topic != self.topics.scan_data.as_str() {
            return;
        }

        let Some(skew) = self.authorizer.verify_detailed(&message.payload, &now) else {
            Metrics::inc(&METRICS.rejected_tokens);
            warn!("Scan data did not authorize");
            return;
        };

        Metrics::inc(&METRICS.authorizations);
        info!("Authorized scan (clock skew {}s)", skew);
        publish_or_warn(self.effects.publisher.as_ref(), &self.topics.info, AUTHORIZED_SCAN_INFO);
        self.last_auth = Some(now);
        report.authorized = true;

        match self.effects.control.is_on().await {
            Ok(true) => match self.effects.control.turn_off().await {
                Ok(()) => {
                    Metrics::inc(&METRICS.motion_disarmed);
                    info!("MOTION OFF");
                    self.effects.notifier.notify(MOTION_OFF_NOTICE);
                    report.transition = Some(Transition::Disarmed);
                }
                Err(e) => self.control_failed("turn off", &e),
            },
            Ok(false) => {}
            Err(e) => self.control_failed("query", &e),
        }
    }

    fn is_stale(&self, now: DateTime<Utc>) -> bool {
        let scan_quiet = elapsed_since(now, self.last_scan) > self.settings.scan_timeout;
        let auth_stale = self
            .last_auth
            .map_or(true, |at| elapsed_since(now, at) > self.settings.auth_timeout);
        scan_quiet || auth_stale
    }

    fn control_failed(&self, action: &str, err: &crate::effects::EffectError) {
        Metrics::inc(&METRICS.control_errors);
        error!("Motion control {} failed: {}", action, err);
    }

    /// Poll until shutdown. Sleeps `poll_interval` only when the inbox is
    /// empty, so bursts drain back to back.
    pub async fn run(mut self, mut inbox: Inbox, mut shutdown: mpsc::Receiver<()>) {
        info!(
            "motionctl running (scan timeout {:?}, auth timeout {:?})",
            self.settings.scan_timeout, self.settings.auth_timeout
        );
        loop {
            if shutdown_requested(&mut shutdown) {
                break;
            }

            let message = inbox.try_recv();
            if message.is_none() {
                debug!("motionctl queue is empty");
            }
            self.cycle(message).await;

            if inbox.is_empty() {
                tokio::select! {
                    biased;
                    _ = shutdown.recv() => break,
                    _ = tokio::time::sleep(self.settings.poll_interval) => {}
                }
            }
        }
        info!("motionctl stopped");
    }
}

/// A received signal or a dropped sender both mean stop.
pub(crate) fn shutdown_requested(shutdown: &mut mpsc::Receiver<()>) -> bool {
    !matches!(shutdown.try_recv(), Err(mpsc::error::TryRecvError::Empty))
}
