//! Token scan reporter.
//!
//! Polls the reader, publishes a heartbeat on `nfc/scan/` every attempt and
//! the token on `nfc/scan/data/` when one is presented. Consecutive read
//! failures past the threshold reboot the reader host, no more often than
//! `min_reboot_interval`.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use vigil_protocol::config::NfcConfig;
use vigil_protocol::topics::ids;
use vigil_protocol::{Publish, Topic, TopicNamespace};

use crate::effects::{elapsed_since, Clock, RebootAction, TokenReader};
use crate::metrics::{Metrics, METRICS};
use crate::motion::shutdown_requested;
use crate::publish_or_warn;

#[derive(Debug, Clone, Copy)]
pub struct ScannerSettings {
    pub poll: Duration,
    pub failure_threshold: u32,
    pub min_reboot_interval: Duration,
}

impl From<&NfcConfig> for ScannerSettings {
    fn from(config: &NfcConfig) -> Self {
        Self {
            poll: config.scan_poll(),
            failure_threshold: config.failure_threshold,
            min_reboot_interval: config.min_reboot_interval(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Token,
    NoToken,
    Failed { consecutive: u32 },
    Rebooted,
    RebootSuppressed,
}

/// Collaborators the reporter acts through.
pub struct ScannerEffects {
    pub clock: Arc<dyn Clock>,
    pub reader: Arc<dyn TokenReader>,
    pub reboot: Arc<dyn RebootAction>,
    pub publisher: Arc<dyn Publish>,
}

struct ScannerTopics {
    heartbeat: Topic,
    data: Topic,
    fault: Topic,
    info: Topic,
}

pub struct ScanReporter {
    settings: ScannerSettings,
    topics: ScannerTopics,
    effects: ScannerEffects,
    consecutive_failures: u32,
    last_reboot: Option<DateTime<Utc>>,
}

impl ScanReporter {
    pub fn new(
        namespace: &TopicNamespace,
        settings: ScannerSettings,
        effects: ScannerEffects,
    ) -> vigil_protocol::Result<Self> {
        Ok(Self {
            settings,
            topics: ScannerTopics {
                heartbeat: namespace.require(ids::NFC_SCAN)?,
                data: namespace.require(ids::NFC_SCAN_DATA)?,
                fault: namespace.require(ids::NFC_SCAN_FAULT)?,
                info: namespace.require(ids::INFO)?,
            },
            effects,
            consecutive_failures: 0,
            last_reboot: None,
        })
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// One read attempt.
    pub async fn scan_once(&mut self) -> ScanOutcome {
        let publisher = self.effects.publisher.as_ref();
        publish_or_warn(publisher, &self.topics.heartbeat, "");

        match self.effects.reader.read().await {
            Ok(Some(token)) => {
                self.consecutive_failures = 0;
                debug!("Token read");
                publish_or_warn(publisher, &self.topics.data, &token);
                ScanOutcome::Token
            }
            Ok(None) => {
                self.consecutive_failures = 0;
                ScanOutcome::NoToken
            }
            Err(e) => {
                self.consecutive_failures += 1;
                Metrics::inc(&METRICS.scanner_failures);
                warn!("Token read failed ({} in a row): {}", self.consecutive_failures, e);
                if self.consecutive_failures >= self.settings.failure_threshold {
                    self.recover().await
                } else {
                    ScanOutcome::Failed {
                        consecutive: self.consecutive_failures,
                    }
                }
            }
        }
    }

    /// Reboot unless the previous reboot was under `min_reboot_interval` ago.
    /// The last reboot time lives only in this reporter, so the limit holds
    /// within one process lifetime; a restarted reporter reboots on its first
    /// threshold crossing.
    async fn recover(&mut self) -> ScanOutcome {
        let now = self.effects.clock.now();
        let failures = self.consecutive_failures;
        let publisher = self.effects.publisher.as_ref();

        if let Some(last) = self.last_reboot {
            let since = elapsed_since(now, last);
            if since < self.settings.min_reboot_interval {
                Metrics::inc(&METRICS.reboots_suppressed);
                let detail = format!(
                    "reboot suppressed: {} consecutive read failures, last reboot {}s ago",
                    failures,
                    since.as_secs()
                );
                warn!("{}", detail);
                publish_or_warn(publisher, &self.topics.fault, &detail);
                return ScanOutcome::RebootSuppressed;
            }
        }

        Metrics::inc(&METRICS.reboots);
        let detail = format!("reboot: {} consecutive read failures", failures);
        error!("{}", detail);
        publish_or_warn(publisher, &self.topics.fault, &detail);
        publish_or_warn(publisher, &self.topics.info, &detail);
        self.last_reboot = Some(now);
        self.consecutive_failures = 0;

        if let Err(e) = self.effects.reboot.reboot().await {
            error!("Reboot command failed: {}", e);
        }
        ScanOutcome::Rebooted
    }

    pub async fn run(mut self, mut shutdown: mpsc::Receiver<()>) {
        info!(
            "nfc-scan running (every {:?}, reboot after {} failures)",
            self.settings.poll, self.settings.failure_threshold
        );
        loop {
            if shutdown_requested(&mut shutdown) {
                break;
            }
            self.scan_once().await;
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(self.settings.poll) => {}
            }
        }
        info!("nfc-scan stopped");
    }
}
