//! Heartbeat watchdog for the motion controller.
//!
//! The controller publishes status every cycle. Silence longer than the
//! timeout raises an alert, at most `notification_count` times per outage;
//! the next heartbeat re-enables alerts.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use vigil_protocol::config::WatchdogConfig;
use vigil_protocol::defaults::WATCHDOG_NOTICE;
use vigil_protocol::topics::ids;
use vigil_protocol::{Inbox, Topic, TopicNamespace};

use crate::effects::Notifier;
use crate::metrics::{Metrics, METRICS};
use crate::motion::shutdown_requested;

pub struct Watchdog {
    heartbeat: Topic,
    timeout: Duration,
    notification_count: u32,
    remaining: u32,
    notifier: Arc<dyn Notifier>,
}

impl Watchdog {
    pub fn subscriptions(namespace: &TopicNamespace) -> vigil_protocol::Result<Vec<Topic>> {
        Ok(vec![namespace.require(ids::MOTION_STATUS_ALL)?])
    }

    pub fn new(
        namespace: &TopicNamespace,
        config: &WatchdogConfig,
        notifier: Arc<dyn Notifier>,
    ) -> vigil_protocol::Result<Self> {
        Ok(Self {
            heartbeat: namespace.require(ids::MOTION_STATUS_ALL)?,
            timeout: config.timeout(),
            notification_count: config.notification_count,
            remaining: config.notification_count,
            notifier,
        })
    }

    /// Alerts left before the watchdog goes quiet.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn on_heartbeat(&mut self) {
        if self.remaining < self.notification_count {
            info!("Motion heartbeat resumed");
        }
        self.remaining = self.notification_count;
    }

    /// Called after a full timeout with no heartbeat. Returns whether an
    /// alert went out.
    pub fn on_silence(&mut self) -> bool {
        if self.remaining == 0 {
            debug!("Motion heartbeat still missing, alerts exhausted");
            return false;
        }
        self.remaining -= 1;
        Metrics::inc(&METRICS.watchdog_alerts);
        error!("No motion heartbeat for {:?} ({} alerts left)", self.timeout, self.remaining);
        self.notifier.notify(WATCHDOG_NOTICE);
        true
    }

    pub async fn run(mut self, mut inbox: Inbox, mut shutdown: mpsc::Receiver<()>) {
        info!("watchdog running (timeout {:?})", self.timeout);
        loop {
            if shutdown_requested(&mut shutdown) {
                break;
            }
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                message = inbox.recv_timeout(self.timeout) => match message {
                    Some(message) if self.heartbeat.matches(&message.topic) => self.on_heartbeat(),
                    Some(message) => debug!("Ignoring {}", message.topic),
                    None => {
                        self.on_silence();
                    }
                },
            }
        }
        info!("watchdog stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingNotifier;
    use vigil_protocol::Message;

    fn watchdog(count: u32, timeout_secs: u64) -> (Watchdog, RecordingNotifier) {
        let notifier = RecordingNotifier::new();
        let config = WatchdogConfig {
            timeout_secs,
            notification_count: count,
        };
        let watchdog = Watchdog::new(
            &TopicNamespace::standard().unwrap(),
            &config,
            Arc::new(notifier.clone()),
        )
        .unwrap();
        (watchdog, notifier)
    }

    #[test]
    fn test_alert_budget_then_quiet() {
        let (mut dog, notifier) = watchdog(2, 30);
        assert!(dog.on_silence());
        assert!(dog.on_silence());
        assert!(!dog.on_silence());
        assert!(!dog.on_silence());
        assert_eq!(notifier.sent(), vec![WATCHDOG_NOTICE, WATCHDOG_NOTICE]);
    }

    #[test]
    fn test_heartbeat_restores_budget() {
        let (mut dog, notifier) = watchdog(2, 30);
        dog.on_silence();
        dog.on_silence();
        assert_eq!(dog.remaining(), 0);

        dog.on_heartbeat();
        assert_eq!(dog.remaining(), 2);
        assert!(dog.on_silence());
        assert_eq!(notifier.sent().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_alerts_on_silence_only() {
        let (dog, notifier) = watchdog(3, 10);
        let (tx, inbox) = vigil_protocol::inbox();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let task = tokio::spawn(dog.run(inbox, shutdown_rx));

        // Heartbeats every 5s keep it quiet
        for _ in 0..4 {
            tx.deliver(Message::new("motion/status/on/", ""));
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        assert!(notifier.sent().is_empty());

        // 25s after the last heartbeat: two full timeouts elapse
        tokio::time::sleep(Duration::from_secs(20)).await;
        shutdown_tx.send(()).await.unwrap();
        task.await.unwrap();
        assert_eq!(notifier.sent(), vec![WATCHDOG_NOTICE, WATCHDOG_NOTICE]);
    }
}
