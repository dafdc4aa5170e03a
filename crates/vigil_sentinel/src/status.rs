//! Status LED aggregator
//!
//! Remembers when each topic of interest was last seen and turns that into
//! a blink pattern once per cycle. The "motion on" color alone only blinks
//! a few times in a row so an armed, quiet system goes dark.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use vigil_protocol::config::BlinkConfig;
use vigil_protocol::topics::ids;
use vigil_protocol::{Inbox, Message, Topic, TopicNamespace};

use crate::effects::{elapsed_since, Blinker, Clock};
use crate::motion::shutdown_requested;

pub struct StatusAggregator {
    /// Topics of interest in display order, with their color
    watched: Vec<(Topic, String)>,
    status_all: Topic,
    last_seen: HashMap<Topic, DateTime<Utc>>,
    last_status: Option<DateTime<Utc>>,
    on_color: String,
    unknown_color: String,
    recent_window: Duration,
    unknown_timeout: Duration,
    on_blink_count: u32,
    on_blinks_left: u32,
}

impl StatusAggregator {
    pub fn subscriptions(namespace: &TopicNamespace) -> vigil_protocol::Result<Vec<Topic>> {
        Ok(vec![namespace.require(ids::MOTION_ALL)?])
    }

    pub fn new(namespace: &TopicNamespace, config: &BlinkConfig) -> vigil_protocol::Result<Self> {
        let watched = [
            (ids::MOTION_STATUS_ON, &config.motion_on_color),
            (ids::MOTION_STATUS_OFF, &config.motion_off_color),
            (ids::MOTION_DETECTED, &config.motion_detected_color),
            (ids::FILESYNC_START, &config.motion_filesync_color),
            (ids::FILESYNC_END, &config.motion_filesync_color),
            (ids::FILESYNC_ERROR, &config.motion_error_color),
        ]
        .into_iter()
        .map(|(id, color)| Ok((namespace.require(id)?, color.clone())))
        .collect::<vigil_protocol::Result<Vec<_>>>()?;

        Ok(Self {
            watched,
            status_all: namespace.require(ids::MOTION_STATUS_ALL)?,
            last_seen: HashMap::new(),
            last_status: None,
            on_color: config.motion_on_color.clone(),
            unknown_color: config.motion_unknown_color.clone(),
            recent_window: config.recent_window(),
            unknown_timeout: config.unknown_timeout(),
            on_blink_count: config.motion_on_blink_count,
            on_blinks_left: config.motion_on_blink_count,
        })
    }

    pub fn observe(&mut self, message: &Message, now: DateTime<Utc>) {
        if self.status_all.matches(&message.topic) {
            self.last_status = Some(now);
        }
        if let Some((topic, _)) = self.watched.iter().find(|(t, _)| t.as_str() == message.topic) {
            self.last_seen.insert(topic.clone(), now);
        }
    }

    /// Colors for every topic seen within the recent window, in display
    /// order, or the unknown color when motion status has gone quiet.
    pub fn pattern(&self, now: DateTime<Utc>) -> Vec<String> {
        let status_fresh = self
            .last_status
            .is_some_and(|at| elapsed_since(now, at) <= self.unknown_timeout);
        if !status_fresh {
            return vec![self.unknown_color.clone()];
        }

        let mut colors: Vec<String> = Vec::new();
        for (topic, color) in &self.watched {
            let recent = self
                .last_seen
                .get(topic)
                .is_some_and(|at| elapsed_since(now, *at) <= self.recent_window);
            if recent && !colors.contains(color) {
                colors.push(color.clone());
            }
        }
        colors
    }

    /// The pattern to show this cycle, after limiting a lone "motion on".
    pub fn next_blinks(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let pattern = self.pattern(now);
        if pattern.len() == 1 && pattern[0] == self.on_color {
            if self.on_blinks_left == 0 {
                return Vec::new();
            }
            self.on_blinks_left -= 1;
            return pattern;
        }
        self.on_blinks_left = self.on_blink_count;
        pattern
    }

    /// Drain the inbox each cycle, blink, sleep `interval`.
    pub async fn run(
        mut self,
        mut inbox: Inbox,
        clock: Arc<dyn Clock>,
        blinker: Arc<dyn Blinker>,
        interval: Duration,
        mut shutdown: mpsc::Receiver<()>,
    ) {
        info!("blinkctl running (every {:?})", interval);
        loop {
            if shutdown_requested(&mut shutdown) {
                break;
            }

            let now = clock.now();
            while let Some(message) = inbox.try_recv() {
                self.observe(&message, now);
            }

            let blinks = self.next_blinks(now);
            debug!("blink pattern {:?}", blinks);
            for color in &blinks {
                if let Err(e) = blinker.blink(color).await {
                    warn!("Blink {} failed: {}", color, e);
                }
            }

            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        info!("blinkctl stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ManualClock, RecordingBlinker};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2016, 1, 1, 0, 0, 0).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        t0() + chrono::Duration::seconds(secs)
    }

    fn aggregator() -> (StatusAggregator, BlinkConfig) {
        let config = BlinkConfig::default();
        let aggregator = StatusAggregator::new(&TopicNamespace::standard().unwrap(), &config).unwrap();
        (aggregator, config)
    }

    #[test]
    fn test_unknown_until_status_seen() {
        let (mut agg, config) = aggregator();
        assert_eq!(agg.pattern(t0()), vec![config.motion_unknown_color.clone()]);

        agg.observe(&Message::new("motion/detected/", ""), t0());
        assert_eq!(agg.pattern(t0()), vec![config.motion_unknown_color.clone()]);

        agg.observe(&Message::new("motion/status/off/", ""), t0());
        assert_eq!(
            agg.pattern(at(1)),
            vec![config.motion_off_color.clone(), config.motion_detected_color.clone()]
        );
    }

    #[test]
    fn test_status_silence_falls_back_to_unknown() {
        let (mut agg, config) = aggregator();
        agg.observe(&Message::new("motion/status/off/", ""), t0());
        assert_eq!(agg.pattern(at(30)), Vec::<String>::new());
        assert_eq!(agg.pattern(at(31)), vec![config.motion_unknown_color]);
    }

    #[test]
    fn test_recent_window_and_priority_order() {
        let (mut agg, config) = aggregator();
        agg.observe(&Message::new("motion/filesync/error/", "f"), t0());
        agg.observe(&Message::new("motion/filesync/start/", "f"), at(1));
        agg.observe(&Message::new("motion/filesync/end/", "f"), at(2));
        agg.observe(&Message::new("motion/status/on/", ""), at(5));

        assert_eq!(
            agg.pattern(at(5)),
            vec![
                config.motion_on_color.clone(),
                config.motion_filesync_color.clone(),
                config.motion_error_color.clone(),
            ]
        );
        // error ages out first
        assert_eq!(
            agg.pattern(at(11)),
            vec![config.motion_on_color.clone(), config.motion_filesync_color.clone()]
        );
    }

    #[test]
    fn test_lone_motion_on_blinks_limited_times() {
        let (mut agg, config) = aggregator();
        let on = config.motion_on_color.clone();

        let mut shown = Vec::new();
        for cycle in 0..6 {
            agg.observe(&Message::new("motion/status/on/", ""), at(cycle));
            shown.push(agg.next_blinks(at(cycle)));
        }
        assert_eq!(
            shown,
            vec![
                vec![on.clone()],
                vec![on.clone()],
                vec![on.clone()],
                vec![],
                vec![],
                vec![],
            ]
        );

        agg.observe(&Message::new("motion/detected/", ""), at(6));
        assert_eq!(agg.next_blinks(at(6)).len(), 2);
        agg.observe(&Message::new("motion/status/on/", ""), at(20));
        assert_eq!(agg.next_blinks(at(20)), vec![on]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_blinks_each_cycle() {
        let (agg, config) = aggregator();
        let clock = ManualClock::new(t0());
        let blinker = RecordingBlinker::new();
        let (tx, inbox) = vigil_protocol::inbox();
        tx.deliver(Message::new("motion/status/off/", ""));

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let task = tokio::spawn(agg.run(
            inbox,
            Arc::new(clock),
            Arc::new(blinker.clone()),
            Duration::from_secs(2),
            shutdown_rx,
        ));
        tokio::time::sleep(Duration::from_secs(5)).await;
        shutdown_tx.send(()).await.unwrap();
        task.await.unwrap();

        // Cycles at t=0, 2, 4
        assert_eq!(blinker.blinks(), vec![config.motion_off_color; 3]);
    }
}
