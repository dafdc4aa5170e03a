//! In-memory effect doubles for controller tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::effects::{Blinker, Clock, EffectError, MotionControl, Notifier, RebootAction, TokenReader};

// ============================================================================
// Clock
// ============================================================================

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = at;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|_| Utc::now())
    }
}

// ============================================================================
// Motion detector control
// ============================================================================

#[derive(Debug, Default)]
struct FakeControlState {
    on: bool,
    calls: Vec<&'static str>,
    failing: bool,
}

/// In-memory detector. Records every call; clones share state.
#[derive(Debug, Clone, Default)]
pub struct FakeControl {
    state: Arc<Mutex<FakeControlState>>,
}

impl FakeControl {
    pub fn new(on: bool) -> Self {
        let control = Self::default();
        control.set_on(on);
        control
    }

    pub fn set_on(&self, on: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.on = on;
        }
    }

    /// Make `turn_on`/`turn_off` fail without changing state.
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.failing = failing;
        }
    }

    pub fn currently_on(&self) -> bool {
        self.state.lock().map(|state| state.on).unwrap_or(false)
    }

    /// `turn_on` / `turn_off` calls, in order. Status queries are omitted.
    pub fn switches(&self) -> Vec<&'static str> {
        self.state
            .lock()
            .map(|state| state.calls.iter().copied().filter(|c| *c != "is_on").collect())
            .unwrap_or_default()
    }

    pub fn status_queries(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.calls.iter().filter(|c| **c == "is_on").count())
            .unwrap_or(0)
    }

    fn switch(&self, call: &'static str, on: bool) -> Result<(), EffectError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| EffectError::Unavailable("fake control poisoned".to_string()))?;
        state.calls.push(call);
        if state.failing {
            return Err(EffectError::Unavailable(format!("{} refused", call)));
        }
        state.on = on;
        Ok(())
    }
}

#[async_trait]
impl MotionControl for FakeControl {
    async fn is_on(&self) -> Result<bool, EffectError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| EffectError::Unavailable("fake control poisoned".to_string()))?;
        state.calls.push("is_on");
        Ok(state.on)
    }

    async fn turn_on(&self) -> Result<(), EffectError> {
        self.switch("turn_on", true)
    }

    async fn turn_off(&self) -> Result<(), EffectError> {
        self.switch("turn_off", false)
    }
}

// ============================================================================
// Notifications, LED, reader, reboot
// ============================================================================

/// Records notifications in order. Clones share the log.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<String>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, text: &str) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(text.to_string());
        }
    }
}

/// Records every blink. Clones share the log.
#[derive(Debug, Clone, Default)]
pub struct RecordingBlinker {
    blinks: Arc<Mutex<Vec<String>>>,
}

impl RecordingBlinker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blinks(&self) -> Vec<String> {
        self.blinks.lock().map(|b| b.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Blinker for RecordingBlinker {
    async fn blink(&self, color: &str) -> Result<(), EffectError> {
        if let Ok(mut blinks) = self.blinks.lock() {
            blinks.push(color.to_string());
        }
        Ok(())
    }
}

/// Replays scripted read results, then reports no token forever.
#[derive(Debug, Clone, Default)]
pub struct ScriptedReader {
    script: Arc<Mutex<VecDeque<Result<Option<String>, String>>>>,
}

impl ScriptedReader {
    pub fn new(script: impl IntoIterator<Item = Result<Option<String>, String>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into_iter().collect())),
        }
    }
}

#[async_trait]
impl TokenReader for ScriptedReader {
    async fn read(&self) -> Result<Option<String>, EffectError> {
        let next = self.script.lock().ok().and_then(|mut script| script.pop_front());
        match next {
            Some(Ok(token)) => Ok(token),
            Some(Err(reason)) => Err(EffectError::Unavailable(reason)),
            None => Ok(None),
        }
    }
}

/// Counts reboot requests instead of rebooting.
#[derive(Debug, Clone, Default)]
pub struct CountingReboot {
    count: Arc<Mutex<usize>>,
}

impl CountingReboot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.count.lock().map(|count| *count).unwrap_or(0)
    }
}

#[async_trait]
impl RebootAction for CountingReboot {
    async fn reboot(&self) -> Result<(), EffectError> {
        if let Ok(mut count) = self.count.lock() {
            *count += 1;
        }
        Ok(())
    }
}
