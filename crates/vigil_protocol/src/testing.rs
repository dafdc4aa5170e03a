//! In-memory transport doubles for tests across the workspace.

use std::sync::{Arc, Mutex};

use crate::error::{ProtocolError, Result};
use crate::message::Publish;
use crate::topics::Topic;

/// Records every publish in order. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingPublisher {
    log: Arc<Mutex<Vec<(String, String)>>>,
    closed: Arc<Mutex<bool>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// All `(topic, payload)` pairs published so far.
    pub fn published(&self) -> Vec<(String, String)> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Payloads published to `topic`, in order.
    pub fn payloads_on(&self, topic: &Topic) -> Vec<String> {
        self.published()
            .into_iter()
            .filter(|(t, _)| t == topic.as_str())
            .map(|(_, payload)| payload)
            .collect()
    }

    /// Make every later publish fail with [`ProtocolError::TransportClosed`].
    pub fn close(&self) {
        if let Ok(mut closed) = self.closed.lock() {
            *closed = true;
        }
    }
}

impl Publish for RecordingPublisher {
    fn publish(&self, topic: &Topic, payload: &str) -> Result<()> {
        if self.closed.lock().map(|closed| *closed).unwrap_or(true) {
            return Err(ProtocolError::TransportClosed(topic.to_string()));
        }
        if let Ok(mut log) = self.log.lock() {
            log.push((topic.to_string(), payload.to_string()));
        }
        Ok(())
    }
}
