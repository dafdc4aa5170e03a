//! Messages, the inbound inbox, and the outbound publish seam.
//!
//! Transport I/O runs in the background and pushes into an [`InboxSender`];
//! decision loops own the matching [`Inbox`] and drain it cooperatively,
//! either non-blockingly or with a bounded wait.

use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::topics::Topic;

/// An inbound pub/sub message. Transient: dropped once processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: String,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    pub fn is_on(&self, topic: &Topic) -> bool {
        topic.matches(&self.topic)
    }
}

/// Outbound side of the transport.
///
/// Publishing is fire-and-forget from the caller's point of view; an error
/// means the transport is gone, not that delivery failed.
pub trait Publish: Send + Sync {
    fn publish(&self, topic: &Topic, payload: &str) -> Result<()>;
}

impl<T: Publish + ?Sized> Publish for std::sync::Arc<T> {
    fn publish(&self, topic: &Topic, payload: &str) -> Result<()> {
        (**self).publish(topic, payload)
    }
}

/// Create a connected sender/inbox pair.
pub fn inbox() -> (InboxSender, Inbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (InboxSender { tx }, Inbox { rx })
}

/// Producer half, held by the transport's receive task.
#[derive(Debug, Clone)]
pub struct InboxSender {
    tx: mpsc::UnboundedSender<Message>,
}

impl InboxSender {
    /// Returns false once the inbox has been dropped.
    pub fn deliver(&self, message: Message) -> bool {
        self.tx.send(message).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half, owned by exactly one decision loop.
#[derive(Debug)]
pub struct Inbox {
    rx: mpsc::UnboundedReceiver<Message>,
}

impl Inbox {
    /// Next pending message, without waiting.
    pub fn try_recv(&mut self) -> Option<Message> {
        self.rx.try_recv().ok()
    }

    /// Next message, waiting at most `timeout`. `None` on timeout or when
    /// every sender is gone; callers cannot tell the two apart.
    /// A closed inbox still waits out the full timeout.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Option<Message> {
        let deadline = tokio::time::Instant::now() + timeout;
        match tokio::time::timeout_at(deadline, self.rx.recv()).await {
            Ok(Some(message)) => Some(message),
            Ok(None) => {
                tokio::time::sleep_until(deadline).await;
                None
            }
            Err(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_recv_is_fifo() {
        let (tx, mut rx) = inbox();
        assert!(rx.try_recv().is_none());
        assert!(tx.deliver(Message::new("a/", "1")));
        assert!(tx.deliver(Message::new("b/", "2")));
        assert_eq!(rx.try_recv().unwrap().topic, "a/");
        assert_eq!(rx.try_recv().unwrap(), Message::new("b/", "2"));
        assert!(rx.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recv_timeout_elapses() {
        let (_tx, mut rx) = inbox();
        let started = tokio::time::Instant::now();
        assert!(rx.recv_timeout(Duration::from_secs(5)).await.is_none());
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recv_timeout_after_disconnect_still_waits() {
        let (tx, mut rx) = inbox();
        drop(tx);
        let started = tokio::time::Instant::now();
        assert!(rx.recv_timeout(Duration::from_secs(2)).await.is_none());
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[test]
    fn test_deliver_after_inbox_dropped() {
        let (tx, rx) = inbox();
        drop(rx);
        assert!(tx.is_closed());
        assert!(!tx.deliver(Message::new("a/", "")));
    }

    #[test]
    fn test_message_topic_match() {
        let msg = Message::new("nfc/scan/data/", "abc");
        assert!(msg.is_on(&Topic::new("nfc/scan/#")));
        assert!(!msg.is_on(&Topic::new("motion/#")));
    }
}
