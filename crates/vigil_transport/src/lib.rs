//! ZeroMQ pub/sub transport
//!
//! Connects to a forwarding broker: a PUB socket to its frontend, a SUB
//! socket to its backend. Messages are two frames, `[topic, payload]`.
//!
//! Both sockets are owned by background tasks:
//! - the publish task drains an unbounded channel fed by [`ZmqPublisher`]
//!   handles, so `publish()` never waits on the network
//! - the receive task pushes every inbound message into an [`Inbox`]
//!
//! Reconnection is left to the socket library. A broker that goes away looks
//! exactly like a quiet bus to the decision loops.

use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vigil_protocol::config::BrokerConfig;
use vigil_protocol::{inbox, Inbox, InboxSender, Message, ProtocolError, Publish, Topic};
use zeromq::{PubSocket, Socket, SocketRecv, SocketSend, SubSocket, ZmqError, ZmqMessage};

/// Backoff after a receive error before polling the socket again
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(500);

/// How long `close()` waits for queued publishes to flush
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: ZmqError,
    },

    #[error("Failed to subscribe to {pattern}: {source}")]
    Subscribe {
        pattern: String,
        #[source]
        source: ZmqError,
    },
}

struct Outbound {
    topic: String,
    payload: String,
}

/// Cheap, cloneable publish handle. Publishing fails only once the bus has
/// been closed.
#[derive(Clone)]
pub struct ZmqPublisher {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl Publish for ZmqPublisher {
    fn publish(&self, topic: &Topic, payload: &str) -> vigil_protocol::Result<()> {
        debug!("PUB {} {:?}", topic, payload);
        self.tx
            .send(Outbound {
                topic: topic.to_string(),
                payload: payload.to_string(),
            })
            .map_err(|_| ProtocolError::TransportClosed(topic.to_string()))
    }
}

/// A connected bus. The publish task runs until every publisher handle is
/// gone; the receive task until its inbox is dropped.
pub struct ZmqBus {
    publisher: ZmqPublisher,
    publish_task: JoinHandle<()>,
    receive_task: Option<JoinHandle<()>>,
    /// Held when nothing is subscribed, so the inbox waits instead of
    /// reporting a closed channel
    idle_sender: Option<InboxSender>,
}

impl ZmqBus {
    /// Connect to the broker and subscribe to `patterns`.
    ///
    /// With no patterns the SUB socket is not created and the returned inbox
    /// never yields.
    pub async fn connect(
        broker: &BrokerConfig,
        patterns: &[Topic],
    ) -> Result<(Self, Inbox), TransportError> {
        let mut pub_socket = PubSocket::new();
        pub_socket
            .connect(&broker.pub_endpoint)
            .await
            .map_err(|source| TransportError::Connect {
                endpoint: broker.pub_endpoint.clone(),
                source,
            })?;
        info!("Publishing to broker at {}", broker.pub_endpoint);

        let (tx, rx) = mpsc::unbounded_channel();
        let publish_task = tokio::spawn(publish_loop(pub_socket, rx));

        let (sender, inbox) = inbox();
        let (receive_task, idle_sender) = if patterns.is_empty() {
            (None, Some(sender))
        } else {
            let sub_socket = connect_subscriber(&broker.sub_endpoint, patterns).await?;
            (Some(tokio::spawn(receive_loop(sub_socket, sender))), None)
        };

        warn!("Broker disconnects are not detected; a lost broker looks like a quiet bus");

        Ok((
            Self {
                publisher: ZmqPublisher { tx },
                publish_task,
                receive_task,
                idle_sender,
            },
            inbox,
        ))
    }

    pub fn publisher(&self) -> ZmqPublisher {
        self.publisher.clone()
    }

    /// Stop receiving and give queued publishes a moment to go out.
    ///
    /// Publisher handles cloned from this bus keep the publish task alive;
    /// drop them first for a clean flush.
    pub async fn close(self) {
        if let Some(task) = self.receive_task {
            task.abort();
        }
        drop(self.idle_sender);
        drop(self.publisher);
        let task = self.publish_task;
        let abort = task.abort_handle();
        if tokio::time::timeout(FLUSH_TIMEOUT, task).await.is_err() {
            warn!("Publish queue not drained within {:?}, dropping", FLUSH_TIMEOUT);
            abort.abort();
        }
    }
}

async fn connect_subscriber(endpoint: &str, patterns: &[Topic]) -> Result<SubSocket, TransportError> {
    let mut socket = SubSocket::new();
    socket
        .connect(endpoint)
        .await
        .map_err(|source| TransportError::Connect {
            endpoint: endpoint.to_string(),
            source,
        })?;
    for pattern in patterns {
        socket
            .subscribe(pattern.subscription_prefix())
            .await
            .map_err(|source| TransportError::Subscribe {
                pattern: pattern.to_string(),
                source,
            })?;
        info!("Subscribed to {}", pattern);
    }
    info!("Receiving from broker at {}", endpoint);
    Ok(socket)
}

async fn publish_loop(mut socket: PubSocket, mut rx: mpsc::UnboundedReceiver<Outbound>) {
    while let Some(outbound) = rx.recv().await {
        let frames = encode_frames(&outbound.topic, &outbound.payload);
        if let Err(e) = socket.send(frames).await {
            warn!("Failed to publish {}: {}", outbound.topic, e);
        }
    }
    debug!("Publish loop stopped");
}

async fn receive_loop(mut socket: SubSocket, sender: InboxSender) {
    loop {
        match socket.recv().await {
            Ok(frames) => match decode_frames(frames) {
                Some(message) => {
                    debug!("SUB {} {:?}", message.topic, message.payload);
                    if !sender.deliver(message) {
                        debug!("Inbox dropped, receive loop stopping");
                        break;
                    }
                }
                None => warn!("Dropping message with no topic frame"),
            },
            Err(e) => {
                warn!("ZMQ recv error: {}", e);
                if sender.is_closed() {
                    break;
                }
                tokio::time::sleep(RECV_ERROR_BACKOFF).await;
            }
        }
    }
}

fn encode_frames(topic: &str, payload: &str) -> ZmqMessage {
    let mut frames = ZmqMessage::from(topic.to_string());
    frames.push_back(payload.as_bytes().to_vec().into());
    frames
}

/// `[topic]` or `[topic, payload, ...]`; extra frames are ignored and
/// invalid UTF-8 is replaced.
fn decode_frames(frames: ZmqMessage) -> Option<Message> {
    let mut parts = frames.into_vec().into_iter();
    let topic = parts.next()?;
    let payload = parts.next().unwrap_or_default();
    Some(Message::new(
        String::from_utf8_lossy(&topic).into_owned(),
        String::from_utf8_lossy(&payload).into_owned(),
    ))
}
