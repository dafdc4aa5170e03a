//! Vigil protocol: topic namespace, message plumbing, and configuration
//! shared by every Vigil process.

pub mod config;
pub mod defaults;
pub mod error;
pub mod message;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod topics;

pub use config::{ConfigError, VigilConfig};
pub use error::{ProtocolError, Result};
pub use message::{inbox, Inbox, InboxSender, Message, Publish};
pub use topics::{Topic, TopicNamespace, TopicNode, DEFAULT_TAXONOMY};
