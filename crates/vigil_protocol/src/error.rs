//! Protocol error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProtocolError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Unknown topic identifier: {0}")]
    UnknownTopic(String),

    #[error("Duplicate topic identifier {id} (paths {first} and {second})")]
    DuplicateTopic {
        id: String,
        first: String,
        second: String,
    },

    #[error("Invalid topic segment {segment:?}: {reason}")]
    InvalidSegment { segment: String, reason: &'static str },

    #[error("Transport closed while publishing to {0}")]
    TransportClosed(String),
}
