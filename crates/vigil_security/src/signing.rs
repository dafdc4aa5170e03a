//! Challenge hashing
//!
//! A token carries `hex(sha1(timestamp || secret))` where `timestamp` is the
//! UTC wall clock at one-second granularity rendered as `%Y%m%d%H%M%S`.
//! The secret itself never leaves the process.

use chrono::{DateTime, Utc};
use sha1::{Digest, Sha1};

/// Hex length of a challenge hash (SHA-1, 20 bytes).
pub const CHALLENGE_HEX_LEN: usize = 40;

/// Render a timestamp at the granularity the challenge hash uses.
pub fn format_seconds(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%Y%m%d%H%M%S").to_string()
}

/// Salted hash of `timestamp` keyed by `secret`.
pub fn dt_salted_hash(secret: &str, timestamp: &DateTime<Utc>) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format_seconds(timestamp).as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}
