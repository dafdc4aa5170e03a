//! Windowed token authorization
//!
//! A scanned token is accepted when it equals the challenge hash of some
//! second within `±window` of the verifier's clock. Candidate seconds are
//! tried outward from "now" (`0, +1, -1, +2, -2, ...`) because tokens from a
//! synchronized writer almost always match at zero skew.
//!
//! The search is bounded (`2 * window + 1` hashes), CPU-only, and never
//! suspends; callers on an async runtime can invoke it inline.

use chrono::{DateTime, Duration, Utc};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::debug;

use crate::signing::{dt_salted_hash, CHALLENGE_HEX_LEN};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Shared secret is empty")]
    EmptySecret,
}

/// Verifies tokens against the shared secret.
#[derive(Clone)]
pub struct WindowedAuthorizer {
    secret: String,
    window_secs: u32,
}

impl std::fmt::Debug for WindowedAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowedAuthorizer")
            .field("secret", &"<redacted>")
            .field("window_secs", &self.window_secs)
            .finish()
    }
}

impl WindowedAuthorizer {
    pub fn new(secret: impl Into<String>, window_secs: u32) -> Result<Self, AuthError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(AuthError::EmptySecret);
        }
        Ok(Self {
            secret,
            window_secs,
        })
    }

    pub fn window_secs(&self) -> u32 {
        self.window_secs
    }

    /// The token a writer would store at `now`.
    pub fn challenge(&self, now: &DateTime<Utc>) -> String {
        dt_salted_hash(&self.secret, now)
    }

    pub fn verify(&self, candidate: &str, now: &DateTime<Utc>) -> bool {
        self.verify_detailed(candidate, now).is_some()
    }

    /// Returns the matching offset in seconds (token clock minus ours).
    pub fn verify_detailed(&self, candidate: &str, now: &DateTime<Utc>) -> Option<i64> {
        let candidate = candidate.trim().to_ascii_lowercase();
        if candidate.len() != CHALLENGE_HEX_LEN {
            debug!("Rejecting token of length {}", candidate.len());
            return None;
        }

        for offset in spiral_offsets(self.window_secs) {
            let timestamp = *now + Duration::seconds(offset);
            let expected = dt_salted_hash(&self.secret, &timestamp);
            if bool::from(expected.as_bytes().ct_eq(candidate.as_bytes())) {
                debug!("Token matched at {:+}s skew", offset);
                return Some(offset);
            }
        }
        None
    }
}

/// `0, +1, -1, +2, -2, ..., +window, -window`
pub fn spiral_offsets(window_secs: u32) -> impl Iterator<Item = i64> {
    let window = i64::from(window_secs);
    std::iter::once(0).chain((1..=window).flat_map(|k| [k, -k]))
}

/// Free-function form over an explicit secret.
pub fn verify(candidate: &str, secret: &str, now: &DateTime<Utc>, window_secs: u32) -> bool {
    WindowedAuthorizer::new(secret, window_secs)
        .map(|auth| auth.verify(candidate, now))
        .unwrap_or(false)
}
