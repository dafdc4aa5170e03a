//! Vigil Security Module
//!
//! Provides:
//! - **Signing**: the second-granular salted challenge hash
//! - **Authorizer**: windowed verification of scanned tokens

pub mod authorizer;
pub mod signing;

pub use authorizer::{AuthError, WindowedAuthorizer};
pub use signing::{dt_salted_hash, format_seconds};
