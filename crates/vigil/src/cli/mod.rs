//! CLI module for Vigil
//!
//! `roles` holds the long-running processes, `tools` the one-shot commands.
//! Both build on the loaded configuration in `context`.

pub mod context;
pub mod roles;
pub mod tools;
