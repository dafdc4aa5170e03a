//! Transfer backends: where committed files go, and how cancelled ones are
//! discarded.

use async_trait::async_trait;
use thiserror::Error;

use crate::command::{CommandError, CommandTemplate};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Command failed: {0}")]
    Command(#[from] CommandError),

    #[error("{0}")]
    Other(String),
}

/// Pluggable upload/delete pair. Implementations own their own retries and
/// timeouts; the worker never times out a committed upload.
#[async_trait]
pub trait TransferBackend: Send + Sync {
    async fn upload(&self, file_id: &str) -> Result<(), BackendError>;

    async fn delete(&self, file_id: &str) -> Result<(), BackendError>;
}

/// Backend that shells out to configured commands with `{file}` substituted.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    upload: CommandTemplate,
    delete: CommandTemplate,
}

impl CommandBackend {
    pub fn new(upload_command: &str, delete_command: &str) -> Result<Self, CommandError> {
        Ok(Self {
            upload: CommandTemplate::parse(upload_command)?,
            delete: CommandTemplate::parse(delete_command)?,
        })
    }
}

#[async_trait]
impl TransferBackend for CommandBackend {
    async fn upload(&self, file_id: &str) -> Result<(), BackendError> {
        self.upload.run_checked(&[("file", file_id)]).await?;
        Ok(())
    }

    async fn delete(&self, file_id: &str) -> Result<(), BackendError> {
        self.delete.run_checked(&[("file", file_id)]).await?;
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_command_backend_success_and_failure() {
        let ok = CommandBackend::new("true {file}", "true {file}").unwrap();
        assert!(ok.upload("f1").await.is_ok());
        assert!(ok.delete("f1").await.is_ok());

        let failing = CommandBackend::new("false {file}", "false {file}").unwrap();
        assert!(matches!(failing.upload("f1").await, Err(BackendError::Command(_))));
    }
}
