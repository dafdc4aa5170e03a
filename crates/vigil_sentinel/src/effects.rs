//! Collaborators the controllers act through: clock, detector control,
//! notifications, the status LED, the token reader and the reboot hook.
//!
//! Each seam has a command-backed implementation driven by the config file.
//! In-memory doubles live in the `testing` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use vigil_worker::{CommandError, CommandTemplate};

#[derive(Debug, Error)]
pub enum EffectError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("{0}")]
    Unavailable(String),
}

// ============================================================================
// Clock
// ============================================================================

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Elapsed time since `earlier`, zero if the clock went backwards.
pub fn elapsed_since(now: DateTime<Utc>, earlier: DateTime<Utc>) -> Duration {
    (now - earlier).to_std().unwrap_or_default()
}

// ============================================================================
// Motion detector control
// ============================================================================

/// The external detection process.
#[async_trait]
pub trait MotionControl: Send + Sync {
    async fn is_on(&self) -> Result<bool, EffectError>;
    async fn turn_on(&self) -> Result<(), EffectError>;
    async fn turn_off(&self) -> Result<(), EffectError>;
}

/// Controls the detector through configured commands. A zero exit status
/// from the status command means the detector is running.
#[derive(Debug, Clone)]
pub struct CommandMotionControl {
    status: CommandTemplate,
    on: CommandTemplate,
    off: CommandTemplate,
}

impl CommandMotionControl {
    pub fn new(status_command: &str, on_command: &str, off_command: &str) -> Result<Self, CommandError> {
        Ok(Self {
            status: CommandTemplate::parse(status_command)?,
            on: CommandTemplate::parse(on_command)?,
            off: CommandTemplate::parse(off_command)?,
        })
    }
}

#[async_trait]
impl MotionControl for CommandMotionControl {
    async fn is_on(&self) -> Result<bool, EffectError> {
        Ok(self.status.run(&[]).await?.success)
    }

    async fn turn_on(&self) -> Result<(), EffectError> {
        self.on.run_checked(&[]).await?;
        Ok(())
    }

    async fn turn_off(&self) -> Result<(), EffectError> {
        self.off.run_checked(&[]).await?;
        Ok(())
    }
}

// ============================================================================
// Notifications
// ============================================================================

/// Fire-and-forget notification sink. Never fails the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, text: &str);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, text: &str) {
        info!("NOTIFY {}", text);
    }
}

/// Runs the configured command with the text as its last argument.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    command: CommandTemplate,
}

impl CommandNotifier {
    pub fn new(command: &str) -> Result<Self, CommandError> {
        Ok(Self {
            command: CommandTemplate::parse(command)?,
        })
    }

    /// Deliver and wait for the command to finish.
    pub async fn send(&self, text: &str) -> Result<(), EffectError> {
        let output = self.command.run_with_extra(&[], &[text]).await?;
        if !output.success {
            return Err(EffectError::Unavailable(format!(
                "{} exited with {:?}",
                self.command.program(),
                output.code
            )));
        }
        Ok(())
    }
}

impl Notifier for CommandNotifier {
    fn notify(&self, text: &str) {
        info!("NOTIFY {}", text);
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime, notification dropped: {}", text);
            return;
        };
        let notifier = self.clone();
        let text = text.to_string();
        handle.spawn(async move {
            if let Err(e) = notifier.send(&text).await {
                warn!("Notification {:?} failed: {}", text, e);
            }
        });
    }
}

// ============================================================================
// Status LED
// ============================================================================

#[async_trait]
pub trait Blinker: Send + Sync {
    /// Show `color` once.
    async fn blink(&self, color: &str) -> Result<(), EffectError>;
}

/// Runs the configured command with `{color}` substituted.
#[derive(Debug, Clone)]
pub struct CommandBlinker {
    command: CommandTemplate,
}

impl CommandBlinker {
    pub fn new(command: &str) -> Result<Self, CommandError> {
        Ok(Self {
            command: CommandTemplate::parse(command)?,
        })
    }
}

#[async_trait]
impl Blinker for CommandBlinker {
    async fn blink(&self, color: &str) -> Result<(), EffectError> {
        self.command.run_checked(&[("color", color)]).await?;
        Ok(())
    }
}

// ============================================================================
// Token reader
// ============================================================================

#[async_trait]
pub trait TokenReader: Send + Sync {
    /// One read attempt. `Ok(None)` when no token was presented.
    async fn read(&self) -> Result<Option<String>, EffectError>;
}

/// Runs the configured read command; trimmed stdout is the token, empty
/// stdout means no token, a non-zero exit is a reader failure.
#[derive(Debug, Clone)]
pub struct CommandTokenReader {
    command: CommandTemplate,
}

impl CommandTokenReader {
    pub fn new(command: &str) -> Result<Self, CommandError> {
        Ok(Self {
            command: CommandTemplate::parse(command)?,
        })
    }
}

#[async_trait]
impl TokenReader for CommandTokenReader {
    async fn read(&self) -> Result<Option<String>, EffectError> {
        let output = self.command.run_checked(&[]).await?;
        let token = output.stdout.trim();
        Ok((!token.is_empty()).then(|| token.to_string()))
    }
}

// ============================================================================
// Reboot
// ============================================================================

#[async_trait]
pub trait RebootAction: Send + Sync {
    async fn reboot(&self) -> Result<(), EffectError>;
}

#[derive(Debug, Clone)]
pub struct CommandReboot {
    command: CommandTemplate,
}

impl CommandReboot {
    pub fn new(command: &str) -> Result<Self, CommandError> {
        Ok(Self {
            command: CommandTemplate::parse(command)?,
        })
    }
}

#[async_trait]
impl RebootAction for CommandReboot {
    async fn reboot(&self) -> Result<(), EffectError> {
        self.command.run_checked(&[]).await?;
        Ok(())
    }
}
