//! Configuration and wiring shared by every subcommand.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use vigil_protocol::{Inbox, Topic, TopicNamespace, VigilConfig};
use vigil_security::WindowedAuthorizer;
use vigil_sentinel::{CommandNotifier, LogNotifier, Notifier, METRICS};
use vigil_transport::ZmqBus;

pub struct RoleContext {
    pub config: VigilConfig,
    pub namespace: TopicNamespace,
}

impl RoleContext {
    pub fn load(path: &Path) -> Result<Self> {
        let config = VigilConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
        let namespace = TopicNamespace::standard().context("Built-in topic taxonomy is invalid")?;
        debug!("Loaded configuration from {}", path.display());
        Ok(Self { config, namespace })
    }

    pub fn authorizer(&self) -> Result<WindowedAuthorizer> {
        let secret = self.config.auth.secret()?;
        WindowedAuthorizer::new(secret, self.config.auth.window_secs).context("Invalid auth configuration")
    }

    /// The configured notify command, or the log when none is set.
    pub fn notifier(&self) -> Result<Arc<dyn Notifier>> {
        match self.config.notify.command.as_deref() {
            Some(command) if !command.trim().is_empty() => {
                let notifier = CommandNotifier::new(command).context("Invalid notify.command")?;
                Ok(Arc::new(notifier))
            }
            _ => {
                info!("No notify.command configured, notifications go to the log");
                Ok(Arc::new(LogNotifier))
            }
        }
    }

    pub async fn connect(&self, subscriptions: &[Topic]) -> Result<(ZmqBus, Inbox)> {
        ZmqBus::connect(&self.config.broker, subscriptions)
            .await
            .with_context(|| {
                format!(
                    "Failed to connect to broker ({} / {})",
                    self.config.broker.pub_endpoint, self.config.broker.sub_endpoint
                )
            })
    }
}

/// A shutdown receiver that fires on Ctrl+C.
pub fn shutdown_on_ctrl_c() -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, initiating shutdown...");
                let _ = tx.send(()).await;
            }
            Err(e) => {
                // Dropping tx would read as a shutdown request
                warn!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    });
    rx
}

/// Flush the bus and log what the process did.
pub async fn finish(bus: ZmqBus) {
    bus.close().await;
    info!("{}", METRICS.snapshot().summary());
}
