//! One-shot commands.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::time::Duration;
use tracing::info;
use vigil_protocol::{Publish, Topic, TopicNamespace};
use vigil_sentinel::{CommandNotifier, LogNotifier, Notifier};

use super::context::RoleContext;

/// A freshly connected PUB socket drops what it sends before the broker
/// link is up.
const PUBLISH_SETTLE: Duration = Duration::from_millis(250);

pub async fn notify(ctx: &RoleContext, text: &str) -> Result<()> {
    match ctx.config.notify.command.as_deref() {
        Some(command) if !command.trim().is_empty() => {
            let notifier = CommandNotifier::new(command).context("Invalid notify.command")?;
            notifier.send(text).await.context("Notification failed")?;
        }
        _ => LogNotifier.notify(text),
    }
    Ok(())
}

pub async fn publish(ctx: &RoleContext, topic_id: &str, payload: &str) -> Result<()> {
    let topic = publishable_topic(&ctx.namespace, topic_id)?;
    let (bus, _inbox) = ctx.connect(&[]).await?;
    tokio::time::sleep(PUBLISH_SETTLE).await;

    bus.publisher().publish(&topic, payload)?;
    info!("Published {} ({} bytes)", topic, payload.len());
    bus.close().await;
    Ok(())
}

pub fn token(ctx: &RoleContext) -> Result<()> {
    let authorizer = ctx.authorizer()?;
    println!("{}", authorizer.challenge(&Utc::now()));
    Ok(())
}

/// Resolve a concrete topic id. Wildcards and unknown ids are rejected with
/// the list of valid ids.
fn publishable_topic(namespace: &TopicNamespace, topic_id: &str) -> Result<Topic> {
    let valid = namespace.publishable();
    if !valid.contains(&topic_id) {
        bail!(
            "Unknown topic id '{}'. Valid topics are:\n  {}",
            topic_id,
            valid.join("\n  ")
        );
    }
    Ok(namespace.require(topic_id)?)
}
