//! Long-running process roles. Each connects to the broker, runs one
//! component until Ctrl+C, then flushes the bus.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use vigil_protocol::config::require_command;
use vigil_sentinel::{
    CommandBlinker, CommandMotionControl, CommandReboot, CommandTokenReader, FileSyncOrchestrator,
    FilesyncSettings, MotionController, MotionEffects, MotionSettings, ScanReporter, ScannerEffects,
    ScannerSettings, StatusAggregator, SystemClock, Watchdog,
};
use vigil_worker::CommandBackend;

use super::context::{finish, shutdown_on_ctrl_c, RoleContext};

pub async fn nfc_scan(ctx: &RoleContext) -> Result<()> {
    let nfc = &ctx.config.nfc;
    let read_command = require_command(&nfc.read_command, "nfc.read_command")?;
    let reader = CommandTokenReader::new(read_command).context("Invalid nfc.read_command")?;
    let reboot = CommandReboot::new(&nfc.reboot_command).context("Invalid nfc.reboot_command")?;

    let (bus, _inbox) = ctx.connect(&[]).await?;
    let reporter = ScanReporter::new(
        &ctx.namespace,
        ScannerSettings::from(nfc),
        ScannerEffects {
            clock: Arc::new(SystemClock),
            reader: Arc::new(reader),
            reboot: Arc::new(reboot),
            publisher: Arc::new(bus.publisher()),
        },
    )?;

    reporter.run(shutdown_on_ctrl_c()).await;
    finish(bus).await;
    Ok(())
}

pub async fn motionctl(ctx: &RoleContext) -> Result<()> {
    let motion = &ctx.config.motionctl;
    let authorizer = ctx.authorizer()?;
    let control = CommandMotionControl::new(&motion.status_command, &motion.on_command, &motion.off_command)
        .context("Invalid motionctl command")?;
    let notifier = ctx.notifier()?;

    let (bus, inbox) = ctx.connect(&MotionController::subscriptions(&ctx.namespace)?).await?;
    let controller = MotionController::new(
        &ctx.namespace,
        authorizer,
        MotionSettings::from(motion),
        MotionEffects {
            clock: Arc::new(SystemClock),
            control: Box::new(control),
            notifier,
            publisher: Arc::new(bus.publisher()),
        },
    )?;

    controller.run(inbox, shutdown_on_ctrl_c()).await;
    finish(bus).await;
    Ok(())
}

pub async fn filesync(ctx: &RoleContext) -> Result<()> {
    let filesync = &ctx.config.filesync;
    let upload = require_command(&filesync.upload_command, "filesync.upload_command")?;
    let delete = require_command(&filesync.delete_command, "filesync.delete_command")?;
    let backend = CommandBackend::new(upload, delete).context("Invalid filesync command")?;
    let authorizer = ctx.authorizer()?;

    let (bus, inbox) = ctx
        .connect(&FileSyncOrchestrator::subscriptions(&ctx.namespace)?)
        .await?;
    let orchestrator = FileSyncOrchestrator::new(
        &ctx.namespace,
        authorizer,
        FilesyncSettings::from(filesync),
        Arc::new(SystemClock),
        Arc::new(backend),
        Arc::new(bus.publisher()),
    )?;

    let outcomes = orchestrator.run(inbox, shutdown_on_ctrl_c()).await;
    info!("filesync settled {} uploads at shutdown", outcomes.len());
    finish(bus).await;
    Ok(())
}

pub async fn watchdog(ctx: &RoleContext) -> Result<()> {
    let notifier = ctx.notifier()?;
    let (bus, inbox) = ctx.connect(&Watchdog::subscriptions(&ctx.namespace)?).await?;
    let watchdog = Watchdog::new(&ctx.namespace, &ctx.config.watchdog, notifier)?;

    watchdog.run(inbox, shutdown_on_ctrl_c()).await;
    finish(bus).await;
    Ok(())
}

pub async fn blinkctl(ctx: &RoleContext) -> Result<()> {
    let blink = &ctx.config.blink;
    let blinker = CommandBlinker::new(&blink.command).context("Invalid blink.command")?;
    let (bus, inbox) = ctx
        .connect(&StatusAggregator::subscriptions(&ctx.namespace)?)
        .await?;
    let aggregator = StatusAggregator::new(&ctx.namespace, blink)?;

    aggregator
        .run(
            inbox,
            Arc::new(SystemClock),
            Arc::new(blinker),
            blink.interval(),
            shutdown_on_ctrl_c(),
        )
        .await;
    finish(bus).await;
    Ok(())
}
