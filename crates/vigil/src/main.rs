//! Vigil launcher
//!
//! One binary, one subcommand per process role:
//! - **Roles**: `nfc-scan`, `motionctl`, `filesync`, `watchdog`, `blinkctl`
//!   run until Ctrl+C and log a metrics summary on the way out
//! - **Tools**: `notify`, `publish` and `token` do one thing and exit

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use vigil_logging::{init_logging, LogConfig};

mod cli;

use cli::context::RoleContext;

#[derive(Parser, Debug)]
#[command(name = "vigil", about = "Token-armed motion detection and upload control")]
struct Cli {
    /// Configuration file
    #[arg(short = 'c', long, global = true, default_value = "vigil.toml")]
    config: PathBuf,

    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    // === Roles ===
    /// Poll the token reader and report scans
    NfcScan,

    /// Arm and disarm the motion detector from token scans
    Motionctl,

    /// Upload queued recordings unless an authorized scan cancels them
    Filesync,

    /// Alert when the motion controller goes quiet
    Watchdog,

    /// Drive the status LED from recent activity
    Blinkctl,

    // === Tools ===
    /// Send a notification through the configured notifier
    Notify {
        /// Notification text
        text: String,
    },

    /// Publish one message to the bus
    Publish {
        /// Topic id (e.g. motion_detected)
        #[arg(short = 't', long)]
        topic: String,

        /// Message payload
        #[arg(short = 'p', long, default_value = "")]
        payload: String,
    },

    /// Print the token a writer would store right now
    Token,
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::NfcScan => "nfc-scan",
            Commands::Motionctl => "motionctl",
            Commands::Filesync => "filesync",
            Commands::Watchdog => "watchdog",
            Commands::Blinkctl => "blinkctl",
            Commands::Notify { .. } => "notify",
            Commands::Publish { .. } => "publish",
            Commands::Token => "token",
        }
    }

    /// Commands whose stdout is the product keep the console to warnings.
    fn is_quiet(&self) -> bool {
        matches!(self, Commands::Publish { .. } | Commands::Token)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = match init_logging(LogConfig {
        app_name: cli.command.name(),
        verbose: cli.verbose,
        quiet: cli.command.is_quiet(),
    }) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Warning: failed to initialize logging: {:?}", err);
            None
        }
    };

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{:?}", err);
            ExitCode::from(1)
        }
    }
}

fn run_command(cli: Cli) -> Result<()> {
    let ctx = RoleContext::load(&cli.config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(async move {
        match cli.command {
            Commands::NfcScan => cli::roles::nfc_scan(&ctx).await,
            Commands::Motionctl => cli::roles::motionctl(&ctx).await,
            Commands::Filesync => cli::roles::filesync(&ctx).await,
            Commands::Watchdog => cli::roles::watchdog(&ctx).await,
            Commands::Blinkctl => cli::roles::blinkctl(&ctx).await,
            Commands::Notify { text } => cli::tools::notify(&ctx, &text).await,
            Commands::Publish { topic, payload } => cli::tools::publish(&ctx, &topic, &payload).await,
            Commands::Token => cli::tools::token(&ctx),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_global_flags() {
        let cli = Cli::try_parse_from(["vigil", "motionctl", "-v"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("vigil.toml"));
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Motionctl));
    }

    #[test]
    fn test_role_names_are_kebab_case() {
        let cli = Cli::try_parse_from(["vigil", "-c", "/etc/vigil.toml", "nfc-scan"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/vigil.toml"));
        assert_eq!(cli.command.name(), "nfc-scan");
        assert!(!cli.command.is_quiet());
    }

    #[test]
    fn test_publish_arguments() {
        let cli = Cli::try_parse_from(["vigil", "publish", "-t", "motion_filesync_queue", "-p", "clip_7"])
            .unwrap();
        match &cli.command {
            Commands::Publish { topic, payload } => {
                assert_eq!(topic, "motion_filesync_queue");
                assert_eq!(payload, "clip_7");
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert!(cli.command.is_quiet());

        let cli = Cli::try_parse_from(["vigil", "publish", "--topic", "motion_detected"]).unwrap();
        assert!(matches!(cli.command, Commands::Publish { ref payload, .. } if payload.is_empty()));
    }

    #[test]
    fn test_notify_requires_text() {
        assert!(Cli::try_parse_from(["vigil", "notify"]).is_err());
        let cli = Cli::try_parse_from(["vigil", "notify", "door open"]).unwrap();
        assert!(matches!(cli.command, Commands::Notify { ref text } if text == "door open"));
    }
}
