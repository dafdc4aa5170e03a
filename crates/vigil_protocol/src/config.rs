//! Vigil configuration
//!
//! One TOML file, one section per process role. Every field has a default;
//! the only mandatory input is the shared secret. [`VigilConfig::load`]
//! resolves the secret and validates everything once, after which the
//! structure is treated as immutable.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::defaults;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("No shared secret configured (set auth.secret or auth.secret_file)")]
    MissingSecret,

    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),

    #[error("{0} is required for this command")]
    MissingCommand(&'static str),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VigilConfig {
    pub broker: BrokerConfig,
    pub auth: AuthConfig,
    pub motionctl: MotionctlConfig,
    pub filesync: FilesyncConfig,
    pub blink: BlinkConfig,
    pub watchdog: WatchdogConfig,
    pub nfc: NfcConfig,
    pub notify: NotifyConfig,
}

impl VigilConfig {
    /// Load, resolve the secret, and validate.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_toml_str(&content, base)
    }

    /// Parse from a string. Relative `auth.secret_file` paths resolve
    /// against `base`.
    pub fn from_toml_str(content: &str, base: &Path) -> ConfigResult<Self> {
        let mut config: VigilConfig = toml::from_str(content)?;
        config.auth.resolve_secret(base)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.auth.secret()?;
        non_zero(self.auth.window_secs as u64, "auth.window_secs")?;
        non_zero(self.motionctl.scan_timeout_secs, "motionctl.scan_timeout_secs")?;
        non_zero(self.motionctl.auth_timeout_secs, "motionctl.auth_timeout_secs")?;
        non_zero(self.motionctl.poll_interval_ms, "motionctl.poll_interval_ms")?;
        non_zero(self.filesync.max_workers as u64, "filesync.max_workers")?;
        non_zero(self.filesync.reap_interval_ms, "filesync.reap_interval_ms")?;
        non_zero(self.blink.sec_between_blinks, "blink.sec_between_blinks")?;
        non_zero(self.blink.motion_unknown_timeout_secs, "blink.motion_unknown_timeout_secs")?;
        non_zero(self.watchdog.timeout_secs, "watchdog.timeout_secs")?;
        non_zero(self.nfc.scan_poll_secs, "nfc.scan_poll_secs")?;
        non_zero(self.nfc.failure_threshold as u64, "nfc.failure_threshold")?;
        Ok(())
    }
}

fn non_zero(value: u64, name: &'static str) -> ConfigResult<()> {
    if value == 0 {
        Err(ConfigError::ZeroValue(name))
    } else {
        Ok(())
    }
}

/// Look up a command that a particular subcommand cannot run without.
pub fn require_command<'a>(command: &'a Option<String>, name: &'static str) -> ConfigResult<&'a str> {
    match command.as_deref() {
        Some(cmd) if !cmd.trim().is_empty() => Ok(cmd),
        _ => Err(ConfigError::MissingCommand(name)),
    }
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Endpoint publishers connect to
    pub pub_endpoint: String,
    /// Endpoint subscribers connect to
    pub sub_endpoint: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            pub_endpoint: defaults::DEFAULT_PUB_ENDPOINT.to_string(),
            sub_endpoint: defaults::DEFAULT_SUB_ENDPOINT.to_string(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub secret: Option<String>,
    pub secret_file: Option<PathBuf>,
    /// Accepted clock skew in seconds, each direction
    pub window_secs: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: None,
            secret_file: None,
            window_secs: defaults::DEFAULT_AUTH_WINDOW_SECS,
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("secret_file", &self.secret_file)
            .field("window_secs", &self.window_secs)
            .finish()
    }
}

impl AuthConfig {
    /// An inline secret wins over `secret_file`.
    fn resolve_secret(&mut self, base: &Path) -> ConfigResult<()> {
        if self.secret.is_some() {
            return Ok(());
        }
        if let Some(file) = &self.secret_file {
            let path = if file.is_absolute() {
                file.clone()
            } else {
                base.join(file)
            };
            let content = std::fs::read_to_string(&path)
                .map_err(|source| ConfigError::Read { path, source })?;
            self.secret = Some(content.trim().to_string());
        }
        Ok(())
    }

    pub fn secret(&self) -> ConfigResult<&str> {
        match self.secret.as_deref() {
            Some(secret) if !secret.is_empty() => Ok(secret),
            _ => Err(ConfigError::MissingSecret),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionctlConfig {
    /// Re-arm when the scanner has been silent this long
    pub scan_timeout_secs: u64,
    /// Re-arm when the last authorization is older than this
    pub auth_timeout_secs: u64,
    pub poll_interval_ms: u64,
    /// Exit status 0 means the detector is running
    pub status_command: String,
    pub on_command: String,
    pub off_command: String,
}

impl Default for MotionctlConfig {
    fn default() -> Self {
        Self {
            scan_timeout_secs: defaults::DEFAULT_SCAN_TIMEOUT_SECS,
            auth_timeout_secs: defaults::DEFAULT_AUTH_TIMEOUT_SECS,
            poll_interval_ms: defaults::DEFAULT_MOTION_POLL_INTERVAL_MS,
            status_command: "pgrep -x motion".to_string(),
            on_command: "sudo supervisorctl start motion".to_string(),
            off_command: "sudo supervisorctl stop motion".to_string(),
        }
    }
}

impl MotionctlConfig {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesyncConfig {
    /// Seconds a queued upload stays cancellable
    pub grace_secs: u64,
    pub max_workers: usize,
    pub reap_interval_ms: u64,
    /// `{file}` is replaced by the file identifier
    pub upload_command: Option<String>,
    /// `{file}` is replaced by the file identifier
    pub delete_command: Option<String>,
}

impl Default for FilesyncConfig {
    fn default() -> Self {
        Self {
            grace_secs: defaults::DEFAULT_GRACE_SECS,
            max_workers: defaults::DEFAULT_MAX_UPLOAD_WORKERS,
            reap_interval_ms: defaults::DEFAULT_REAP_INTERVAL_MS,
            upload_command: None,
            delete_command: None,
        }
    }
}

impl FilesyncConfig {
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.reap_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlinkConfig {
    pub motion_on_color: String,
    pub motion_off_color: String,
    pub motion_detected_color: String,
    pub motion_filesync_color: String,
    pub motion_error_color: String,
    pub motion_unknown_color: String,
    pub motion_on_blink_count: u32,
    pub recent_window_secs: u64,
    pub motion_unknown_timeout_secs: u64,
    pub sec_between_blinks: u64,
    /// `{color}` is replaced by the color
    pub command: String,
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            motion_on_color: "0xff,0x00,0x00".to_string(),
            motion_off_color: "0x00,0xff,0x00".to_string(),
            motion_detected_color: "0xff,0xff,0x00".to_string(),
            motion_filesync_color: "0xff,0x00,0xff".to_string(),
            motion_error_color: "0xff,0x80,0x00".to_string(),
            motion_unknown_color: "0x00,0x00,0xff".to_string(),
            motion_on_blink_count: defaults::DEFAULT_ON_BLINK_COUNT,
            recent_window_secs: defaults::DEFAULT_RECENT_WINDOW_SECS,
            motion_unknown_timeout_secs: defaults::DEFAULT_UNKNOWN_TIMEOUT_SECS,
            sec_between_blinks: defaults::DEFAULT_SEC_BETWEEN_BLINKS,
            command: "blink1-tool --rgb {color} --blink 1".to_string(),
        }
    }
}

impl BlinkConfig {
    pub fn recent_window(&self) -> Duration {
        Duration::from_secs(self.recent_window_secs)
    }

    pub fn unknown_timeout(&self) -> Duration {
        Duration::from_secs(self.motion_unknown_timeout_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.sec_between_blinks)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Silence on motion/status this long raises an alert
    pub timeout_secs: u64,
    /// Alerts sent per outage before going quiet
    pub notification_count: u32,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            timeout_secs: defaults::DEFAULT_WATCHDOG_TIMEOUT_SECS,
            notification_count: defaults::DEFAULT_WATCHDOG_NOTIFICATIONS,
        }
    }
}

impl WatchdogConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NfcConfig {
    pub scan_poll_secs: u64,
    /// Prints the token payload on stdout; empty output means no token
    pub read_command: Option<String>,
    /// Consecutive read failures before the reader host is rebooted
    pub failure_threshold: u32,
    pub reboot_command: String,
    pub min_reboot_interval_secs: u64,
}

impl Default for NfcConfig {
    fn default() -> Self {
        Self {
            scan_poll_secs: defaults::DEFAULT_SCAN_POLL_SECS,
            read_command: None,
            failure_threshold: defaults::DEFAULT_SCAN_FAILURE_THRESHOLD,
            reboot_command: "sudo reboot".to_string(),
            min_reboot_interval_secs: defaults::DEFAULT_MIN_REBOOT_INTERVAL_SECS,
        }
    }
}

impl NfcConfig {
    pub fn scan_poll(&self) -> Duration {
        Duration::from_secs(self.scan_poll_secs)
    }

    pub fn min_reboot_interval(&self) -> Duration {
        Duration::from_secs(self.min_reboot_interval_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Receives the notification text as its final argument.
    /// Without it notifications are only logged.
    pub command: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_with_inline_secret() {
        let config = VigilConfig::from_toml_str(
            r#"
            [auth]
            secret = "mysecretkey"
            "#,
            Path::new("."),
        )
        .unwrap();
        assert_eq!(config.auth.secret().unwrap(), "mysecretkey");
        assert_eq!(config.auth.window_secs, 30);
        assert_eq!(config.broker.pub_endpoint, defaults::DEFAULT_PUB_ENDPOINT);
        assert_eq!(config.filesync.max_workers, 16);
        assert_eq!(config.watchdog.notification_count, 3);
    }

    #[test]
    fn test_missing_secret_is_fatal() {
        let err = VigilConfig::from_toml_str("", Path::new(".")).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSecret));

        let err = VigilConfig::from_toml_str("[auth]\nsecret = \"\"", Path::new(".")).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSecret));
    }

    #[test]
    fn test_secret_file_relative_to_config() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut secret = std::fs::File::create(dir.path().join("secret.txt"))?;
        writeln!(secret, "  from-file  ")?;

        let config_path = dir.path().join("vigil.toml");
        std::fs::write(
            &config_path,
            "[auth]\nsecret_file = \"secret.txt\"\n\n[motionctl]\nscan_timeout_secs = 10\nauth_timeout_secs = 5\n",
        )?;

        let config = VigilConfig::load(&config_path)?;
        assert_eq!(config.auth.secret()?, "from-file");
        assert_eq!(config.motionctl.scan_timeout(), Duration::from_secs(10));
        assert_eq!(config.motionctl.auth_timeout(), Duration::from_secs(5));
        Ok(())
    }

    #[test]
    fn test_missing_secret_file_is_read_error() {
        let err = VigilConfig::from_toml_str(
            "[auth]\nsecret_file = \"/nonexistent/vigil-secret\"",
            Path::new("."),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_zero_values_rejected() {
        let err = VigilConfig::from_toml_str(
            "[auth]\nsecret = \"s\"\n[filesync]\nmax_workers = 0",
            Path::new("."),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::ZeroValue("filesync.max_workers")));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let auth = AuthConfig {
            secret: Some("hunter2".to_string()),
            ..AuthConfig::default()
        };
        let rendered = format!("{:?}", auth);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_require_command() {
        assert_eq!(
            require_command(&Some("upload {file}".to_string()), "filesync.upload_command").unwrap(),
            "upload {file}"
        );
        assert!(matches!(
            require_command(&Some("  ".to_string()), "filesync.upload_command"),
            Err(ConfigError::MissingCommand("filesync.upload_command"))
        ));
        assert!(require_command(&None, "nfc.read_command").is_err());
    }
}
