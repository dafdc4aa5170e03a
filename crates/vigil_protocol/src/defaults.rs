//! Canonical default values shared by every Vigil process.

/// Broker frontend (XSUB side): publishers connect here.
pub const DEFAULT_PUB_ENDPOINT: &str = "tcp://127.0.0.1:5559";
/// Broker backend (XPUB side): subscribers connect here.
pub const DEFAULT_SUB_ENDPOINT: &str = "tcp://127.0.0.1:5560";

pub const DEFAULT_AUTH_WINDOW_SECS: u32 = 30;

pub const DEFAULT_SCAN_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_AUTH_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_MOTION_POLL_INTERVAL_MS: u64 = 500;

pub const DEFAULT_GRACE_SECS: u64 = 30;
pub const DEFAULT_MAX_UPLOAD_WORKERS: usize = 16;
pub const DEFAULT_REAP_INTERVAL_MS: u64 = 1_000;

pub const DEFAULT_WATCHDOG_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_WATCHDOG_NOTIFICATIONS: u32 = 3;

pub const DEFAULT_ON_BLINK_COUNT: u32 = 3;
pub const DEFAULT_SEC_BETWEEN_BLINKS: u64 = 2;
pub const DEFAULT_RECENT_WINDOW_SECS: u64 = 10;
pub const DEFAULT_UNKNOWN_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_SCAN_POLL_SECS: u64 = 2;
pub const DEFAULT_SCAN_FAILURE_THRESHOLD: u32 = 10;
pub const DEFAULT_MIN_REBOOT_INTERVAL_SECS: u64 = 3_600;

pub const AUTHORIZED_SCAN_INFO: &str = "Authorized scan data";
pub const MOTION_ON_NOTICE: &str = "MOTION ON";
pub const MOTION_OFF_NOTICE: &str = "MOTION OFF";
pub const WATCHDOG_NOTICE: &str = "MOTION WATCHDOG";
