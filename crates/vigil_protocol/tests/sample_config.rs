//! The shipped sample configuration must load as-is.

use anyhow::Result;
use std::fs;
use std::time::Duration;
use vigil_protocol::VigilConfig;

const SAMPLE: &str = include_str!("../../../demos/vigil.toml");

#[test]
fn test_sample_config_loads() -> Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("secret.txt"), "mysecretkey\n")?;

    let config = VigilConfig::from_toml_str(SAMPLE, dir.path())?;
    assert_eq!(config.auth.secret()?, "mysecretkey");
    assert_eq!(config.auth.window_secs, 30);
    assert_eq!(config.motionctl.poll_interval(), Duration::from_millis(500));
    assert_eq!(config.filesync.max_workers, 16);
    assert!(config.filesync.upload_command.as_deref().is_some_and(|c| c.contains("{file}")));
    assert!(config.blink.command.contains("{color}"));
    assert_eq!(config.nfc.min_reboot_interval(), Duration::from_secs(3600));
    Ok(())
}

#[test]
fn test_sample_config_without_secret_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    assert!(VigilConfig::from_toml_str(SAMPLE, dir.path()).is_err());
}
