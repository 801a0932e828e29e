//! Centralized home-based storage paths for quota-watch persistence.
//!
//! Everything lives under `~/.quota-watch/`:
//! - `config.yaml` - Monitor configuration
//! - `alert_state.json` - Tiers already alerted per window
//! - `logs/monitor.log` - Appended tracing output

use anyhow::{Context, Result};
use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;

/// The name of the quota-watch directory.
const QUOTA_WATCH_DIR: &str = ".quota-watch";

/// Environment override for the home directory.
const HOME_ENV: &str = "QUOTA_WATCH_HOME";

thread_local! {
    static HOME_OVERRIDE: RefCell<Option<PathBuf>> = const { RefCell::new(None) };
}

/// Returns the home directory: `~/.quota-watch/`
///
/// Resolution order is the test override, then `QUOTA_WATCH_HOME`, then the
/// user's home directory. Creates the directory if it doesn't exist.
pub fn quota_watch_home_dir() -> Result<PathBuf> {
    let dir = match HOME_OVERRIDE.with(|o| o.borrow().clone()) {
        Some(dir) => dir,
        None => match std::env::var_os(HOME_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::home_dir()
                .context("Could not determine home directory for quota-watch storage")?
                .join(QUOTA_WATCH_DIR),
        },
    };
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create quota-watch directory: {}", dir.display()))?;
    Ok(dir)
}

/// Returns the default config path: `~/.quota-watch/config.yaml`
pub fn config_path() -> Result<PathBuf> {
    Ok(quota_watch_home_dir()?.join("config.yaml"))
}

/// Returns the alert state path: `~/.quota-watch/alert_state.json`
pub fn alert_state_path() -> Result<PathBuf> {
    Ok(quota_watch_home_dir()?.join("alert_state.json"))
}

/// Returns the monitor log path: `~/.quota-watch/logs/monitor.log`
pub fn monitor_log_path() -> Result<PathBuf> {
    let logs = quota_watch_home_dir()?.join("logs");
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs.join("monitor.log"))
}

/// Restores the previous home override when dropped.
#[cfg(test)]
pub struct TestHomeGuard {
    previous: Option<PathBuf>,
}

#[cfg(test)]
impl Drop for TestHomeGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        HOME_OVERRIDE.with(|o| *o.borrow_mut() = previous);
    }
}

/// Points the home directory at `dir` for the current test thread.
#[cfg(test)]
pub fn set_home_for_test(dir: PathBuf) -> TestHomeGuard {
    let previous = HOME_OVERRIDE.with(|o| o.borrow_mut().replace(dir));
    TestHomeGuard { previous }
}
