use crate::alerts::tier::{TierLadder, DEFAULT_TIERS};
use crate::snapshot::Provider;
use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Shortest accepted poll interval.
pub const MIN_POLL_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorConfig {
    /// Webhook URLs that receive alerts and reports.
    #[serde(default)]
    pub webhooks: Vec<String>,
    /// Local hour for the daily report. `None` disables reports.
    #[serde(default)]
    pub report_hour: Option<u32>,
    /// IANA timezone name used to interpret `report_hour`.
    #[serde(default = "default_report_timezone")]
    pub report_timezone: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default = "default_tiers")]
    pub tiers: Vec<u8>,
    /// Overrides `~/.quota-watch/alert_state.json`.
    #[serde(default)]
    pub state_path: Option<PathBuf>,
}

/// Which providers are polled.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProvidersConfig {
    #[serde(default = "enabled")]
    pub claude: bool,
    #[serde(default = "enabled")]
    pub codex: bool,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            claude: true,
            codex: true,
        }
    }
}

impl ProvidersConfig {
    pub fn enabled(&self) -> Vec<Provider> {
        let mut providers = Vec::new();
        if self.claude {
            providers.push(Provider::Claude);
        }
        if self.codex {
            providers.push(Provider::Codex);
        }
        providers
    }
}

fn enabled() -> bool {
    true
}

fn default_report_timezone() -> String {
    "UTC".to_string()
}

fn default_poll_interval_secs() -> u64 {
    300
}

fn default_tiers() -> Vec<u8> {
    DEFAULT_TIERS.to_vec()
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            webhooks: Vec::new(),
            report_hour: None,
            report_timezone: default_report_timezone(),
            poll_interval_secs: default_poll_interval_secs(),
            providers: ProvidersConfig::default(),
            tiers: default_tiers(),
            state_path: None,
        }
    }
}

impl MonitorConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Loads `path`, or returns defaults when it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Loads an explicitly named config, which must exist, or the default
    /// `~/.quota-watch/config.yaml` when none was named.
    pub fn load_for_cli(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => Self::load_or_default(&crate::quota_paths::config_path()?),
        }
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(content).context("Failed to parse config as YAML")?;
        config.validate()?;
        Ok(config)
    }

    /// The annotated sample configuration shipped with the binary.
    pub fn sample_yaml() -> &'static str {
        include_str!("../quota-watch.yaml")
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(hour) = self.report_hour {
            if hour > 23 {
                anyhow::bail!("report_hour must be between 0 and 23, got {}", hour);
            }
        }

        self.timezone()?;
        self.tier_ladder()?;

        if self.poll_interval_secs < MIN_POLL_INTERVAL_SECS {
            anyhow::bail!(
                "poll_interval_secs must be at least {}, got {}",
                MIN_POLL_INTERVAL_SECS,
                self.poll_interval_secs
            );
        }

        if self.providers.enabled().is_empty() {
            anyhow::bail!("At least one provider must be enabled");
        }

        Ok(())
    }

    pub fn timezone(&self) -> Result<Tz> {
        self.report_timezone
            .parse::<Tz>()
            .map_err(|_| anyhow::anyhow!("Unknown report_timezone '{}'", self.report_timezone))
    }

    pub fn tier_ladder(&self) -> Result<TierLadder> {
        TierLadder::new(&self.tiers).map_err(|e| anyhow::anyhow!("Invalid tiers: {}", e))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// The configured state path, falling back to the home directory.
    pub fn resolved_state_path(&self) -> Result<PathBuf> {
        match &self.state_path {
            Some(path) => Ok(path.clone()),
            None => crate::quota_paths::alert_state_path(),
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
