//! Usage readers for each provider: the Claude OAuth API and Codex session files.

use crate::snapshot::{Provider, ProviderSnapshot};
use crate::usage_window::{QuotaWindow, ResetTimestamp, UsageWindowSpan};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

const API_TIMEOUT: Duration = Duration::from_secs(15);
pub const CLAUDE_API_BASE: &str = "https://api.anthropic.com";

/// How many of the newest Codex session files are searched for rate limits.
const CODEX_SESSION_SCAN_LIMIT: usize = 10;

/// Claude windows in the usage response: `(field, period, span)`.
const CLAUDE_WINDOWS: [(&str, &str, UsageWindowSpan); 3] = [
    ("five_hour", "5-hour", UsageWindowSpan::Hours(5)),
    ("seven_day", "7-day", UsageWindowSpan::Days(7)),
    ("seven_day_opus", "7-day-opus", UsageWindowSpan::Days(7)),
];

/// Blocking client for the Claude OAuth profile and usage endpoints.
#[derive(Clone)]
pub struct ClaudeClient {
    agent: ureq::Agent,
    base_url: String,
}

impl ClaudeClient {
    pub fn new() -> Self {
        Self::with_base_url(CLAUDE_API_BASE)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(API_TIMEOUT))
            .build()
            .into();
        Self {
            agent,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Fetches the account profile and current usage windows.
    ///
    /// The profile is best-effort: a failure there only loses the account
    /// label. A failure on the usage endpoint fails the whole fetch.
    pub fn fetch(&self, access_token: &str, now: DateTime<Utc>) -> Result<ProviderSnapshot> {
        let profile = match self.get_json("/api/oauth/profile", access_token) {
            Ok(profile) => Some(profile),
            Err(e) => {
                tracing::debug!(error = %format!("{:#}", e), "Claude profile unavailable");
                None
            }
        };

        let usage = self
            .get_json("/api/oauth/usage", access_token)
            .context("Failed to fetch Claude usage")?;

        let mut snapshot = ProviderSnapshot::new(Provider::Claude, parse_claude_usage(&usage, now));
        if let Some(profile) = profile {
            snapshot.account = profile["account"]["email"].as_str().map(String::from);
            snapshot.plan_type = profile["organization"]["organization_type"]
                .as_str()
                .map(String::from);
        }
        Ok(snapshot)
    }

    fn get_json(&self, path: &str, access_token: &str) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let body: String = match self
            .agent
            .get(&url)
            .header("Authorization", &format!("Bearer {}", access_token))
            .header("anthropic-beta", "oauth-2025-04-20")
            .header("Content-Type", "application/json")
            .call()
        {
            Ok(mut response) => response
                .body_mut()
                .read_to_string()
                .with_context(|| format!("Failed to read response from {}", path))?,
            Err(ureq::Error::StatusCode(code @ (401 | 403))) => {
                anyhow::bail!("credentials rejected (HTTP {})", code)
            }
            Err(ureq::Error::StatusCode(code)) => anyhow::bail!("HTTP {} from {}", code, path),
            Err(e) => return Err(e).with_context(|| format!("Request to {} failed", path)),
        };
        serde_json::from_str(&body).with_context(|| format!("Invalid JSON from {}", path))
    }
}

impl Default for ClaudeClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps the usage response to windows. Null or missing windows are absent.
pub fn parse_claude_usage(usage: &Value, now: DateTime<Utc>) -> Vec<QuotaWindow> {
    CLAUDE_WINDOWS
        .iter()
        .filter_map(|(field, period, span)| parse_claude_window(&usage[*field], period, *span, now))
        .collect()
}

fn parse_claude_window(
    value: &Value,
    period: &str,
    span: UsageWindowSpan,
    now: DateTime<Utc>,
) -> Option<QuotaWindow> {
    let utilization = value["utilization"].as_f64()?;
    // An idle window reports no reset time; it resets "now" for display.
    let reset_at = value["resets_at"]
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| ResetTimestamp::from_epoch_seconds(dt.timestamp()))
        .unwrap_or_else(|| ResetTimestamp::from_datetime(now));
    Some(QuotaWindow::new(period, utilization, reset_at, span))
}

/// Reads the rate limits from the newest Codex session files under `sessions_dir`.
pub fn read_codex_windows(sessions_dir: &Path, now: DateTime<Utc>) -> Result<Vec<QuotaWindow>> {
    if !sessions_dir.exists() {
        anyhow::bail!("No Codex sessions directory at {}", sessions_dir.display());
    }

    let mut session_files = Vec::new();
    collect_session_files(sessions_dir, &mut session_files)
        .with_context(|| format!("Failed to scan {}", sessions_dir.display()))?;

    // Newest first.
    session_files.sort_by(|a, b| b.0.cmp(&a.0));

    for (_, path) in session_files.iter().take(CODEX_SESSION_SCAN_LIMIT) {
        match parse_session_file(path, now) {
            Ok(Some(windows)) => return Ok(windows),
            Ok(None) => continue,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Skipping unreadable Codex session");
            }
        }
    }

    anyhow::bail!("No rate limit data found in recent Codex sessions")
}

/// Recursively collects `.jsonl` files with their modification times.
fn collect_session_files(
    dir: &Path,
    files: &mut Vec<(std::time::SystemTime, PathBuf)>,
) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_session_files(&path, files)?;
        } else if path.extension().is_some_and(|e| e == "jsonl") {
            let modified = std::fs::metadata(&path)
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            files.push((modified, path));
        }
    }
    Ok(())
}

/// Returns the windows from the last token-count event in the file, if any.
fn parse_session_file(path: &Path, now: DateTime<Utc>) -> Result<Option<Vec<QuotaWindow>>> {
    let content = std::fs::read_to_string(path)?;

    for line in content.lines().rev() {
        let entry: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(_) => continue,
        };

        if entry["type"].as_str() != Some("event_msg") {
            continue;
        }

        let payload = &entry["payload"];
        let kind = payload["type"]
            .as_str()
            .or_else(|| payload["payload_type"].as_str());
        if kind != Some("token_count") {
            continue;
        }

        let rate_limits = &payload["rate_limits"];
        if rate_limits.is_null() {
            continue;
        }

        let windows: Vec<QuotaWindow> = ["primary", "secondary"]
            .iter()
            .filter_map(|period| parse_codex_rate_limit(&rate_limits[*period], period, now))
            .collect();
        return Ok(Some(windows));
    }

    Ok(None)
}

/// Parses one Codex rate-limit entry. `used_percent` is already a percentage.
pub fn parse_codex_rate_limit(limit: &Value, period: &str, now: DateTime<Utc>) -> Option<QuotaWindow> {
    let utilization = limit["used_percent"].as_f64()?;

    let span = limit["window_minutes"]
        .as_u64()
        .and_then(|m| u16::try_from(m).ok())
        .map(UsageWindowSpan::Minutes)
        .unwrap_or_default();

    let reset_at = limit["resets_at"]
        .as_i64()
        .map(ResetTimestamp::from_epoch_seconds)
        .or_else(|| {
            limit["resets_in_seconds"]
                .as_i64()
                .map(|secs| ResetTimestamp::from_epoch_seconds(now.timestamp() + secs))
        })
        .unwrap_or_else(|| ResetTimestamp::from_datetime(now));

    Some(QuotaWindow::new(period, utilization, reset_at, span))
}

#[cfg(test)]
#[path = "tests/api_client_tests.rs"]
mod tests;
