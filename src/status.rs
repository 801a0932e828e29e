//! Terminal rendering for the `status` command.

use crate::alerts::state::AlertState;
use crate::notify::payload::WindowStatus;
use crate::snapshot::{Provider, QuotaSnapshot};
use crate::usage_window::UsageTimeStatus;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct StatusView {
    pub captured_at: DateTime<Utc>,
    pub providers: Vec<ProviderStatus>,
}

#[derive(Debug, Serialize)]
pub struct ProviderStatus {
    pub provider: Provider,
    pub account: Option<String>,
    pub plan_type: Option<String>,
    pub windows: Vec<WindowView>,
}

#[derive(Debug, Serialize)]
pub struct WindowView {
    pub state_key: String,
    #[serde(flatten)]
    pub status: WindowStatus,
    /// Tiers already alerted in the current climb.
    pub alerted: Vec<u8>,
}

impl StatusView {
    pub fn new(snapshot: &QuotaSnapshot, state: &AlertState) -> Self {
        let providers = snapshot
            .providers
            .iter()
            .map(|p| ProviderStatus {
                provider: p.provider,
                account: p.account.clone(),
                plan_type: p.plan_type.clone(),
                windows: p
                    .windows
                    .iter()
                    .map(|w| {
                        let key = p.state_key(w);
                        WindowView {
                            alerted: state.tiers_for(&key).iter().map(|t| t.percent()).collect(),
                            state_key: key.0,
                            status: WindowStatus::from_window(w, snapshot.captured_at),
                        }
                    })
                    .collect(),
            })
            .collect();
        Self {
            captured_at: snapshot.captured_at,
            providers,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize status")
    }

    /// One header line per provider and one indented line per window.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for provider in &self.providers {
            let mut details = Vec::new();
            if let Some(account) = &provider.account {
                details.push(account.as_str());
            }
            if let Some(plan) = &provider.plan_type {
                details.push(plan.as_str());
            }
            if details.is_empty() {
                out.push_str(provider.provider.display_name());
            } else {
                out.push_str(&format!(
                    "{} ({})",
                    provider.provider.display_name(),
                    details.join(", ")
                ));
            }
            out.push('\n');

            if provider.windows.is_empty() {
                out.push_str("  no data\n");
                continue;
            }
            for window in &provider.windows {
                out.push_str(&window_line(window));
                out.push('\n');
            }
        }
        if self.providers.is_empty() {
            out.push_str("No providers reported usage\n");
        }
        out
    }
}

fn window_line(window: &WindowView) -> String {
    let status = &window.status;
    let mut line = format!(
        "  {:<6} {:>5.1}%  resets in {:<10}",
        status.label,
        status.utilization.clamp(0.0, 100.0),
        status.time_until_reset
    );
    match status.pace {
        UsageTimeStatus::Ahead => line.push_str(" ahead of pace"),
        UsageTimeStatus::Behind => line.push_str(" under pace"),
        UsageTimeStatus::OnTrack => line.push_str(" on pace"),
        UsageTimeStatus::Unknown => {}
    }
    if !window.alerted.is_empty() {
        let tiers: Vec<String> = window.alerted.iter().map(|t| format!("{}%", t)).collect();
        line.push_str(&format!("  alerted: {}", tiers.join(", ")));
    }
    line.trim_end().to_string()
}

#[cfg(test)]
#[path = "tests/status_tests.rs"]
mod tests;
