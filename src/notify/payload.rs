//! Alert and report payloads and their chat-webhook rendering.

use crate::alerts::engine::PendingAlert;
use crate::snapshot::{Provider, ProviderSnapshot, QuotaSnapshot};
use crate::usage_window::{format_countdown, QuotaWindow, UsageTimeStatus};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{json, Value};

const COLOR_CRITICAL: u32 = 0xE74C3C;
const COLOR_WARNING: u32 = 0xE67E22;
const COLOR_NOTICE: u32 = 0xF1C40F;
const COLOR_INFO: u32 = 0x3498DB;

/// Point-in-time status of one window, as carried in payloads.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowStatus {
    pub period: String,
    pub label: String,
    pub utilization: f64,
    pub reset_at: Option<String>,
    pub time_until_reset_secs: u64,
    pub time_until_reset: String,
    pub pace: UsageTimeStatus,
}

impl WindowStatus {
    pub fn from_window(window: &QuotaWindow, now: DateTime<Utc>) -> Self {
        let remaining = window.time_until_reset(now);
        Self {
            period: window.period.clone(),
            label: window.label(),
            utilization: window.utilization,
            reset_at: window.reset_at.to_datetime().map(|dt| dt.to_rfc3339()),
            time_until_reset_secs: remaining.as_secs(),
            time_until_reset: format_countdown(Some(remaining)),
            pace: window.time_status(now),
        }
    }

    fn line(&self) -> String {
        format!(
            "{} {:.1}% (resets in {})",
            self.label,
            self.utilization.clamp(0.0, 100.0),
            self.time_until_reset
        )
    }
}

/// A window crossed a tier it had not been alerted for.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertPayload {
    pub state_key: String,
    pub provider: Provider,
    pub account: Option<String>,
    pub tier: u8,
    pub window: WindowStatus,
    /// The provider's longer window for context on short-window alerts.
    pub sibling: Option<WindowStatus>,
    pub captured_at: DateTime<Utc>,
}

impl AlertPayload {
    pub fn from_pending(alert: &PendingAlert, captured_at: DateTime<Utc>) -> Self {
        Self {
            state_key: alert.key.0.clone(),
            provider: alert.provider,
            account: alert.account.clone(),
            tier: alert.tier.percent(),
            window: WindowStatus::from_window(&alert.window, captured_at),
            sibling: alert
                .sibling
                .as_ref()
                .map(|w| WindowStatus::from_window(w, captured_at)),
            captured_at,
        }
    }
}

/// Per-provider section of a daily report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderReport {
    pub provider: Provider,
    pub account: Option<String>,
    pub plan_type: Option<String>,
    pub windows: Vec<WindowStatus>,
}

impl ProviderReport {
    fn from_snapshot(snapshot: &ProviderSnapshot, now: DateTime<Utc>) -> Self {
        Self {
            provider: snapshot.provider,
            account: snapshot.account.clone(),
            plan_type: snapshot.plan_type.clone(),
            windows: snapshot
                .windows
                .iter()
                .map(|w| WindowStatus::from_window(w, now))
                .collect(),
        }
    }
}

/// Once-a-day summary of every enabled provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportPayload {
    pub report_date: NaiveDate,
    pub timezone: String,
    pub generated_at: DateTime<Utc>,
    pub providers: Vec<ProviderReport>,
}

impl ReportPayload {
    pub fn from_snapshot(snapshot: &QuotaSnapshot, report_date: NaiveDate, timezone: &str) -> Self {
        Self {
            report_date,
            timezone: timezone.to_string(),
            generated_at: snapshot.captured_at,
            providers: snapshot
                .providers
                .iter()
                .map(|p| ProviderReport::from_snapshot(p, snapshot.captured_at))
                .collect(),
        }
    }
}

/// Everything the notifier can deliver.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Alert(AlertPayload),
    Report(ReportPayload),
    Test { message: String, sent_at: DateTime<Utc> },
}

impl Payload {
    /// One-line human summary, used as the message text and in logs.
    pub fn summary(&self) -> String {
        match self {
            Payload::Alert(alert) => format!(
                "{} {} usage reached {}% ({:.1}%), resets in {}",
                alert.provider.display_name(),
                alert.window.label,
                alert.tier,
                alert.window.utilization,
                alert.window.time_until_reset
            ),
            Payload::Report(report) => format!(
                "Daily quota report for {} ({})",
                report.report_date, report.timezone
            ),
            Payload::Test { message, .. } => message.clone(),
        }
    }

    /// Renders a chat-webhook body: a text `content`, one embed, and the
    /// structured payload under `quota_watch`.
    pub fn to_webhook_body(&self) -> Value {
        let embed = match self {
            Payload::Alert(alert) => {
                let mut fields = vec![json!({
                    "name": alert.window.label,
                    "value": alert.window.line(),
                    "inline": true,
                })];
                if let Some(sibling) = &alert.sibling {
                    fields.push(json!({
                        "name": sibling.label,
                        "value": sibling.line(),
                        "inline": true,
                    }));
                }
                if let Some(account) = &alert.account {
                    fields.push(json!({ "name": "Account", "value": account, "inline": false }));
                }
                json!({
                    "title": format!("{} quota alert: {}%", alert.provider.display_name(), alert.tier),
                    "color": tier_color(alert.tier),
                    "fields": fields,
                    "timestamp": alert.captured_at.to_rfc3339(),
                })
            }
            Payload::Report(report) => {
                let fields: Vec<Value> = report
                    .providers
                    .iter()
                    .map(|p| {
                        let value = if p.windows.is_empty() {
                            "no data".to_string()
                        } else {
                            p.windows
                                .iter()
                                .map(WindowStatus::line)
                                .collect::<Vec<_>>()
                                .join("\n")
                        };
                        json!({
                            "name": p.provider.display_name(),
                            "value": value,
                            "inline": false,
                        })
                    })
                    .collect();
                json!({
                    "title": format!("Daily quota report: {}", report.report_date),
                    "color": COLOR_INFO,
                    "fields": fields,
                    "timestamp": report.generated_at.to_rfc3339(),
                })
            }
            Payload::Test { message, sent_at } => json!({
                "title": "quota-watch test",
                "description": message,
                "color": COLOR_INFO,
                "timestamp": sent_at.to_rfc3339(),
            }),
        };

        json!({
            "content": self.summary(),
            "embeds": [embed],
            "quota_watch": self,
        })
    }
}

fn tier_color(tier: u8) -> u32 {
    match tier {
        80.. => COLOR_CRITICAL,
        60..=79 => COLOR_WARNING,
        _ => COLOR_NOTICE,
    }
}

#[cfg(test)]
#[path = "tests/payload_tests.rs"]
mod tests;
