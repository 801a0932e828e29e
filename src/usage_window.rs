//! Quota windows with utilization and reset timestamps.
//!
//! A `QuotaWindow` is one monitored quota period of a provider (e.g. the
//! Claude 5-hour window). Windows only exist when the provider reported data
//! for them; there is no zero-valued placeholder for "unknown".

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Represents the span/duration of a quota window.
///
/// Used to display duration-based labels (e.g., "5h", "7d") and to find the
/// long sibling of a short window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum UsageWindowSpan {
    /// Window duration is not known
    #[default]
    Unknown,
    /// Window duration in minutes (e.g., 300 = 5h)
    Minutes(u16),
    /// Window duration in hours (e.g., 5, 24)
    Hours(u16),
    /// Window duration in days (e.g., 1, 7)
    Days(u16),
}

impl UsageWindowSpan {
    /// Returns the duration of this window span, or None if unknown.
    pub fn duration(&self) -> Option<Duration> {
        match self {
            UsageWindowSpan::Unknown => None,
            UsageWindowSpan::Minutes(m) => Some(Duration::from_secs(*m as u64 * 60)),
            UsageWindowSpan::Hours(h) => Some(Duration::from_secs(*h as u64 * 3600)),
            UsageWindowSpan::Days(d) => Some(Duration::from_secs(*d as u64 * 86400)),
        }
    }

    /// Returns a short label for this window span (e.g., "5h", "24h", "7d").
    pub fn label(&self) -> Option<String> {
        match self {
            UsageWindowSpan::Unknown => None,
            UsageWindowSpan::Minutes(m) => {
                if *m >= 1440 && *m % 1440 == 0 {
                    Some(format!("{}d", m / 1440))
                } else if *m >= 60 && *m % 60 == 0 {
                    Some(format!("{}h", m / 60))
                } else {
                    Some(format!("{}m", m))
                }
            }
            UsageWindowSpan::Hours(h) => {
                if *h >= 24 && *h % 24 == 0 {
                    Some(format!("{}d", h / 24))
                } else {
                    Some(format!("{}h", h))
                }
            }
            UsageWindowSpan::Days(d) => Some(format!("{}d", d)),
        }
    }
}

/// Status of usage pace compared to time elapsed in the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageTimeStatus {
    /// Usage is outpacing time elapsed
    Ahead,
    /// Usage is within +/- 10 percentage points of time elapsed
    OnTrack,
    /// Usage is lagging behind time elapsed
    Behind,
    /// Missing span, or the window already reset
    Unknown,
}

/// An absolute reset timestamp stored as Unix epoch seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct ResetTimestamp {
    /// Unix timestamp in seconds
    pub epoch_seconds: i64,
}

impl ResetTimestamp {
    /// Creates a new reset timestamp from Unix epoch seconds.
    pub fn from_epoch_seconds(seconds: i64) -> Self {
        Self {
            epoch_seconds: seconds,
        }
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self::from_epoch_seconds(dt.timestamp())
    }

    /// Returns the timestamp as a UTC datetime, or None if out of range.
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.epoch_seconds, 0).single()
    }

    /// Returns the duration from `now` until this timestamp, saturating at zero.
    pub fn remaining_from(&self, now: DateTime<Utc>) -> Duration {
        let diff = self.epoch_seconds - now.timestamp();
        if diff > 0 {
            Duration::from_secs(diff as u64)
        } else {
            Duration::ZERO
        }
    }
}

/// One monitored quota period with the utilization observed at a single instant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuotaWindow {
    /// Stable identifier unique within a provider ("5-hour", "7-day", "primary")
    pub period: String,
    /// Percent of quota consumed. Passed through unclamped.
    pub utilization: f64,
    /// When this window resets
    pub reset_at: ResetTimestamp,
    /// The duration/span of this window
    #[serde(default)]
    pub span: UsageWindowSpan,
}

impl QuotaWindow {
    pub fn new(
        period: impl Into<String>,
        utilization: f64,
        reset_at: ResetTimestamp,
        span: UsageWindowSpan,
    ) -> Self {
        Self {
            period: period.into(),
            utilization,
            reset_at,
            span,
        }
    }

    /// Time remaining until reset relative to `now`, never negative.
    pub fn time_until_reset(&self, now: DateTime<Utc>) -> Duration {
        self.reset_at.remaining_from(now)
    }

    /// Utilization clamped to [0, 100] for display only.
    pub fn display_percent(&self) -> f64 {
        if self.utilization.is_nan() {
            return 0.0;
        }
        self.utilization.clamp(0.0, 100.0)
    }

    /// Label used in messages: the span label when known, otherwise the period id.
    pub fn label(&self) -> String {
        self.span.label().unwrap_or_else(|| self.period.clone())
    }

    /// Computes the usage pace based on utilization vs time elapsed at `now`.
    ///
    /// - Ahead: utilization > time elapsed percent + 10
    /// - Behind: utilization < time elapsed percent - 10
    /// - OnTrack: within +/- 10 percentage points
    pub fn time_status(&self, now: DateTime<Utc>) -> UsageTimeStatus {
        let Some(window_duration) = self.span.duration() else {
            return UsageTimeStatus::Unknown;
        };

        let remaining = self.time_until_reset(now);
        if remaining.is_zero() {
            return UsageTimeStatus::Unknown;
        }

        let total_secs = window_duration.as_secs_f64();
        let elapsed_secs = (total_secs - remaining.as_secs_f64()).max(0.0);
        let time_elapsed_pct = ((elapsed_secs / total_secs) * 100.0).clamp(0.0, 100.0);

        let used = self.display_percent();
        let threshold = 10.0;

        if used > time_elapsed_pct + threshold {
            UsageTimeStatus::Ahead
        } else if used < time_elapsed_pct - threshold {
            UsageTimeStatus::Behind
        } else {
            UsageTimeStatus::OnTrack
        }
    }
}

/// Formats a duration as "Xd Yh Zm" countdown string with consistent padding.
///
/// Examples: "4h 05m", "2d 3h", "1d 0h 30m", "45m"
pub fn format_countdown(duration: Option<Duration>) -> String {
    let Some(d) = duration else {
        return "0m".to_string();
    };

    let total_secs = d.as_secs();
    if total_secs == 0 {
        return "0m".to_string();
    }

    let days = total_secs / 86400;
    let hours = (total_secs % 86400) / 3600;
    let minutes = (total_secs % 3600) / 60;

    if days > 0 {
        if minutes > 0 {
            format!("{}d {}h {:02}m", days, hours, minutes)
        } else if hours > 0 {
            format!("{}d {}h", days, hours)
        } else {
            format!("{}d", days)
        }
    } else if hours > 0 {
        format!("{}h {:02}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

#[cfg(test)]
#[path = "tests/usage_window_tests.rs"]
mod tests;
