//! Provider-agnostic quota snapshots.

use crate::usage_window::QuotaWindow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A subscription provider whose quota is monitored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Claude,
    Codex,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Claude => "claude",
            Provider::Codex => "codex",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Claude => "Claude",
            Provider::Codex => "Codex",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity of a window in the alert state: `"<provider>:<period>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateKey(pub String);

impl StateKey {
    pub fn new(provider: Provider, period: &str) -> Self {
        Self(format!("{}:{}", provider.as_str(), period))
    }
}

impl From<&str> for StateKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for StateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The windows observed for one provider account during a single poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSnapshot {
    pub provider: Provider,
    pub account: Option<String>,
    pub plan_type: Option<String>,
    pub windows: Vec<QuotaWindow>,
}

impl ProviderSnapshot {
    pub fn new(provider: Provider, windows: Vec<QuotaWindow>) -> Self {
        Self {
            provider,
            account: None,
            plan_type: None,
            windows,
        }
    }

    pub fn state_key(&self, window: &QuotaWindow) -> StateKey {
        StateKey::new(self.provider, &window.period)
    }

    /// Returns the longest-span window strictly longer than `window`, used as
    /// context when alerting on a short window.
    pub fn sibling_long_window(&self, window: &QuotaWindow) -> Option<&QuotaWindow> {
        let own = window.span.duration()?;
        self.windows
            .iter()
            .filter(|w| w.period != window.period)
            .filter(|w| w.span.duration().is_some_and(|d| d > own))
            .max_by_key(|w| w.span.duration())
    }
}

/// All windows captured by one poll, grouped by provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    pub captured_at: DateTime<Utc>,
    pub providers: Vec<ProviderSnapshot>,
}

impl QuotaSnapshot {
    pub fn new(captured_at: DateTime<Utc>, providers: Vec<ProviderSnapshot>) -> Self {
        Self {
            captured_at,
            providers,
        }
    }

    #[cfg(test)]
    pub fn provider(&self, provider: Provider) -> Option<&ProviderSnapshot> {
        self.providers.iter().find(|p| p.provider == provider)
    }

    pub fn is_empty(&self) -> bool {
        self.providers.iter().all(|p| p.windows.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage_window::{ResetTimestamp, UsageWindowSpan};

    fn window(period: &str, span: UsageWindowSpan) -> QuotaWindow {
        QuotaWindow::new(period, 50.0, ResetTimestamp::from_epoch_seconds(0), span)
    }

    #[test]
    fn test_state_key_format() {
        assert_eq!(StateKey::new(Provider::Claude, "5-hour").0, "claude:5-hour");
        assert_eq!(StateKey::new(Provider::Codex, "primary").0, "codex:primary");
    }

    #[test]
    fn test_sibling_long_window_picks_longest() {
        let snapshot = ProviderSnapshot::new(
            Provider::Claude,
            vec![
                window("5-hour", UsageWindowSpan::Hours(5)),
                window("1-day", UsageWindowSpan::Days(1)),
                window("7-day", UsageWindowSpan::Days(7)),
            ],
        );
        let short = &snapshot.windows[0];
        let sibling = snapshot.sibling_long_window(short).unwrap();
        assert_eq!(sibling.period, "7-day");
    }

    #[test]
    fn test_long_window_has_no_sibling() {
        let snapshot = ProviderSnapshot::new(
            Provider::Claude,
            vec![
                window("5-hour", UsageWindowSpan::Hours(5)),
                window("7-day", UsageWindowSpan::Days(7)),
                window("7-day-opus", UsageWindowSpan::Days(7)),
            ],
        );
        assert!(snapshot.sibling_long_window(&snapshot.windows[1]).is_none());
    }

    #[test]
    fn test_unknown_span_has_no_sibling() {
        let snapshot = ProviderSnapshot::new(
            Provider::Codex,
            vec![
                window("primary", UsageWindowSpan::Unknown),
                window("secondary", UsageWindowSpan::Days(7)),
            ],
        );
        assert!(snapshot.sibling_long_window(&snapshot.windows[0]).is_none());
    }

    #[test]
    fn test_snapshot_is_empty() {
        let now = chrono::Utc::now();
        let snapshot = QuotaSnapshot::new(now, vec![ProviderSnapshot::new(Provider::Claude, vec![])]);
        assert!(snapshot.is_empty());
    }
}
