//! Alert decision engine.
//!
//! `decide` is pure: the same snapshot and state always produce the same
//! alerts and the same next state. Time-dependent fields are computed from
//! `snapshot.captured_at`, never from the wall clock.

use super::state::AlertState;
use super::tier::{Tier, TierLadder};
use crate::snapshot::{Provider, QuotaSnapshot, StateKey};
use crate::usage_window::QuotaWindow;
use std::time::Duration;

/// A window that crossed into a tier it has not been alerted for yet.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAlert {
    pub key: StateKey,
    pub provider: Provider,
    pub account: Option<String>,
    pub window: QuotaWindow,
    pub tier: Tier,
    pub time_until_reset: Duration,
    /// The provider's longer window, when alerting on a shorter one.
    pub sibling: Option<QuotaWindow>,
}

/// Result of one decision pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub alerts: Vec<PendingAlert>,
    /// State assuming every pending alert is delivered.
    pub state: AlertState,
}

impl Decision {
    /// Removes the tier of an undelivered alert from the next state so it is
    /// retried on the next qualifying cycle.
    pub fn mark_undelivered(&mut self, alert: &PendingAlert) {
        self.state.revoke(&alert.key, alert.tier);
    }
}

/// Decides which windows need a new alert and produces the next state.
///
/// Only the currently classified tier is compared against history, so a
/// window jumping from 10% to 85% between polls fires the 80% alert alone.
pub fn decide(snapshot: &QuotaSnapshot, state: &AlertState, ladder: &TierLadder) -> Decision {
    let mut next = state.clone();
    let mut alerts = Vec::new();

    for provider in &snapshot.providers {
        for window in &provider.windows {
            let key = provider.state_key(window);

            if let Some(tier) = ladder.classify(window.utilization) {
                if !state.contains(&key, tier) {
                    alerts.push(PendingAlert {
                        key: key.clone(),
                        provider: provider.provider,
                        account: provider.account.clone(),
                        window: window.clone(),
                        tier,
                        time_until_reset: window.time_until_reset(snapshot.captured_at),
                        sibling: provider.sibling_long_window(window).cloned(),
                    });
                    next.record(key.clone(), tier);
                }
            }

            if ladder.below_floor(window.utilization) {
                next.clear(&key);
            }
        }
    }

    Decision {
        alerts,
        state: next,
    }
}

#[cfg(test)]
#[path = "tests/engine_tests.rs"]
mod tests;
