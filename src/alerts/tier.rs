//! Alert tiers and utilization classification.

use serde::{Deserialize, Serialize};

/// A percentage threshold at which an alert is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tier(pub u8);

impl Tier {
    pub fn percent(&self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Default thresholds, highest first.
pub const DEFAULT_TIERS: [u8; 4] = [80, 60, 40, 20];

/// A strictly descending, non-empty sequence of tiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierLadder {
    tiers: Vec<Tier>,
}

impl TierLadder {
    /// Builds a ladder from percentages in any order.
    ///
    /// Duplicates collapse; zero and values above 100 are rejected because a
    /// zero tier would make the hysteresis reset unreachable.
    pub fn new(percents: &[u8]) -> Result<Self, String> {
        let mut values: Vec<u8> = percents.to_vec();
        if values.is_empty() {
            return Err("at least one alert tier is required".to_string());
        }
        if let Some(bad) = values.iter().find(|p| **p == 0 || **p > 100) {
            return Err(format!("alert tier {} must be between 1 and 100", bad));
        }
        values.sort_unstable_by(|a, b| b.cmp(a));
        values.dedup();
        Ok(Self {
            tiers: values.into_iter().map(Tier).collect(),
        })
    }

    /// Tiers from highest to lowest.
    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    /// The hysteresis boundary: utilization below this clears alert history.
    pub fn lowest(&self) -> Tier {
        // Non-empty by construction.
        self.tiers[self.tiers.len() - 1]
    }

    /// Returns the highest tier `t` with `t <= utilization`.
    ///
    /// The top tier has no upper bound, so 150% still classifies as the top
    /// tier. NaN and anything below the lowest tier classify as `None`.
    pub fn classify(&self, utilization: f64) -> Option<Tier> {
        self.tiers
            .iter()
            .copied()
            .find(|t| utilization >= f64::from(t.0))
    }

    /// True when `utilization` is below the lowest tier.
    pub fn below_floor(&self, utilization: f64) -> bool {
        utilization.is_nan() || utilization < f64::from(self.lowest().0)
    }
}

impl Default for TierLadder {
    fn default() -> Self {
        Self {
            tiers: DEFAULT_TIERS.iter().copied().map(Tier).collect(),
        }
    }
}

#[cfg(test)]
#[path = "tests/tier_tests.rs"]
mod tests;
