//! Persistent record of the tiers already alerted for each window.

use super::tier::Tier;
use crate::errors::StateCorruptionError;
use crate::snapshot::StateKey;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Tiers already notified for the current climb of each window.
///
/// Keys with no tiers are never stored, so "never alerted" and "cleared by
/// hysteresis" look the same on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertState {
    entries: BTreeMap<StateKey, BTreeSet<Tier>>,
}

impl AlertState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tiers already alerted for `key` (empty if none).
    pub fn tiers_for(&self, key: &StateKey) -> BTreeSet<Tier> {
        self.entries.get(key).cloned().unwrap_or_default()
    }

    pub fn contains(&self, key: &StateKey, tier: Tier) -> bool {
        self.entries.get(key).is_some_and(|tiers| tiers.contains(&tier))
    }

    #[cfg(test)]
    pub fn has_entry(&self, key: &StateKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Records that `tier` was alerted for `key`.
    pub fn record(&mut self, key: StateKey, tier: Tier) {
        self.entries.entry(key).or_default().insert(tier);
    }

    /// Undoes `record` for a single tier, dropping the key if nothing remains.
    pub fn revoke(&mut self, key: &StateKey, tier: Tier) {
        if let Some(tiers) = self.entries.get_mut(key) {
            tiers.remove(&tier);
            if tiers.is_empty() {
                self.entries.remove(key);
            }
        }
    }

    /// Clears all history for `key` (hysteresis reset).
    pub fn clear(&mut self, key: &StateKey) {
        self.entries.remove(key);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Narrow storage interface so the backing store can be swapped.
pub trait AlertStateStore: Send + Sync {
    /// Returns the persisted state, or an empty state when nothing usable exists.
    fn load(&self) -> AlertState;

    /// Replaces the persisted state.
    fn save(&self, state: &AlertState) -> Result<()>;

    /// Deletes the persisted state entirely.
    fn reset(&self) -> Result<()>;
}

/// JSON file-backed store. Single writer per file.
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the file, distinguishing "absent" from "corrupt".
    pub fn read(&self) -> Result<Option<AlertState>, StateCorruptionError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StateCorruptionError {
                    path: self.path.clone(),
                    message: e.to_string(),
                })
            }
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StateCorruptionError {
                path: self.path.clone(),
                message: e.to_string(),
            })
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "alert_state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl AlertStateStore for FileStateStore {
    fn load(&self) -> AlertState {
        match self.read() {
            Ok(Some(state)) => state,
            Ok(None) => AlertState::new(),
            Err(e) => {
                tracing::warn!("{}; starting with empty alert state", e);
                AlertState::new()
            }
        }
    }

    fn save(&self, state: &AlertState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create state directory: {}", parent.display())
            })?;
        }

        let content =
            serde_json::to_string_pretty(state).context("Failed to serialize alert state")?;
        let tmp = self.temp_path();
        std::fs::write(&tmp, content)
            .with_context(|| format!("Failed to write alert state: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace alert state: {}", self.path.display()))?;
        Ok(())
    }

    fn reset(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to delete alert state: {}", self.path.display())),
        }
    }
}

/// In-memory store for tests and dry runs.
#[derive(Default)]
pub struct MemoryStateStore {
    state: Mutex<Option<AlertState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn with_state(state: AlertState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
        }
    }

    /// Returns the stored state, or None if nothing was saved.
    pub fn snapshot(&self) -> Option<AlertState> {
        self.state.lock().ok().and_then(|s| s.clone())
    }
}

impl AlertStateStore for MemoryStateStore {
    fn load(&self) -> AlertState {
        self.snapshot().unwrap_or_default()
    }

    fn save(&self, state: &AlertState) -> Result<()> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("alert state lock poisoned"))?;
        *guard = Some(state.clone());
        Ok(())
    }

    fn reset(&self) -> Result<()> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("alert state lock poisoned"))?;
        *guard = None;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/state_tests.rs"]
mod tests;
