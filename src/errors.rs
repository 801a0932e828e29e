//! Error taxonomy for the monitor.
//!
//! Only `ConfigurationError` ends a monitor invocation. Source and delivery
//! failures are recovered at cycle granularity, and state corruption is
//! recovered by starting from an empty state.

use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// The quota source was unreachable, rejected credentials, or returned data
/// that could not be parsed.
#[derive(Debug, Clone)]
pub struct SourceError {
    pub provider: Option<String>,
    pub message: String,
}

impl SourceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            provider: None,
            message: message.into(),
        }
    }

    pub fn for_provider(provider: &str, message: impl Into<String>) -> Self {
        Self {
            provider: Some(provider.to_string()),
            message: message.into(),
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.provider {
            Some(provider) => write!(f, "quota source error ({}): {}", provider, self.message),
            None => write!(f, "quota source error: {}", self.message),
        }
    }
}

impl std::error::Error for SourceError {}

/// Persisted alert state could not be parsed.
#[derive(Debug, Clone)]
pub struct StateCorruptionError {
    pub path: PathBuf,
    pub message: String,
}

impl Display for StateCorruptionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "alert state at {} is unreadable: {}",
            self.path.display(),
            self.message
        )
    }
}

impl std::error::Error for StateCorruptionError {}

/// A single destination that rejected or never received a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationFailure {
    pub destination: String,
    pub reason: String,
}

impl Display for DestinationFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.destination, self.reason)
    }
}

/// Every configured destination failed for a payload.
#[derive(Debug, Clone)]
pub struct DeliveryError {
    pub failures: Vec<DestinationFailure>,
}

impl Display for DeliveryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "delivery failed for all {} destination(s)",
            self.failures.len()
        )?;
        for failure in &self.failures {
            write!(f, "; {}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for DeliveryError {}

/// The monitor cannot proceed with its configuration.
#[derive(Debug, Clone)]
pub struct ConfigurationError {
    pub message: String,
}

impl ConfigurationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Display for ConfigurationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigurationError {}

/// Outcome of a fan-out that did not reach any destination.
#[derive(Debug, Clone)]
pub enum NotifyError {
    /// No destinations are configured while a notification is due.
    NotConfigured(ConfigurationError),
    /// All destinations failed.
    Delivery(DeliveryError),
}

impl Display for NotifyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConfigured(e) => write!(f, "{}", e),
            Self::Delivery(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for NotifyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::NotConfigured(e) => Some(e),
            Self::Delivery(e) => Some(e),
        }
    }
}
