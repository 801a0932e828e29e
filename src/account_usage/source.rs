//! The `QuotaSource` seam and the credential-backed implementation.

use super::api_client::{read_codex_windows, ClaudeClient};
use super::credentials::{
    codex_home_dir, extract_email_from_jwt, read_claude_credentials, read_codex_credentials,
    ProviderCredentials,
};
use crate::clock::Clock;
use crate::errors::SourceError;
use crate::snapshot::{Provider, ProviderSnapshot, QuotaSnapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Produces quota snapshots for the monitor.
#[async_trait]
pub trait QuotaSource: Send + Sync {
    async fn fetch_quota(&self) -> Result<QuotaSnapshot, SourceError>;

    /// Releases any resources held by the source. Called once when the
    /// monitor loop exits.
    async fn close(&self) {}
}

/// Reads local provider credentials and fetches usage for each enabled provider.
pub struct AccountQuotaSource {
    providers: Vec<Provider>,
    claude: ClaudeClient,
    clock: Arc<dyn Clock>,
}

impl AccountQuotaSource {
    pub fn new(providers: Vec<Provider>, clock: Arc<dyn Clock>) -> Self {
        Self::with_claude_client(providers, clock, ClaudeClient::new())
    }

    pub fn with_claude_client(
        providers: Vec<Provider>,
        clock: Arc<dyn Clock>,
        claude: ClaudeClient,
    ) -> Self {
        Self {
            providers,
            claude,
            clock,
        }
    }
}

#[async_trait]
impl QuotaSource for AccountQuotaSource {
    async fn fetch_quota(&self) -> Result<QuotaSnapshot, SourceError> {
        let providers = self.providers.clone();
        let claude = self.claude.clone();
        let now = self.clock.now();

        let results = tokio::task::spawn_blocking(move || {
            providers
                .into_iter()
                .map(|provider| (provider, fetch_provider(&claude, provider, now)))
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| SourceError::new(format!("usage fetch task failed: {}", e)))?;

        combine_results(now, results)
    }

    async fn close(&self) {
        tracing::debug!("Account quota source closed");
    }
}

/// Keeps every provider that succeeded. Fails only when all of them failed.
pub(crate) fn combine_results(
    now: DateTime<Utc>,
    results: Vec<(Provider, Result<ProviderSnapshot, SourceError>)>,
) -> Result<QuotaSnapshot, SourceError> {
    let mut snapshots = Vec::new();
    let mut failures = Vec::new();
    for (provider, result) in results {
        match result {
            Ok(snapshot) => snapshots.push(snapshot),
            Err(e) => {
                tracing::warn!(provider = %provider, error = %e.message, "Provider usage unavailable");
                failures.push(e);
            }
        }
    }

    if snapshots.is_empty() && !failures.is_empty() {
        let message = failures
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(SourceError::new(message));
    }

    Ok(QuotaSnapshot::new(now, snapshots))
}

fn fetch_provider(
    claude: &ClaudeClient,
    provider: Provider,
    now: DateTime<Utc>,
) -> Result<ProviderSnapshot, SourceError> {
    let err = |message: String| SourceError::for_provider(provider.as_str(), message);
    match provider {
        Provider::Claude => {
            let creds = read_claude_credentials()
                .map_err(|e| err(format!("{:#}", e)))?
                .ok_or_else(|| err("no Claude credentials found".to_string()))?;
            if creds.is_expired(now) {
                return Err(err(
                    "Claude OAuth token expired; run `claude` to refresh it".to_string(),
                ));
            }
            claude
                .fetch(creds.access_token(), now)
                .map_err(|e| err(format!("{:#}", e)))
        }
        Provider::Codex => {
            let account = match read_codex_credentials() {
                Ok(Some(ProviderCredentials::Codex {
                    access_token,
                    account_id,
                })) => extract_email_from_jwt(&access_token).or(account_id),
                Ok(_) => None,
                Err(e) => {
                    tracing::debug!(error = %format!("{:#}", e), "Codex credentials unreadable");
                    None
                }
            };
            let sessions_dir = codex_home_dir()
                .map_err(|e| err(format!("{:#}", e)))?
                .join("sessions");
            let windows =
                read_codex_windows(&sessions_dir, now).map_err(|e| err(format!("{:#}", e)))?;
            let mut snapshot = ProviderSnapshot::new(Provider::Codex, windows);
            snapshot.account = account;
            Ok(snapshot)
        }
    }
}

#[cfg(test)]
#[path = "tests/source_tests.rs"]
mod tests;
