//! Webhook transport and the fan-out notifier.

use super::payload::Payload;
use crate::errors::{ConfigurationError, DeliveryError, DestinationFailure, NotifyError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(15);

/// Posts a JSON body to one endpoint. Any non-2xx response is an error.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post_json(&self, url: &str, body: &Value) -> Result<()>;
}

/// Blocking `ureq` client driven from the blocking thread pool.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(WEBHOOK_TIMEOUT))
            .build()
            .into();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebhookTransport for UreqTransport {
    async fn post_json(&self, url: &str, body: &Value) -> Result<()> {
        let agent = self.agent.clone();
        let url = url.to_string();
        let body = serde_json::to_string(body).context("Failed to serialize webhook body")?;

        tokio::task::spawn_blocking(move || post_blocking(&agent, &url, &body))
            .await
            .context("Webhook task failed")?
    }
}

fn post_blocking(agent: &ureq::Agent, url: &str, body: &str) -> Result<()> {
    match agent
        .post(url)
        .header("Content-Type", "application/json")
        .header(
            "User-Agent",
            format!("quota-watch/{}", env!("CARGO_PKG_VERSION")),
        )
        .send(body)
    {
        Ok(_) => Ok(()),
        Err(ureq::Error::StatusCode(code)) => anyhow::bail!("HTTP {}", code),
        Err(e) => Err(e).context("Webhook request failed"),
    }
}

/// Accepts every payload without sending it, logging the message text.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunTransport;

#[async_trait]
impl WebhookTransport for DryRunTransport {
    async fn post_json(&self, _url: &str, body: &Value) -> Result<()> {
        let content = body["content"].as_str().unwrap_or_default();
        tracing::info!("Dry run, not posted: {}", content);
        Ok(())
    }
}

/// Per-destination result of a successful fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub delivered: Vec<String>,
    pub failures: Vec<DestinationFailure>,
}

impl FanoutReport {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Delivers payloads to a de-duplicated set of webhook destinations.
pub struct WebhookNotifier {
    destinations: Vec<String>,
    transport: Arc<dyn WebhookTransport>,
}

impl WebhookNotifier {
    /// Creates a notifier. Destinations are trimmed, blanks dropped, and
    /// duplicates removed keeping the first occurrence.
    pub fn new<I, S>(destinations: I, transport: Arc<dyn WebhookTransport>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let destinations = destinations
            .into_iter()
            .map(|d| d.as_ref().trim().to_string())
            .filter(|d| !d.is_empty())
            .filter(|d| seen.insert(d.clone()))
            .collect();
        Self {
            destinations,
            transport,
        }
    }

    pub fn destinations(&self) -> &[String] {
        &self.destinations
    }

    /// Sends `payload` to every destination and waits for all of them.
    ///
    /// Fails with `NotConfigured` when there is nowhere to send, and with
    /// `Delivery` when no destination accepted the payload. Partial failures
    /// are logged and reported in the `FanoutReport`.
    pub async fn notify(&self, payload: &Payload) -> Result<FanoutReport, NotifyError> {
        if self.destinations.is_empty() {
            return Err(NotifyError::NotConfigured(ConfigurationError::new(
                "no webhook destinations configured",
            )));
        }

        let body = payload.to_webhook_body();
        let sends = self.destinations.iter().enumerate().map(|(index, url)| {
            let body = &body;
            async move {
                let result = self.transport.post_json(url, body).await;
                (destination_label(index, url), result)
            }
        });
        let results = futures::future::join_all(sends).await;

        let mut report = FanoutReport::default();
        for (destination, result) in results {
            match result {
                Ok(()) => report.delivered.push(destination),
                Err(e) => report.failures.push(DestinationFailure {
                    destination,
                    reason: format!("{:#}", e),
                }),
            }
        }

        if report.delivered.is_empty() {
            return Err(NotifyError::Delivery(DeliveryError {
                failures: report.failures,
            }));
        }

        for failure in &report.failures {
            tracing::warn!(
                destination = %failure.destination,
                reason = %failure.reason,
                "Webhook delivery failed; payload reached other destinations"
            );
        }
        tracing::debug!(
            delivered = report.delivered.len(),
            failed = report.failures.len(),
            "Webhook fan-out complete"
        );

        Ok(report)
    }
}

/// Identifies a destination in logs without exposing the secret path of
/// the webhook URL: `#1 discord.com`.
pub fn destination_label(index: usize, url: &str) -> String {
    let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let host = without_scheme
        .split(['/', '?', '#'])
        .next()
        .filter(|h| !h.is_empty())
        .unwrap_or("<invalid url>");
    let host = host.rsplit('@').next().unwrap_or(host);
    format!("#{} {}", index + 1, host)
}

#[cfg(test)]
#[path = "tests/webhook_tests.rs"]
mod tests;
