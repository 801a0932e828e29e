//! The poll loop: fetch, decide, notify, persist, and the daily report.
//!
//! Cycles never overlap. A failed cycle is logged and the loop waits for the
//! next tick; only a configuration error ends the loop. Stopping is
//! cooperative and takes effect between cycles.

use crate::account_usage::QuotaSource;
use crate::alerts::engine::decide;
use crate::alerts::state::AlertStateStore;
use crate::alerts::tier::TierLadder;
use crate::clock::Clock;
use crate::errors::{ConfigurationError, NotifyError};
use crate::notify::{AlertPayload, Payload, ReportPayload, WebhookNotifier};
use crate::report::ReportScheduler;
use crate::snapshot::QuotaSnapshot;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// What happened to the daily report during a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    NotDue,
    Sent(NaiveDate),
    Undelivered(NaiveDate),
}

/// Summary of one completed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    pub alerts_sent: usize,
    pub alerts_undelivered: usize,
    pub state_saved: bool,
    pub report: ReportOutcome,
}

impl Display for CycleOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if self.alerts_sent > 0 {
            parts.push(format!("sent {} alert(s)", self.alerts_sent));
        }
        if self.alerts_undelivered > 0 {
            parts.push(format!(
                "{} alert(s) undelivered, will retry",
                self.alerts_undelivered
            ));
        }
        match self.report {
            ReportOutcome::NotDue => {}
            ReportOutcome::Sent(date) => parts.push(format!("sent daily report for {}", date)),
            ReportOutcome::Undelivered(date) => {
                parts.push(format!("daily report for {} undelivered, will retry", date))
            }
        }
        if parts.is_empty() {
            write!(f, "all clear")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// One monitoring process: owns its collaborators and the report cursor.
pub struct Monitor {
    source: Arc<dyn QuotaSource>,
    store: Arc<dyn AlertStateStore>,
    notifier: WebhookNotifier,
    clock: Arc<dyn Clock>,
    ladder: TierLadder,
    reports: Option<ReportScheduler>,
    interval: Duration,
}

impl Monitor {
    pub fn new(
        source: Arc<dyn QuotaSource>,
        store: Arc<dyn AlertStateStore>,
        notifier: WebhookNotifier,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            source,
            store,
            notifier,
            clock,
            ladder: TierLadder::default(),
            reports: None,
            interval: Duration::from_secs(300),
        }
    }

    pub fn with_ladder(mut self, ladder: TierLadder) -> Self {
        self.ladder = ladder;
        self
    }

    /// Enables the daily report.
    pub fn with_reports(mut self, scheduler: ReportScheduler) -> Self {
        self.reports = Some(scheduler);
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Runs one fetch-decide-notify cycle.
    ///
    /// Returns a `ConfigurationError` (inside the `anyhow::Error`) when a
    /// notification is due but nothing is configured to receive it.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        let snapshot = self
            .source
            .fetch_quota()
            .await
            .context("Failed to fetch quota snapshot")?;
        if snapshot.is_empty() {
            tracing::warn!("Quota snapshot contained no windows");
        }

        let state = self.store.load();
        let mut decision = decide(&snapshot, &state, &self.ladder);

        let mut outcome = CycleOutcome {
            alerts_sent: 0,
            alerts_undelivered: 0,
            state_saved: false,
            report: ReportOutcome::NotDue,
        };

        let alerts = std::mem::take(&mut decision.alerts);
        for alert in &alerts {
            let payload = Payload::Alert(AlertPayload::from_pending(alert, snapshot.captured_at));
            match self.notifier.notify(&payload).await {
                Ok(_) => {
                    tracing::info!(key = %alert.key, tier = %alert.tier, "{}", payload.summary());
                    outcome.alerts_sent += 1;
                }
                Err(NotifyError::Delivery(e)) => {
                    tracing::warn!(key = %alert.key, tier = %alert.tier, "Alert not delivered: {}", e);
                    decision.mark_undelivered(alert);
                    outcome.alerts_undelivered += 1;
                }
                Err(NotifyError::NotConfigured(e)) => return Err(e.into()),
            }
        }

        if decision.state != state {
            self.store
                .save(&decision.state)
                .context("Failed to save alert state")?;
            tracing::debug!(windows = decision.state.len(), "Alert state saved");
            outcome.state_saved = true;
        }

        outcome.report = self.send_report_if_due(&snapshot).await?;
        Ok(outcome)
    }

    async fn send_report_if_due(
        &mut self,
        snapshot: &QuotaSnapshot,
    ) -> Result<ReportOutcome> {
        let now = self.clock.now();
        let Some(scheduler) = self.reports.as_mut() else {
            return Ok(ReportOutcome::NotDue);
        };
        let Some(claim) = scheduler.claim(now) else {
            return Ok(ReportOutcome::NotDue);
        };

        let payload = Payload::Report(ReportPayload::from_snapshot(
            snapshot,
            claim.date,
            scheduler.timezone().name(),
        ));
        match self.notifier.notify(&payload).await {
            Ok(_) => {
                tracing::info!(date = %claim.date, "Daily report sent");
                Ok(ReportOutcome::Sent(claim.date))
            }
            Err(NotifyError::Delivery(e)) => {
                tracing::warn!(date = %claim.date, "Daily report not delivered: {}", e);
                if let Some(scheduler) = self.reports.as_mut() {
                    scheduler.release(claim);
                }
                Ok(ReportOutcome::Undelivered(claim.date))
            }
            Err(NotifyError::NotConfigured(e)) => {
                if let Some(scheduler) = self.reports.as_mut() {
                    scheduler.release(claim);
                }
                Err(e.into())
            }
        }
    }

    /// Runs a single cycle and releases the source.
    pub async fn run_once(mut self) -> Result<CycleOutcome> {
        let result = self.run_cycle().await;
        self.source.close().await;
        result
    }

    /// Spawns the poll loop. The first cycle runs immediately.
    pub fn start(self) -> MonitorHandle {
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let task = tokio::spawn(self.run_loop(stop_rx));
        MonitorHandle { stop_tx, task }
    }

    async fn run_loop(mut self, mut stop_rx: mpsc::Receiver<()>) -> Result<()> {
        let tiers: Vec<u8> = self.ladder.tiers().iter().map(|t| t.percent()).collect();
        match &self.reports {
            Some(scheduler) => tracing::info!(
                interval_secs = self.interval.as_secs(),
                tiers = ?tiers,
                report_hour = scheduler.hour(),
                report_timezone = scheduler.timezone().name(),
                "Monitor started"
            ),
            None => tracing::info!(
                interval_secs = self.interval.as_secs(),
                tiers = ?tiers,
                "Monitor started without daily reports"
            ),
        }
        let result = loop {
            let started = self.clock.now();
            match self.run_cycle().await {
                Ok(outcome) => println!("[{}] {}", started.format("%Y-%m-%d %H:%M:%S UTC"), outcome),
                Err(e) if e.downcast_ref::<ConfigurationError>().is_some() => {
                    tracing::error!("Stopping monitor: {:#}", e);
                    break Err(e);
                }
                Err(e) => {
                    tracing::warn!("Cycle failed: {:#}", e);
                    println!("[{}] error: {:#}", started.format("%Y-%m-%d %H:%M:%S UTC"), e);
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                Some(()) = stop_rx.recv() => break Ok(()),
            }
        };

        self.source.close().await;
        tracing::info!("Monitor stopped");
        result
    }
}

/// Controls a running poll loop.
pub struct MonitorHandle {
    stop_tx: mpsc::Sender<()>,
    task: JoinHandle<Result<()>>,
}

impl MonitorHandle {
    /// Resolves when the loop exits on its own. Cancel-safe.
    pub async fn finished(&mut self) -> Result<()> {
        (&mut self.task).await.context("Monitor task panicked")?
    }

    /// Requests a stop and waits for the in-flight cycle to finish.
    pub async fn stop(self) -> Result<()> {
        // The loop may already have exited on its own.
        let _ = self.stop_tx.try_send(());
        self.wait().await
    }

    /// Waits for the loop to exit.
    pub async fn wait(self) -> Result<()> {
        self.task.await.context("Monitor task panicked")?
    }
}

#[cfg(test)]
#[path = "tests/monitor_tests.rs"]
mod tests;
