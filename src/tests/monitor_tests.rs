use super::*;
use crate::alerts::state::{AlertState, MemoryStateStore};
use crate::alerts::tier::Tier;
use crate::clock::FixedClock;
use crate::errors::SourceError;
use crate::notify::webhook::WebhookTransport;
use crate::snapshot::{Provider, ProviderSnapshot, StateKey};
use crate::usage_window::{QuotaWindow, ResetTimestamp, UsageWindowSpan};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, hour, minute, 0).unwrap()
}

fn snapshot(now: DateTime<Utc>, five_hour: f64, seven_day: f64) -> QuotaSnapshot {
    let ts = now.timestamp();
    QuotaSnapshot::new(
        now,
        vec![ProviderSnapshot::new(
            Provider::Claude,
            vec![
                QuotaWindow::new(
                    "5-hour",
                    five_hour,
                    ResetTimestamp::from_epoch_seconds(ts + 3600),
                    UsageWindowSpan::Hours(5),
                ),
                QuotaWindow::new(
                    "7-day",
                    seven_day,
                    ResetTimestamp::from_epoch_seconds(ts + 86_400),
                    UsageWindowSpan::Days(7),
                ),
            ],
        )],
    )
}

/// Returns the current snapshot, or a source error when none is set.
#[derive(Default)]
struct FakeSource {
    snapshot: Mutex<Option<QuotaSnapshot>>,
    fetches: AtomicUsize,
    closed: AtomicBool,
}

impl FakeSource {
    fn with(snapshot: QuotaSnapshot) -> Arc<Self> {
        let source = Self::default();
        source.set(Some(snapshot));
        Arc::new(source)
    }

    fn set(&self, snapshot: Option<QuotaSnapshot>) {
        *self.snapshot.lock().unwrap() = snapshot;
    }
}

#[async_trait]
impl QuotaSource for FakeSource {
    async fn fetch_quota(&self) -> Result<QuotaSnapshot, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.snapshot
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| SourceError::for_provider("claude", "HTTP 503"))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Accepts or rejects every post and records the payload type.
#[derive(Default)]
struct FakeTransport {
    failing: AtomicBool,
    sent: Mutex<Vec<Value>>,
}

impl FakeTransport {
    fn sent_types(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|b| b["quota_watch"]["type"].as_str().unwrap_or("").to_string())
            .collect()
    }
}

#[async_trait]
impl WebhookTransport for FakeTransport {
    async fn post_json(&self, _url: &str, body: &Value) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("HTTP 502");
        }
        self.sent.lock().unwrap().push(body.clone());
        Ok(())
    }
}

struct Harness {
    source: Arc<FakeSource>,
    store: Arc<MemoryStateStore>,
    transport: Arc<FakeTransport>,
    clock: Arc<FixedClock>,
}

impl Harness {
    fn new(snapshot: QuotaSnapshot) -> Self {
        Self {
            clock: Arc::new(FixedClock::new(snapshot.captured_at)),
            source: FakeSource::with(snapshot),
            store: Arc::new(MemoryStateStore::new()),
            transport: Arc::new(FakeTransport::default()),
        }
    }

    fn monitor(&self, webhooks: &[&str]) -> Monitor {
        Monitor::new(
            self.source.clone(),
            self.store.clone(),
            WebhookNotifier::new(webhooks.iter().copied(), self.transport.clone()),
            self.clock.clone(),
        )
    }
}

const HOOK: &[&str] = &["https://hooks.example.com/1"];

#[tokio::test]
async fn test_cycle_alerts_short_window_only() {
    let harness = Harness::new(snapshot(at(12, 0), 82.0, 15.0));
    let mut monitor = harness.monitor(HOOK);

    let outcome = monitor.run_cycle().await.unwrap();

    assert_eq!(outcome.alerts_sent, 1);
    assert!(outcome.state_saved);
    assert_eq!(outcome.to_string(), "sent 1 alert(s)");
    let state = harness.store.snapshot().unwrap();
    assert_eq!(state.len(), 1);
    assert!(state.contains(&StateKey::from("claude:5-hour"), Tier(80)));
    assert!(!state.has_entry(&StateKey::from("claude:7-day")));

    let sent = harness.transport.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["quota_watch"]["tier"], 80);
    assert_eq!(sent[0]["quota_watch"]["sibling"]["period"], "7-day");
}

#[tokio::test]
async fn test_repeated_cycle_is_all_clear() {
    let harness = Harness::new(snapshot(at(12, 0), 82.0, 15.0));
    let mut monitor = harness.monitor(HOOK);

    monitor.run_cycle().await.unwrap();
    let outcome = monitor.run_cycle().await.unwrap();

    assert_eq!(outcome.to_string(), "all clear");
    assert!(!outcome.state_saved);
    assert_eq!(harness.transport.sent_types(), vec!["alert"]);
}

#[tokio::test]
async fn test_undelivered_alert_leaves_state_and_retries() {
    let harness = Harness::new(snapshot(at(12, 0), 82.0, 15.0));
    let mut monitor = harness.monitor(HOOK);
    harness.transport.failing.store(true, Ordering::SeqCst);

    let outcome = monitor.run_cycle().await.unwrap();

    assert_eq!(outcome.alerts_undelivered, 1);
    assert!(!outcome.state_saved);
    assert_eq!(harness.store.snapshot(), None);

    harness.transport.failing.store(false, Ordering::SeqCst);
    let outcome = monitor.run_cycle().await.unwrap();

    assert_eq!(outcome.alerts_sent, 1);
    assert!(harness
        .store
        .snapshot()
        .unwrap()
        .contains(&StateKey::from("claude:5-hour"), Tier(80)));
}

#[tokio::test]
async fn test_hysteresis_is_saved_without_alerts() {
    let harness = Harness::new(snapshot(at(12, 0), 15.0, 10.0));
    let mut initial = AlertState::new();
    initial.record(StateKey::from("claude:5-hour"), Tier(20));
    initial.record(StateKey::from("claude:5-hour"), Tier(80));
    let store = Arc::new(MemoryStateStore::with_state(initial));
    let mut monitor = Monitor::new(
        harness.source.clone(),
        store.clone(),
        WebhookNotifier::new(HOOK.iter().copied(), harness.transport.clone()),
        harness.clock.clone(),
    );

    let outcome = monitor.run_cycle().await.unwrap();

    assert_eq!(outcome.to_string(), "all clear");
    assert!(outcome.state_saved);
    assert!(store.snapshot().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_webhooks_is_configuration_error() {
    let harness = Harness::new(snapshot(at(12, 0), 82.0, 15.0));
    let mut monitor = harness.monitor(&[]);

    let err = monitor.run_cycle().await.unwrap_err();

    assert!(err.downcast_ref::<ConfigurationError>().is_some());
    assert_eq!(harness.store.snapshot(), None);
}

#[tokio::test]
async fn test_missing_webhooks_is_fine_when_nothing_to_send() {
    let harness = Harness::new(snapshot(at(12, 0), 5.0, 5.0));
    let mut monitor = harness.monitor(&[]);

    let outcome = monitor.run_cycle().await.unwrap();

    assert_eq!(outcome.to_string(), "all clear");
}

#[tokio::test]
async fn test_source_error_fails_cycle() {
    let harness = Harness::new(snapshot(at(12, 0), 82.0, 15.0));
    harness.source.set(None);
    let mut monitor = harness.monitor(HOOK);

    let err = monitor.run_cycle().await.unwrap_err();

    assert!(err.downcast_ref::<SourceError>().is_some());
    assert!(err.downcast_ref::<ConfigurationError>().is_none());
    assert!(harness.transport.sent_types().is_empty());
}

#[tokio::test]
async fn test_daily_report_once_per_local_day() {
    let harness = Harness::new(snapshot(at(9, 30), 5.0, 5.0));
    let mut monitor = harness
        .monitor(HOOK)
        .with_reports(ReportScheduler::new(9, chrono_tz::UTC));

    let first = monitor.run_cycle().await.unwrap();
    let date = at(9, 30).date_naive();
    assert_eq!(first.report, ReportOutcome::Sent(date));
    assert_eq!(first.to_string(), "sent daily report for 2024-01-01");

    harness.clock.set(at(9, 45));
    let second = monitor.run_cycle().await.unwrap();
    assert_eq!(second.report, ReportOutcome::NotDue);

    harness
        .clock
        .set(Utc.with_ymd_and_hms(2024, 1, 2, 9, 1, 0).unwrap());
    let third = monitor.run_cycle().await.unwrap();
    assert!(matches!(third.report, ReportOutcome::Sent(_)));
    assert_eq!(harness.transport.sent_types(), vec!["report", "report"]);
}

#[tokio::test]
async fn test_undelivered_report_is_retried_within_the_hour() {
    let harness = Harness::new(snapshot(at(9, 0), 5.0, 5.0));
    let mut monitor = harness
        .monitor(HOOK)
        .with_reports(ReportScheduler::new(9, chrono_tz::UTC));
    harness.transport.failing.store(true, Ordering::SeqCst);

    let first = monitor.run_cycle().await.unwrap();
    assert!(matches!(first.report, ReportOutcome::Undelivered(_)));

    harness.transport.failing.store(false, Ordering::SeqCst);
    harness.clock.set(at(9, 5));
    let second = monitor.run_cycle().await.unwrap();
    assert!(matches!(second.report, ReportOutcome::Sent(_)));
}

#[tokio::test]
async fn test_run_once_closes_source() {
    let harness = Harness::new(snapshot(at(12, 0), 82.0, 15.0));

    let outcome = harness.monitor(HOOK).run_once().await.unwrap();

    assert_eq!(outcome.alerts_sent, 1);
    assert!(harness.source.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_loop_survives_failed_cycles_and_stops_cleanly() {
    let harness = Harness::new(snapshot(at(12, 0), 5.0, 5.0));
    harness.source.set(None);
    let handle = harness
        .monitor(HOOK)
        .with_interval(Duration::from_millis(10))
        .start();

    for _ in 0..500 {
        if harness.source.fetches.load(Ordering::SeqCst) >= 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(harness.source.fetches.load(Ordering::SeqCst) >= 3);

    handle.stop().await.unwrap();
    assert!(harness.source.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_loop_exits_on_configuration_error() {
    let harness = Harness::new(snapshot(at(12, 0), 82.0, 15.0));
    let handle = harness
        .monitor(&[])
        .with_interval(Duration::from_secs(3600))
        .start();

    let err = handle.wait().await.unwrap_err();

    assert!(err.downcast_ref::<ConfigurationError>().is_some());
    assert!(harness.source.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_stop_interrupts_long_sleep() {
    let harness = Harness::new(snapshot(at(12, 0), 5.0, 5.0));
    let handle = harness
        .monitor(HOOK)
        .with_interval(Duration::from_secs(3600))
        .start();

    handle.stop().await.unwrap();

    assert_eq!(harness.source.fetches.load(Ordering::SeqCst), 1);
}

#[test]
fn test_outcome_display_combines_parts() {
    let outcome = CycleOutcome {
        alerts_sent: 2,
        alerts_undelivered: 1,
        state_saved: true,
        report: ReportOutcome::Undelivered(at(9, 0).date_naive()),
    };
    assert_eq!(
        outcome.to_string(),
        "sent 2 alert(s), 1 alert(s) undelivered, will retry, daily report for 2024-01-01 undelivered, will retry"
    );
}
