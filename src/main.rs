mod account_usage;
mod alerts;
mod clock;
mod config;
mod errors;
mod logging;
mod monitor;
mod notify;
mod quota_paths;
mod report;
mod snapshot;
mod status;
mod usage_window;

use account_usage::{AccountQuotaSource, QuotaSource};
use alerts::state::{AlertStateStore, FileStateStore, MemoryStateStore};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clock::{Clock, SystemClock};
use config::MonitorConfig;
use monitor::Monitor;
use notify::{DryRunTransport, Payload, UreqTransport, WebhookNotifier};
use report::ReportScheduler;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "quota-watch")]
#[command(about = "Watches AI subscription quotas and alerts webhooks on threshold crossings")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("QUOTA_WATCH_GIT_SHA"), ")"))]
#[command(arg_required_else_help = true)]
struct Cli {
    /// Config file (defaults to ~/.quota-watch/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll quotas and send alerts until interrupted
    Monitor {
        /// Run a single cycle and exit (for cron)
        #[arg(long)]
        once: bool,
        /// Log alerts instead of posting them and keep alert state in memory
        #[arg(long)]
        dry_run: bool,
    },
    /// Print current quota usage
    Status {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Forget every alert already sent
    ResetState,
    /// Send a test message to every configured webhook
    TestWebhook,
    /// Print an annotated sample config
    InitConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_file = quota_paths::monitor_log_path()
        .map_err(|e| eprintln!("[quota-watch] Warning: file logging disabled: {:#}", e))
        .ok();
    logging::init(log_file.as_deref())?;

    let config_path = cli.config.as_deref();

    match cli.command {
        Command::InitConfig => {
            print!("{}", MonitorConfig::sample_yaml());
            Ok(())
        }
        Command::Monitor { once, dry_run } => {
            let config = MonitorConfig::load_for_cli(config_path)?;
            run_monitor(config, once, dry_run).await
        }
        Command::Status { json } => {
            let config = MonitorConfig::load_for_cli(config_path)?;
            run_status(&config, json).await
        }
        Command::ResetState => {
            let config = MonitorConfig::load_for_cli(config_path)?;
            let store = FileStateStore::new(config.resolved_state_path()?);
            let previous = store.load();
            if previous.is_empty() {
                println!("No alert state to clear: {}", store.path().display());
                return Ok(());
            }
            store.reset()?;
            println!(
                "Cleared alert state for {} window(s): {}",
                previous.len(),
                store.path().display()
            );
            Ok(())
        }
        Command::TestWebhook => {
            let config = MonitorConfig::load_for_cli(config_path)?;
            run_test_webhook(&config).await
        }
    }
}

fn build_source(config: &MonitorConfig, clock: Arc<dyn Clock>) -> Arc<dyn QuotaSource> {
    Arc::new(AccountQuotaSource::new(config.providers.enabled(), clock))
}

fn build_notifier(config: &MonitorConfig) -> WebhookNotifier {
    WebhookNotifier::new(&config.webhooks, Arc::new(UreqTransport::new()))
}

/// A notifier that logs every payload. Without configured webhooks it still
/// has one destination so alerts are not a configuration error.
fn build_dry_run_notifier(config: &MonitorConfig) -> WebhookNotifier {
    let destinations = if config.webhooks.is_empty() {
        vec!["dry-run".to_string()]
    } else {
        config.webhooks.clone()
    };
    WebhookNotifier::new(destinations, Arc::new(DryRunTransport))
}

async fn run_monitor(config: MonitorConfig, once: bool, dry_run: bool) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let notifier = if dry_run {
        build_dry_run_notifier(&config)
    } else {
        build_notifier(&config)
    };
    if notifier.destinations().is_empty() {
        tracing::warn!("No webhooks configured; the monitor stops at the first alert");
    }

    let store: Arc<dyn AlertStateStore> = if dry_run {
        tracing::info!("Dry run: payloads are logged and alert state is kept in memory");
        Arc::new(MemoryStateStore::new())
    } else {
        Arc::new(FileStateStore::new(config.resolved_state_path()?))
    };

    let mut monitor = Monitor::new(
        build_source(&config, clock.clone()),
        store,
        notifier,
        clock,
    )
    .with_ladder(config.tier_ladder()?)
    .with_interval(config.poll_interval());
    if let Some(hour) = config.report_hour {
        monitor = monitor.with_reports(ReportScheduler::new(hour, config.timezone()?));
    }

    if once {
        let outcome = monitor.run_once().await?;
        println!("{}", outcome);
        return Ok(());
    }

    let mut handle = monitor.start();
    tokio::select! {
        result = handle.finished() => result,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            tracing::info!("Interrupt received, stopping after the current cycle");
            handle.stop().await
        }
    }
}

async fn run_status(config: &MonitorConfig, json: bool) -> Result<()> {
    let source = build_source(config, Arc::new(SystemClock));
    let snapshot = source
        .fetch_quota()
        .await
        .context("Failed to fetch quota snapshot")?;
    source.close().await;

    let state = FileStateStore::new(config.resolved_state_path()?).load();
    let view = status::StatusView::new(&snapshot, &state);
    if json {
        println!("{}", view.to_json()?);
    } else {
        print!("{}", view.to_text());
    }
    Ok(())
}

async fn run_test_webhook(config: &MonitorConfig) -> Result<()> {
    let notifier = build_notifier(config);
    let payload = Payload::Test {
        message: "quota-watch webhook test".to_string(),
        sent_at: SystemClock.now(),
    };
    let report = notifier.notify(&payload).await?;
    for destination in &report.delivered {
        println!("ok      {}", destination);
    }
    for failure in &report.failures {
        println!("failed  {}", failure);
    }
    if report.is_partial() {
        tracing::warn!(
            failed = report.failures.len(),
            "Some webhooks did not accept the test message"
        );
    }
    Ok(())
}
