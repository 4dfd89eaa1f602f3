//! Visa appointment watcher
//!
//! Single-binary service that:
//! 1. Loads the service config and the credential record
//! 2. Waits for the next cron fire time plus a random delay
//! 3. Queries the portal for available dates, renewing the session once if it expired
//! 4. Texts the applicant when a date earlier than the held one appears

mod config;
mod metrics;
mod schedule;

use std::sync::Arc;
use std::time::Duration;

use ais_session::{CredentialStore, CredentialUpdate, DateFetcher, Negotiator, http_client};
use ais_watch::{
    DateSource, Notifier, Orchestrator, RunReport, SessionSource, TwilioNotifier, Watcher,
};
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use tracing::{Instrument, error, info, info_span, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::schedule::RunSchedule;

type PortalWatcher = Watcher<Negotiator, DateFetcher, TwilioNotifier>;

/// Command-line flags
#[derive(Debug, Default, PartialEq, Eq)]
struct Cli {
    config: Option<String>,
    /// Run one cycle and exit instead of following the schedule
    once: bool,
    /// Store a new held date in the record and exit
    set_target_date: Option<NaiveDate>,
}

fn parse_args(args: &[String]) -> Result<Cli> {
    let mut cli = Cli::default();
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let value = iter.next().context("--config requires a path")?;
                cli.config = Some(value.clone());
            }
            "--once" => cli.once = true,
            "--set-target-date" => {
                let value = iter
                    .next()
                    .context("--set-target-date requires a YYYY-MM-DD date")?;
                let date = value
                    .parse::<NaiveDate>()
                    .with_context(|| format!("invalid date {value:?}, expected YYYY-MM-DD"))?;
                cli.set_target_date = Some(date);
            }
            other => anyhow::bail!("unknown argument {other:?}"),
        }
    }
    Ok(cli)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let cli = parse_args(&args)?;

    let config_path = Config::resolve_path(cli.config.as_deref());
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        base_url = %config.provider.base_url,
        schedule_id = %config.provider.schedule_id,
        facility_id = config.provider.facility_id,
        state_path = %config.state.path.display(),
        cron = %config.schedule.cron,
        "configuration loaded"
    );

    let store = CredentialStore::load(config.state.path.clone())
        .await
        .with_context(|| {
            format!(
                "failed to load credential record from {}",
                config.state.path.display()
            )
        })?;
    let store = Arc::new(store);

    if let Some(date) = cli.set_target_date {
        store
            .commit(CredentialUpdate::target_date(date))
            .await
            .context("failed to store target date")?;
        info!(target_date = %date, "target date updated");
        return Ok(());
    }

    if let Some(addr) = config.metrics.listen_addr {
        metrics::install_exporter(addr)?;
        info!(%addr, "metrics exporter listening");
    }

    let watcher = build_watcher(&config, store).await?;

    if cli.once {
        return match run_cycle(&watcher, config.run_timeout()).await? {
            Some(_) => Ok(()),
            None => anyhow::bail!("watch run did not complete"),
        };
    }

    let schedule = RunSchedule::new(
        &config.schedule.cron,
        Duration::from_secs(config.schedule.max_jitter_secs),
    )?;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        let delay = schedule
            .next_delay(Utc::now())
            .context("cron expression has no upcoming fire time")?;
        info!(delay_secs = delay.as_secs(), "next run scheduled");

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = &mut shutdown => break,
        }

        tokio::select! {
            outcome = run_cycle(&watcher, config.run_timeout()) => {
                outcome?;
            }
            _ = &mut shutdown => {
                warn!("shutdown during run, abandoning it");
                break;
            }
        }
    }

    info!("shutdown complete");
    Ok(())
}

async fn build_watcher(config: &Config, store: Arc<CredentialStore>) -> Result<PortalWatcher> {
    let client = http_client(config.request_timeout()).context("failed to build HTTP client")?;
    let endpoints = config.endpoints();

    let mut negotiator = Negotiator::new(client.clone(), endpoints.clone());
    if let Some(label) = &config.provider.sign_in_label {
        negotiator = negotiator.with_sign_in_label(label.clone());
    }
    let fetcher = DateFetcher::new(client.clone(), endpoints, config.retry_policy());

    let notification = store.snapshot().await.notification;
    let notifier =
        TwilioNotifier::new(client, &notification).with_base_url(&config.notify.twilio_base_url);

    let orchestrator =
        Orchestrator::new(store, negotiator, fetcher).always_login(config.state.always_login);
    Ok(Watcher::new(orchestrator, notifier))
}

/// Run one watch cycle under a fresh `run_id` span.
///
/// Returns `Ok(None)` when the run failed or timed out in a way the next run
/// may recover from, and `Err` when the process should stop.
async fn run_cycle<S, D, N>(
    watcher: &Watcher<S, D, N>,
    run_timeout: Duration,
) -> Result<Option<RunReport>>
where
    S: SessionSource,
    D: DateSource,
    N: Notifier,
{
    let run_id = format!("run_{}", uuid::Uuid::new_v4().as_simple());
    let span = info_span!("watch_run", %run_id);

    let outcome = tokio::time::timeout(run_timeout, watcher.run_once())
        .instrument(span.clone())
        .await;
    let _entered = span.enter();

    match outcome {
        Ok(Ok(report)) => {
            metrics::record_success(Utc::now().timestamp());
            info!(
                alerted = report.alerted,
                candidates = report.dates.len(),
                "run complete"
            );
            Ok(Some(report))
        }
        Ok(Err(e)) if e.is_fatal() => {
            Err(anyhow::Error::new(e).context("credential record unusable, stopping"))
        }
        Ok(Err(e)) => {
            error!(error = %e, "run failed");
            Ok(None)
        }
        Err(_) => {
            warn!(timeout_secs = run_timeout.as_secs(), "run timed out");
            Ok(None)
        }
    }
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
