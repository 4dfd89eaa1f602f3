//! One full watch cycle: fetch dates, decide, notify.

use chrono::NaiveDate;
use tracing::{info, instrument};

use crate::alert::{alert_message, should_alert};
use crate::error::Result;
use crate::notify::Notifier;
use crate::orchestrator::{DateSource, Orchestrator, SessionSource};

/// What a completed run observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Earliest candidate dates, provider order
    pub dates: Vec<NaiveDate>,
    /// Date held when the run made its decision
    pub target_date: NaiveDate,
    /// Whether an alert was sent
    pub alerted: bool,
}

/// Entry point invoked by the scheduler.
pub struct Watcher<S, D, N> {
    orchestrator: Orchestrator<S, D>,
    notifier: N,
}

impl<S: SessionSource, D: DateSource, N: Notifier> Watcher<S, D, N> {
    pub fn new(orchestrator: Orchestrator<S, D>, notifier: N) -> Self {
        Self {
            orchestrator,
            notifier,
        }
    }

    /// Run one authenticate → fetch → decide → notify cycle.
    ///
    /// Safe to call repeatedly; each call re-reads the credential file, so a
    /// missing or unreadable record fails with `ConfigMissing`. Callers must
    /// not run two cycles against the same store concurrently.
    #[instrument(skip_all)]
    pub async fn run_once(&self) -> Result<RunReport> {
        let outcome = self.cycle().await;
        let label = match &outcome {
            Ok(report) if report.alerted => "alerted",
            Ok(_) => "no_alert",
            Err(_) => "failed",
        };
        metrics::counter!("watch_runs_total", "outcome" => label).increment(1);
        outcome
    }

    async fn cycle(&self) -> Result<RunReport> {
        let dates = self.orchestrator.available_dates().await?;
        let record = self.orchestrator.store().snapshot().await;
        let earliest = dates.first().copied();
        let alerted = should_alert(earliest, record.target_date);

        info!(
            dates = ?dates,
            target_date = %record.target_date,
            should_alert = alerted,
            "available dates"
        );

        if let (true, Some(candidate)) = (alerted, earliest) {
            let body = alert_message(candidate, record.target_date);
            self.notifier.send(&body, &record.identity.phone).await?;
            metrics::counter!("watch_alerts_total").increment(1);
        }

        Ok(RunReport {
            dates,
            target_date: record.target_date,
            alerted,
        })
    }
}
