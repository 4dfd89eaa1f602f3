//! Prometheus metrics exposition
//!
//! Metrics recorded by the watcher:
//!
//! - `watch_runs_total` (counter): label `outcome` (`alerted`, `no_alert`, `failed`)
//! - `watch_reauth_total` (counter): session renegotiations
//! - `watch_alerts_total` (counter): SMS alerts sent
//! - `watch_last_success_timestamp_seconds` (gauge): unix time of the last completed run

use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder with a scrape listener on `addr`.
///
/// Must be called from inside the tokio runtime; the exporter spawns its
/// HTTP listener there.
pub fn install_exporter(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("failed to install Prometheus exporter on {addr}"))?;
    describe();
    Ok(())
}

fn describe() {
    metrics::describe_counter!("watch_runs_total", "Completed watch runs by outcome");
    metrics::describe_counter!("watch_reauth_total", "Session renegotiations");
    metrics::describe_counter!("watch_alerts_total", "SMS alerts sent");
    metrics::describe_gauge!(
        "watch_last_success_timestamp_seconds",
        "Unix time of the last run that finished without error"
    );
}

pub fn record_success(timestamp: i64) {
    metrics::gauge!("watch_last_success_timestamp_seconds").set(timestamp as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_success_does_not_panic_without_recorder() {
        record_success(1_756_684_800);
    }

    #[test]
    fn last_success_gauge_renders() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            describe();
            record_success(1_756_684_800);
        });

        let rendered = handle.render();
        assert!(
            rendered.contains("# TYPE watch_last_success_timestamp_seconds gauge"),
            "got: {rendered}"
        );
        assert!(rendered.contains("1756684800"), "got: {rendered}");
    }
}
