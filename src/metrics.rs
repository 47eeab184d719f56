//! Run metrics for the cleaning step.
//!
//! A Prometheus recorder is installed in-process (no listener: the step is a
//! short-lived batch job). At the end of a run the rendered snapshot can be
//! pushed to a Pushgateway.

use crate::cleaning::{DateReport, FilterReport};
use crate::constants::{ENV_PUSHGATEWAY_URL, JOB_TYPE};
use crate::registry::ArtifactManifest;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::{Once, OnceLock};
use std::time::Duration;
use tracing::{info, warn};

static INIT: Once = Once::new();
static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Build metric names as `basic_cleaning_{phase}_{name}[_total]`.
macro_rules! cleaning_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("basic_cleaning_", $phase, "_", $name, "_total")
    };
    (gauge, $phase:literal, $name:literal) => {
        concat!("basic_cleaning_", $phase, "_", $name)
    };
}

/// Install the recorder. Idempotent.
pub fn init_metrics() {
    INIT.call_once(|| match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = HANDLE.set(handle);
            register_metrics();
        }
        Err(e) => warn!("Failed to install Prometheus recorder: {}", e),
    });
}

fn register_metrics() {
    let _ = ::metrics::counter!(cleaning_metric!(counter, "load", "rows"));
    let _ = ::metrics::counter!(cleaning_metric!(counter, "filter", "rows_dropped"));
    let _ = ::metrics::counter!(cleaning_metric!(counter, "filter", "rows_unparsable"));
    let _ = ::metrics::counter!(cleaning_metric!(counter, "convert", "dates_parsed"));
    let _ = ::metrics::counter!(cleaning_metric!(counter, "convert", "dates_missing"));
    let _ = ::metrics::counter!(cleaning_metric!(counter, "publish", "artifacts"));
    let _ = ::metrics::counter!(cleaning_metric!(counter, "run", "success"));
    let _ = ::metrics::counter!(cleaning_metric!(counter, "run", "failure"));
    let _ = ::metrics::gauge!(cleaning_metric!(gauge, "filter", "rows_kept"));
    let _ = ::metrics::gauge!(cleaning_metric!(gauge, "publish", "last_bytes"));
}

pub fn rows_loaded(count: usize) {
    ::metrics::counter!(cleaning_metric!(counter, "load", "rows")).increment(count as u64);
}

pub fn filter_applied(report: &FilterReport) {
    ::metrics::counter!(cleaning_metric!(counter, "filter", "rows_dropped")).increment(report.dropped as u64);
    ::metrics::counter!(cleaning_metric!(counter, "filter", "rows_unparsable")).increment(report.unparsable as u64);
    ::metrics::gauge!(cleaning_metric!(gauge, "filter", "rows_kept")).set(report.kept as f64);
}

pub fn dates_converted(report: &DateReport) {
    ::metrics::counter!(cleaning_metric!(counter, "convert", "dates_parsed")).increment(report.parsed as u64);
    ::metrics::counter!(cleaning_metric!(counter, "convert", "dates_missing")).increment(report.missing as u64);
}

pub fn artifact_published(manifest: &ArtifactManifest) {
    ::metrics::counter!(cleaning_metric!(counter, "publish", "artifacts")).increment(1);
    ::metrics::gauge!(cleaning_metric!(gauge, "publish", "last_bytes")).set(manifest.payload.size_bytes as f64);
}

pub fn run_finished(success: bool) {
    if success {
        ::metrics::counter!(cleaning_metric!(counter, "run", "success")).increment(1);
    } else {
        ::metrics::counter!(cleaning_metric!(counter, "run", "failure")).increment(1);
    }
}

/// Current snapshot in Prometheus text format, if the recorder is installed.
pub fn render() -> Option<String> {
    HANDLE.get().map(|h| h.render())
}

/// Push the current snapshot to the Pushgateway named by
/// `CLEANING_PUSHGATEWAY_URL`. Failures are logged and otherwise ignored.
pub fn push_to_gateway(instance: &str) {
    let base = match std::env::var(ENV_PUSHGATEWAY_URL) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => {
            info!("pushgateway: {} not configured, skipping push", ENV_PUSHGATEWAY_URL);
            return;
        }
    };
    let Some(body) = render() else {
        warn!("pushgateway: metrics recorder not installed, nothing to push");
        return;
    };

    let url = push_url(&base, instance);
    let client = match reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            warn!("pushgateway: could not build HTTP client: {}", e);
            return;
        }
    };

    info!("pushgateway: pushing {} bytes to {}", body.len(), url);
    match client
        .post(&url)
        .header("Content-Type", "text/plain; version=0.0.4")
        .body(body)
        .send()
    {
        Ok(r) if r.status().is_success() => info!("pushgateway: pushed metrics for instance={}", instance),
        Ok(r) => warn!("pushgateway: push failed with status={} for instance={}", r.status().as_u16(), instance),
        Err(e) => warn!("pushgateway: push request failed: {} for instance={}", e, instance),
    }
}

fn push_url(base: &str, instance: &str) -> String {
    format!(
        "{}/metrics/job/{}/instance/{}",
        base.trim_end_matches('/'),
        JOB_TYPE,
        instance
    )
}
