use std::env;
use std::sync::OnceLock;

use metrics::{Unit, describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{info, warn};

pub const METRICS_PORT_ENV: &str = "HIRE_METRICS_PORT";
pub const DEFAULT_METRICS_PORT: u16 = 9101;

/// Webhook requests by `mode` and `outcome`.
pub const INGESTION_TOTAL: &str = "hire_ingestion_total";
pub const INGESTION_DURATION_SECONDS: &str = "hire_ingestion_duration_seconds";
/// Rollups that found nothing to aggregate, by `target`.
pub const ROLLUP_SOFT_MISS_TOTAL: &str = "hire_rollup_soft_miss_total";
pub const REPORT_FAILURES_TOTAL: &str = "hire_report_failures_total";
/// Survey sends refused, by `reason`.
pub const SURVEY_SEND_REJECTED_TOTAL: &str = "hire_survey_send_rejected_total";

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn describe_metrics() {
    describe_counter!(INGESTION_TOTAL, Unit::Count, "Webhook requests handled");
    describe_histogram!(
        INGESTION_DURATION_SECONDS,
        Unit::Seconds,
        "Wall time of one webhook request"
    );
    describe_counter!(ROLLUP_SOFT_MISS_TOTAL, Unit::Count, "Rollups with no source rows");
    describe_counter!(REPORT_FAILURES_TOTAL, Unit::Count, "Report generator failures");
    describe_counter!(SURVEY_SEND_REJECTED_TOTAL, Unit::Count, "Survey sends refused");
}

/// Initialize a Prometheus exporter listening on `0.0.0.0:<port>`. Must be
/// called from inside a Tokio runtime.
///
/// The port is resolved from the provided environment variable name or the
/// supplied `default_port`. Returns a handle to the exporter if it was started.
pub fn init_metrics(port_env: &str, default_port: u16) -> Option<&'static PrometheusHandle> {
    if let Some(existing) = PROMETHEUS_HANDLE.get() {
        return Some(existing);
    }

    let port = env::var(port_env)
        .ok()
        .and_then(|raw| raw.parse::<u16>().ok())
        .unwrap_or(default_port);

    // `install_recorder` alone never binds the listener; the exporter future
    // has to be driven on the runtime.
    let (recorder, exporter) = match PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .build()
    {
        Ok(parts) => parts,
        Err(err) => {
            warn!(error = %err, metrics_port = port, "failed to build prometheus exporter");
            return None;
        }
    };

    let handle = recorder.handle();
    if let Err(err) = metrics::set_global_recorder(recorder) {
        warn!(error = %err, "metrics recorder already installed");
        return None;
    }

    tokio::spawn(async move {
        if let Err(err) = exporter.await {
            warn!(error = ?err, "prometheus exporter stopped");
        }
    });

    let _ = PROMETHEUS_HANDLE.set(handle);
    describe_metrics();
    info!(metrics_port = port, "started prometheus exporter");
    PROMETHEUS_HANDLE.get()
}
