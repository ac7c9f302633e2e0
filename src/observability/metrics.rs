//! Metrics collection.
//!
//! Counters are recorded through the `metrics` facade wherever the
//! engine does something interesting; this module installs the global
//! recorder and describes what the names mean.

use std::sync::atomic::{AtomicBool, Ordering};

use metrics::describe_counter;
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::TimetrialError;

/// Guard to prevent double-initialization of the metrics recorder.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Installs the global metrics recorder.
///
/// When `port` is `Some`, a Prometheus scrape endpoint is served on
/// `127.0.0.1:<port>`. When `None`, the recorder is installed without
/// a listener and metrics are only recorded in-process.
///
/// # Errors
///
/// Returns `TimetrialError::Io` if the recorder or listener cannot be
/// installed (e.g. the port is taken).
pub fn init_metrics(port: Option<u16>) -> Result<(), TimetrialError> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        tracing::debug!("metrics already initialized, skipping");
        return Ok(());
    }

    port.map_or_else(
        || PrometheusBuilder::new().install_recorder().map(|_| ()),
        |p| {
            PrometheusBuilder::new()
                .with_http_listener(([127, 0, 0, 1], p))
                .install()
        },
    )
    .map_err(|e| TimetrialError::Io(std::io::Error::other(e.to_string())))?;

    describe_metrics();
    Ok(())
}

fn describe_metrics() {
    describe_counter!(
        "timetrial_races_started_total",
        "Total number of races started"
    );
    describe_counter!(
        "timetrial_completions_total",
        "Total number of team completions recorded"
    );
    describe_counter!("timetrial_resets_total", "Total number of race resets");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_without_listener_is_idempotent() {
        // Either this test or another caller installs the recorder
        // first; both orders must succeed.
        assert!(init_metrics(None).is_ok());
        assert!(init_metrics(None).is_ok());
    }
}
