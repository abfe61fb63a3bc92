//! Prometheus metrics for the request pipeline.
//!
//! Recording goes through the `metrics` facade and costs nothing until a
//! recorder is installed. Hosts that want Prometheus output install one with
//! [`install_prometheus_recorder`] and serve [`PrometheusHandle::render`]
//! however they like.
//!
//! # Example
//!
//! ```rust,no_run
//! use jxn_runtime::metrics::install_prometheus_recorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! if let Some(handle) = install_prometheus_recorder()? {
//!     println!("{}", handle.render());
//! }
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Register descriptions for every metric the pipeline records.
pub fn describe_metrics() {
    describe_counter!("jxn.requests.submitted", "Network attempts started");
    describe_counter!("jxn.requests.retried", "Network attempts retried after a failure");
    describe_counter!(
        "jxn.requests.failed",
        "Requests that ended in an error status or exhausted their retry budget"
    );
    describe_counter!("jxn.requests.completed", "Requests completed");
    describe_counter!("jxn.requests.aborted", "Requests aborted by the caller");

    describe_counter!("jxn.commands.executed", "Commands whose handler succeeded");
    describe_counter!("jxn.commands.unknown", "Commands without a registered handler");
    describe_counter!("jxn.commands.failed", "Commands whose handler failed or panicked");
    describe_counter!("jxn.queue.paused", "Command queue pauses");

    describe_gauge!("jxn.send_queue.depth", "Requests in the send queue");
    describe_gauge!("jxn.receive_queue.depth", "Responses buffered in the receive queue");
}

/// Install a Prometheus recorder as the global recorder.
///
/// Returns `None` when a recorder is already installed (typically in tests);
/// metrics keep flowing to that recorder.
///
/// # Errors
///
/// Returns [`MetricsError::Install`] if the recorder cannot be installed for
/// any other reason.
pub fn install_prometheus_recorder() -> Result<Option<PrometheusHandle>, MetricsError> {
    describe_metrics();

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            tracing::info!("Prometheus metrics recorder installed");
            Ok(Some(handle))
        },
        Err(err) => {
            let message = err.to_string();
            if message.contains("already") {
                tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                Ok(None)
            } else {
                Err(MetricsError::Install(message))
            }
        },
    }
}

/// Request metrics recorder.
pub struct RequestMetrics;

impl RequestMetrics {
    /// Record a network attempt.
    pub fn record_submitted() {
        counter!("jxn.requests.submitted").increment(1);
    }

    /// Record a retried network attempt.
    pub fn record_retry() {
        counter!("jxn.requests.retried").increment(1);
    }

    /// Record a failed request.
    pub fn record_failure() {
        counter!("jxn.requests.failed").increment(1);
    }

    /// Record a completed request.
    pub fn record_completed() {
        counter!("jxn.requests.completed").increment(1);
    }

    /// Record an aborted request.
    pub fn record_aborted() {
        counter!("jxn.requests.aborted").increment(1);
    }
}

/// Command metrics recorder.
pub struct CommandMetrics;

impl CommandMetrics {
    /// Record a successful command.
    pub fn record_executed() {
        counter!("jxn.commands.executed").increment(1);
    }

    /// Record a command without a handler.
    pub fn record_unknown() {
        counter!("jxn.commands.unknown").increment(1);
    }

    /// Record a failed command.
    pub fn record_failure() {
        counter!("jxn.commands.failed").increment(1);
    }

    /// Record a queue pause.
    pub fn record_pause() {
        counter!("jxn.queue.paused").increment(1);
    }
}

/// Queue depth recorder.
pub struct QueueMetrics;

impl QueueMetrics {
    /// Record the send queue depth.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_send_depth(depth: usize) {
        gauge!("jxn.send_queue.depth").set(depth as f64);
    }

    /// Record the receive queue depth.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_receive_depth(depth: usize) {
        gauge!("jxn.receive_queue.depth").set(depth as f64);
    }
}
