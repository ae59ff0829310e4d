//! Prometheus Metrics Module
//!
//! Exposes ingestion metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Quotes**: quotes received from the feed and quotes rejected as invalid
//! - **Batches**: batches persisted and batches dropped after a write failure
//! - **Rows**: rows appended to the quote table
//! - **Latency**: batch write duration and quote receive lag
//!
//! The recording functions are no-ops until a recorder is installed, so
//! tests and the `check` command can call them freely.

use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

// =============================================================================
// Exporter
// =============================================================================

static EXPORTER_INSTALLED: OnceLock<SocketAddr> = OnceLock::new();

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
///
/// Must be called from within a Tokio runtime. Subsequent calls are no-ops.
///
/// # Errors
///
/// Returns an error if the recorder or HTTP listener cannot be installed.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    if EXPORTER_INSTALLED.get().is_some() {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    register_metrics();
    let _ = EXPORTER_INSTALLED.set(addr);
    tracing::info!(%addr, "Prometheus exporter listening");
    Ok(())
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "quote_recorder_quotes_received_total",
        "Total quotes received from the feed"
    );
    describe_counter!(
        "quote_recorder_quotes_rejected_total",
        "Total quotes rejected as invalid before buffering"
    );
    describe_counter!(
        "quote_recorder_batches_persisted_total",
        "Total batches committed to the quote table"
    );
    describe_counter!(
        "quote_recorder_batches_dropped_total",
        "Total batches discarded after a write failure"
    );
    describe_counter!(
        "quote_recorder_rows_written_total",
        "Total rows appended to the quote table"
    );
    describe_gauge!(
        "quote_recorder_buffered_quotes",
        "Quotes currently waiting in the batching buffer"
    );
    describe_histogram!(
        "quote_recorder_persist_seconds",
        "Time to commit one batch"
    );
    describe_histogram!(
        "quote_recorder_receive_lag_seconds",
        "Local receive time minus quote event time"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a quote received from the feed.
pub fn record_quote_received(symbol: &str) {
    counter!(
        "quote_recorder_quotes_received_total",
        "symbol" => symbol.to_string()
    )
    .increment(1);
}

/// Record how far behind the event time a quote arrived.
///
/// Negative lag (host clock behind the exchange) is recorded as is.
#[allow(clippy::cast_precision_loss)]
pub fn record_receive_lag(lag: chrono::TimeDelta) {
    histogram!("quote_recorder_receive_lag_seconds").record(lag.num_milliseconds() as f64 / 1000.0);
}

/// Record a quote rejected by validation.
pub fn record_quote_rejected() {
    counter!("quote_recorder_quotes_rejected_total").increment(1);
}

/// Record a committed batch.
pub fn record_batch_persisted(rows: u64, duration: Duration) {
    counter!("quote_recorder_batches_persisted_total").increment(1);
    counter!("quote_recorder_rows_written_total").increment(rows);
    histogram!("quote_recorder_persist_seconds").record(duration.as_secs_f64());
}

/// Record a batch dropped after a write failure.
pub fn record_batch_dropped(error_type: &'static str) {
    counter!(
        "quote_recorder_batches_dropped_total",
        "error_type" => error_type
    )
    .increment(1);
}

/// Update the buffered quote gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_buffered_quotes(count: usize) {
    gauge!("quote_recorder_buffered_quotes").set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_noop() {
        record_quote_received("AAPL");
        record_quote_rejected();
        record_receive_lag(chrono::TimeDelta::milliseconds(-40));
        record_batch_persisted(5, Duration::from_millis(3));
        record_batch_dropped("query");
        set_buffered_quotes(2);
    }
}
