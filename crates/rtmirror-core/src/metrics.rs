//! Prometheus metrics helpers for rtmirror.
//!
//! # Usage
//!
//! ```rust,ignore
//! use rtmirror_core::metrics::{init_metrics, start_metrics_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let handle = init_metrics();
//!     start_metrics_server(9090, handle).await.unwrap();
//!
//!     metrics::counter!("relay_success_total").increment(1);
//! }
//! ```
//!
//! # Metric Naming Conventions
//!
//! - Prefix: component (`stream_`, `relay_`, `limiter_`)
//! - Suffix: unit or type (`_total`, `_seconds`)
//! - Labels: only small closed sets (`reason`, `stage`, `kind`)

use axum::{Router, routing::get};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

/// Initialize the Prometheus metrics recorder.
///
/// Must be called once at startup before any metrics are recorded.
///
/// # Panics
///
/// Panics if called more than once (the recorder can only be installed once).
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    register_metrics();

    handle
}

/// Like [`init_metrics`] but returns `None` if a recorder is already installed.
pub fn try_init_metrics() -> Option<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder().ok()?;
    register_metrics();
    Some(handle)
}

/// Start the Prometheus metrics HTTP server on `port`.
///
/// Binds before returning, then serves `/metrics` from a background task.
pub async fn start_metrics_server(
    port: u16,
    handle: PrometheusHandle,
) -> Result<SocketAddr, std::io::Error> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound = listener.local_addr()?;
    tracing::info!("Metrics server listening on http://{}/metrics", bound);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Metrics server stopped: {}", e);
        }
    });

    Ok(bound)
}

/// Register descriptions for every metric rtmirror emits.
fn register_metrics() {
    // =========================================================================
    // Stream connection
    // =========================================================================

    describe_counter!(
        "stream_connect_attempts_total",
        "Stream connection attempts, initial and reconnects"
    );
    describe_counter!(
        "stream_connect_failures_total",
        "Stream connection attempts that failed"
    );
    describe_counter!(
        "stream_reconnects_total",
        "Successful reconnections after a read failure"
    );
    describe_counter!(
        "stream_backoff_millis_total",
        "Total milliseconds spent sleeping between reconnect attempts"
    );
    describe_gauge!(
        "stream_connected",
        "Whether the stream is currently connected (1=yes, 0=no)"
    );

    // =========================================================================
    // Records
    // =========================================================================

    describe_counter!("stream_lines_total", "Non-blank lines read from the stream");
    describe_counter!(
        "stream_records_malformed_total",
        "Lines that did not decode into a record"
    );
    describe_counter!(
        "stream_records_rejected_total",
        "Well-formed records not eligible for relay (label: reason)"
    );
    describe_counter!(
        "stream_records_duplicate_total",
        "Records already handed to the pipeline earlier"
    );

    // =========================================================================
    // Relay
    // =========================================================================

    describe_counter!(
        "relay_rate_limited_total",
        "Records dropped because the relay window was full"
    );
    describe_counter!("relay_success_total", "Records persisted to the ledger");
    describe_counter!(
        "relay_failures_total",
        "Relay attempts that failed (label: stage)"
    );
    describe_counter!(
        "relay_ack_failures_total",
        "Replies that could not be sent (label: kind)"
    );
    describe_gauge!(
        "limiter_window_len",
        "Relay actions currently retained in the rate limiter window"
    );
}
