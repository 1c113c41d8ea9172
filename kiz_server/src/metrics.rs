//! Prometheus metrics for the session endpoints.
//!
//! Metrics are exposed in Prometheus text format on a separate listener when
//! `--metrics-bind` / `METRICS_BIND` is set. Without an installed recorder the
//! recording functions are no-ops.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use kiz_server::metrics;
//! use std::net::SocketAddr;
//!
//! let addr: SocketAddr = "127.0.0.1:9090".parse().unwrap();
//! metrics::init_metrics(addr).unwrap();
//!
//! metrics::login_attempts_total(true);
//! ```

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Initialize Prometheus metrics exporter.
///
/// Metrics will be available at `http://<addr>/metrics`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Record HTTP request.
pub fn http_requests_total(method: &str, status: u16) {
    metrics::counter!("http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

// ============================================================================
// Session Metrics
// ============================================================================

/// Increment login attempts counter.
pub fn login_attempts_total(success: bool) {
    metrics::counter!("login_attempts_total",
        "success" => success.to_string()
    )
    .increment(1);
}

/// Increment refresh exchanges counter.
pub fn refreshes_total(success: bool) {
    metrics::counter!("token_refreshes_total",
        "success" => success.to_string()
    )
    .increment(1);
}

/// Increment logouts counter.
pub fn logouts_total(logout_all: bool, revoked: u64) {
    metrics::counter!("logouts_total",
        "scope" => if logout_all { "all" } else { "single" }
    )
    .increment(1);
    metrics::counter!("sessions_revoked_total").increment(revoked);
}

/// Increment authentication outcomes counter (`authenticated`, or the failure reason).
pub fn authentications_total(outcome: &'static str) {
    metrics::counter!("authentications_total",
        "outcome" => outcome
    )
    .increment(1);
}
