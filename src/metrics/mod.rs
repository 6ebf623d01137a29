//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Search throughput and matches
//! - Filler and target submissions
//! - Confirmations, retries and failures

use crate::error::{VanityError, VanityResult};

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    // Search metrics
    pub static ref SEARCH_ATTEMPTS: CounterVec = register_counter_vec!(
        "vanity_search_attempts_total",
        "Total signing attempts of completed searches",
        &["chain_id"]
    ).unwrap();

    pub static ref SEARCH_IN_PROGRESS: GaugeVec = register_gauge_vec!(
        "vanity_search_current_attempts",
        "Attempts so far in the running search",
        &["chain_id"]
    ).unwrap();

    pub static ref SEARCH_MATCHES: CounterVec = register_counter_vec!(
        "vanity_search_matches_total",
        "Total searches that found a matching hash",
        &["chain_id"]
    ).unwrap();

    pub static ref SEARCH_DURATION: HistogramVec = register_histogram_vec!(
        "vanity_search_duration_seconds",
        "Wall time from search start to match",
        &["chain_id"],
        vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 3600.0]
    ).unwrap();

    // Filler metrics
    pub static ref FILLERS_SUBMITTED: CounterVec = register_counter_vec!(
        "vanity_fillers_submitted_total",
        "Total filler transactions accepted by the node",
        &["chain_id"]
    ).unwrap();

    pub static ref FILLERS_FAILED: CounterVec = register_counter_vec!(
        "vanity_fillers_failed_total",
        "Total filler submissions that aborted a gap fill",
        &["chain_id"]
    ).unwrap();

    // Broadcast metrics
    pub static ref TX_BROADCAST: CounterVec = register_counter_vec!(
        "vanity_transactions_broadcast_total",
        "Total target transactions accepted as new",
        &["chain_id"]
    ).unwrap();

    pub static ref TX_ALREADY_KNOWN: CounterVec = register_counter_vec!(
        "vanity_transactions_already_known_total",
        "Total submissions the node already held",
        &["chain_id", "kind"]
    ).unwrap();

    pub static ref TX_CONFIRMED: CounterVec = register_counter_vec!(
        "vanity_transactions_confirmed_total",
        "Total target transactions with a receipt",
        &["chain_id"]
    ).unwrap();

    pub static ref CONFIRMATION_LATENCY: HistogramVec = register_histogram_vec!(
        "vanity_confirmation_latency_seconds",
        "Time from broadcast to receipt",
        &["chain_id"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    ).unwrap();

    // Error metrics
    pub static ref RPC_RETRIES: CounterVec = register_counter_vec!(
        "vanity_rpc_retries_total",
        "Total retried RPC operations",
        &["operation"]
    ).unwrap();

    pub static ref SEQUENCE_FAILURES: CounterVec = register_counter_vec!(
        "vanity_sequence_failures_total",
        "Total failed sequences by the stage they failed in",
        &["stage"]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> VanityResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app)
            .await
            .map_err(|e| VanityError::Internal(format!("Metrics server stopped: {}", e)))
    }
}

async fn metrics_handler() -> Result<String, (StatusCode, String)> {
    render().map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// Text exposition of every registered metric
pub fn render() -> VanityResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| VanityError::Internal(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| VanityError::Internal(format!("Metrics are not UTF-8: {}", e)))
}

// Helper functions to record metrics

/// `attempts` is the running total of the search reporting it
pub fn record_search_progress(chain_id: u64, attempts: u64) {
    SEARCH_IN_PROGRESS
        .with_label_values(&[&chain_id.to_string()])
        .set(attempts as f64);
}

pub fn record_search_match(chain_id: u64, attempts: u64, duration_secs: f64) {
    let chain = chain_id.to_string();
    SEARCH_ATTEMPTS.with_label_values(&[&chain]).inc_by(attempts as f64);
    SEARCH_IN_PROGRESS.with_label_values(&[&chain]).set(0.0);
    SEARCH_MATCHES.with_label_values(&[&chain]).inc();
    SEARCH_DURATION
        .with_label_values(&[&chain])
        .observe(duration_secs);
}

pub fn record_filler_submitted(chain_id: u64) {
    FILLERS_SUBMITTED
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_filler_failed(chain_id: u64) {
    FILLERS_FAILED
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_broadcast(chain_id: u64) {
    TX_BROADCAST
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_already_known(chain_id: u64, kind: &str) {
    TX_ALREADY_KNOWN
        .with_label_values(&[&chain_id.to_string(), kind])
        .inc();
}

pub fn record_confirmation(chain_id: u64, latency_secs: f64) {
    let chain = chain_id.to_string();
    TX_CONFIRMED.with_label_values(&[&chain]).inc();
    CONFIRMATION_LATENCY
        .with_label_values(&[&chain])
        .observe(latency_secs);
}

pub fn record_retry(operation: &str) {
    RPC_RETRIES.with_label_values(&[operation]).inc();
}

pub fn record_failure(stage: &str) {
    SEQUENCE_FAILURES.with_label_values(&[stage]).inc();
}
