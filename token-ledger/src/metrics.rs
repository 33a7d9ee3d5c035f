//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `token_ledger_requests_accepted_total{step, key}` - Accepted requests
//! - `token_ledger_requests_rejected_total{kind}` - Rejected requests by error kind
//! - `token_ledger_request_duration_seconds` - Histogram of request processing latency
//! - `token_ledger_total_supply` - Total supply as last committed
//!
//! [`Metrics::serve`] answers every HTTP request on its listener with the
//! text exposition.

use crate::keys::StorageKey;
use crate::types::RequestStep;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Accepted requests by step and key kind
    pub requests_accepted: IntCounterVec,

    /// Rejected requests by error kind
    pub requests_rejected: IntCounterVec,

    /// Request processing latency
    pub request_duration: Histogram,

    /// Total supply (saturates at `i64::MAX`)
    pub total_supply: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let requests_accepted = IntCounterVec::new(
            Opts::new(
                "token_ledger_requests_accepted_total",
                "Total number of accepted requests",
            ),
            &["step", "key"],
        )?;
        registry.register(Box::new(requests_accepted.clone()))?;

        let requests_rejected = IntCounterVec::new(
            Opts::new(
                "token_ledger_requests_rejected_total",
                "Total number of rejected requests",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(requests_rejected.clone()))?;

        let request_duration = Histogram::with_opts(
            HistogramOpts::new(
                "token_ledger_request_duration_seconds",
                "Histogram of request processing latencies",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.010, 0.050, 0.100, 0.500]),
        )?;
        registry.register(Box::new(request_duration.clone()))?;

        let total_supply = IntGauge::new("token_ledger_total_supply", "Current total supply")?;
        registry.register(Box::new(total_supply.clone()))?;

        Ok(Self {
            requests_accepted,
            requests_rejected,
            request_duration,
            total_supply,
            registry,
        })
    }

    /// Record an accepted request
    pub fn record_accepted(&self, step: RequestStep, key: &StorageKey) {
        self.requests_accepted
            .with_label_values(&[step.as_str(), key.kind()])
            .inc();
    }

    /// Record a rejected request
    pub fn record_rejected(&self, error: &crate::Error) {
        self.requests_rejected.with_label_values(&[error.kind()]).inc();
    }

    /// Record processing duration
    pub fn record_duration(&self, duration_seconds: f64) {
        self.request_duration.observe(duration_seconds);
    }

    /// Update total supply gauge
    pub fn update_total_supply(&self, total_supply: u128) {
        self.total_supply
            .set(i64::try_from(total_supply).unwrap_or(i64::MAX));
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render the registry in Prometheus text format
    pub fn encode(&self) -> crate::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| crate::Error::DecodeError(format!("metrics output: {}", e)))
    }

    /// Serve the text exposition until the listener fails
    pub async fn serve(self, listener: TcpListener) -> crate::Result<()> {
        tracing::info!(addr = ?listener.local_addr()?, "Serving metrics");

        loop {
            let (mut socket, peer) = listener.accept().await?;
            let metrics = self.clone();

            tokio::spawn(async move {
                // The request line is not inspected
                let mut request = [0u8; 1024];
                let _ = socket.read(&mut request).await;

                let response = match metrics.encode() {
                    Ok(body) => format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    ),
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to encode metrics");
                        "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                            .to_string()
                    }
                };

                if let Err(e) = socket.write_all(response.as_bytes()).await {
                    tracing::debug!(peer = %peer, "Metrics response failed: {}", e);
                }
            });
        }
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("total_supply", &self.total_supply.get())
            .finish_non_exhaustive()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}
