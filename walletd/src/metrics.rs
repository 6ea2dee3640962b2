//! # Prometheus Metrics
//!
//! Counters for the payment build pipeline, scraped at `/metrics` on the
//! metrics port. Everything lives in a dedicated [`prometheus::Registry`]
//! under the `nova_wallet` namespace.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::core::Collector;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Metric handles for the daemon. Cheap to clone.
#[derive(Clone)]
pub struct WalletMetrics {
    registry: Registry,
    /// `wallet_buildPayment` and `wallet_buildRequest` calls.
    pub builds_total: IntCounter,
    /// Builds that came back ready to review.
    pub builds_ready_total: IntCounter,
    /// Reviews that ran to the UI's acknowledgement.
    pub reviews_total: IntCounter,
    /// Sends approved for submission.
    pub sends_total: IntCounter,
    /// Calls rejected with an error, cancellations included.
    pub rejections_total: IntCounter,
    /// Live payment builds.
    pub active_builds: IntGauge,
    /// Wall time of a payment build call.
    pub build_latency_seconds: Histogram,
}

fn register<C>(registry: &Registry, metric: C) -> Result<C, prometheus::Error>
where
    C: Collector + Clone + 'static,
{
    registry.register(Box::new(metric.clone()))?;
    Ok(metric)
}

impl WalletMetrics {
    /// Creates and registers all metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("nova_wallet".into()), None)?;

        let builds_total = register(
            &registry,
            IntCounter::new("builds_total", "Payment and request build calls")?,
        )?;
        let builds_ready_total = register(
            &registry,
            IntCounter::new("builds_ready_total", "Builds that were ready to review")?,
        )?;
        let reviews_total = register(
            &registry,
            IntCounter::new("reviews_total", "Reviews acknowledged by the frontend")?,
        )?;
        let sends_total = register(
            &registry,
            IntCounter::new("sends_total", "Payments approved for submission")?,
        )?;
        let rejections_total = register(
            &registry,
            IntCounter::new("rejections_total", "Calls that returned an error")?,
        )?;
        let active_builds = register(
            &registry,
            IntGauge::new("active_builds", "Live payment build sessions")?,
        )?;
        let build_latency_seconds = register(
            &registry,
            Histogram::with_opts(
                HistogramOpts::new("build_latency_seconds", "Payment build latency in seconds")
                    .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
            )?,
        )?;

        Ok(Self {
            registry,
            builds_total,
            builds_ready_total,
            reviews_total,
            sends_total,
            rejections_total,
            active_builds,
            build_latency_seconds,
        })
    }

    /// Encodes all metrics in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics handle for axum state.
pub type SharedMetrics = Arc<WalletMetrics>;

/// `GET /metrics`.
pub async fn metrics_handler(State(metrics): State<SharedMetrics>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_are_namespaced() {
        let metrics = WalletMetrics::new().unwrap();
        metrics.builds_total.inc();
        metrics.active_builds.set(3);

        let text = metrics.encode().unwrap();
        assert!(text.contains("nova_wallet_builds_total 1"));
        assert!(text.contains("nova_wallet_active_builds 3"));
    }

    #[test]
    fn registries_are_independent() {
        let a = WalletMetrics::new().unwrap();
        let b = WalletMetrics::new().unwrap();
        a.sends_total.inc();
        assert_eq!(b.sends_total.get(), 0);
    }
}
