//! Prometheus metrics and HTTP exporter, directly grounded in the teacher's
//! `chain::metrics::prometheus` module: round-level histograms, per-task
//! success/failure counters, and a moving-averaged-score gauge vec keyed by
//! uid.

use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    body::Incoming, header, server::conn::http1, service::service_fn, Method, Request, Response, StatusCode,
};
use hyper_util::rt::TokioIo;
use prometheus::{self, Encoder, Gauge, GaugeVec, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder};
use tokio::net::TcpListener;

/// Round-level Prometheus metrics for the validator.
#[derive(Clone)]
pub struct RoundMetrics {
    pub store_round_seconds: Histogram,
    pub challenge_round_seconds: Histogram,
    pub retrieve_round_seconds: Histogram,
    pub rebalance_round_seconds: Histogram,
    pub store_success_total: IntCounter,
    pub store_failure_total: IntCounter,
    pub challenge_success_total: IntCounter,
    pub challenge_failure_total: IntCounter,
    pub retrieve_success_total: IntCounter,
    pub retrieve_failure_total: IntCounter,
    pub moving_averaged_score: GaugeVec,
    pub total_network_storage_bytes: Gauge,
}

fn round_buckets() -> Vec<f64> {
    vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
}

impl RoundMetrics {
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let store_round_seconds = Histogram::with_opts(
            HistogramOpts::new("validator_store_round_seconds", "Time to complete a Store round, in seconds")
                .buckets(round_buckets()),
        )?;
        registry.register(Box::new(store_round_seconds.clone()))?;

        let challenge_round_seconds = Histogram::with_opts(
            HistogramOpts::new("validator_challenge_round_seconds", "Time to complete a Challenge round, in seconds")
                .buckets(round_buckets()),
        )?;
        registry.register(Box::new(challenge_round_seconds.clone()))?;

        let retrieve_round_seconds = Histogram::with_opts(
            HistogramOpts::new("validator_retrieve_round_seconds", "Time to complete a Retrieve round, in seconds")
                .buckets(round_buckets()),
        )?;
        registry.register(Box::new(retrieve_round_seconds.clone()))?;

        let rebalance_round_seconds = Histogram::with_opts(
            HistogramOpts::new("validator_rebalance_round_seconds", "Time to complete a Rebalance round, in seconds")
                .buckets(round_buckets()),
        )?;
        registry.register(Box::new(rebalance_round_seconds.clone()))?;

        let store_success_total = IntCounter::with_opts(Opts::new("validator_store_success_total", "Total successful Store responses"))?;
        registry.register(Box::new(store_success_total.clone()))?;
        let store_failure_total = IntCounter::with_opts(Opts::new("validator_store_failure_total", "Total failed Store responses"))?;
        registry.register(Box::new(store_failure_total.clone()))?;

        let challenge_success_total =
            IntCounter::with_opts(Opts::new("validator_challenge_success_total", "Total successful Challenge responses"))?;
        registry.register(Box::new(challenge_success_total.clone()))?;
        let challenge_failure_total =
            IntCounter::with_opts(Opts::new("validator_challenge_failure_total", "Total failed Challenge responses"))?;
        registry.register(Box::new(challenge_failure_total.clone()))?;

        let retrieve_success_total =
            IntCounter::with_opts(Opts::new("validator_retrieve_success_total", "Total successful Retrieve responses"))?;
        registry.register(Box::new(retrieve_success_total.clone()))?;
        let retrieve_failure_total =
            IntCounter::with_opts(Opts::new("validator_retrieve_failure_total", "Total failed Retrieve responses"))?;
        registry.register(Box::new(retrieve_failure_total.clone()))?;

        let moving_averaged_score = GaugeVec::new(
            Opts::new("validator_moving_averaged_score", "Current moving-averaged score per uid"),
            &["uid"],
        )?;
        registry.register(Box::new(moving_averaged_score.clone()))?;

        let total_network_storage_bytes = Gauge::with_opts(Opts::new(
            "validator_total_network_storage_bytes",
            "Sum of all known blob sizes across the network",
        ))?;
        registry.register(Box::new(total_network_storage_bytes.clone()))?;

        Ok(Self {
            store_round_seconds,
            challenge_round_seconds,
            retrieve_round_seconds,
            rebalance_round_seconds,
            store_success_total,
            store_failure_total,
            challenge_success_total,
            challenge_failure_total,
            retrieve_success_total,
            retrieve_failure_total,
            moving_averaged_score,
            total_network_storage_bytes,
        })
    }
}

/// Owns a Prometheus registry and the validator's round metrics. Wrapped in
/// an `Arc` and shared across the orchestrator and the metrics HTTP server.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    pub rounds: RoundMetrics,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("validator".to_string()), None)?;
        let rounds = RoundMetrics::register(&registry)?;
        Ok(Self { registry, rounds })
    }

    pub fn gather_text(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("failed to encode Prometheus metrics: {e}");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Runs an HTTP server exposing `GET /metrics` in Prometheus text format;
/// all other paths return 404.
pub async fn run_prometheus_http_server(
    metrics: Arc<MetricsRegistry>,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let svc = service_fn(move |req| {
                let metrics = metrics.clone();
                handle_request(req, metrics)
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, svc).await {
                tracing::warn!("metrics HTTP connection error: {err}");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    metrics: Arc<MetricsRegistry>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let body = metrics.gather_text();
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
                .body(Full::new(Bytes::from(body)))
                .unwrap())
        }
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("not found")))
            .unwrap()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_metrics_register_and_record() {
        let registry = Registry::new();
        let metrics = RoundMetrics::register(&registry).expect("register metrics");
        metrics.store_round_seconds.observe(0.2);
        metrics.store_success_total.inc();
        metrics.moving_averaged_score.with_label_values(&["1"]).set(0.5);

        let families = registry.gather();
        assert!(!families.is_empty());
    }

    #[test]
    fn metrics_registry_gather_text_contains_metric_names() {
        let registry = MetricsRegistry::new().expect("create metrics registry");
        registry.rounds.store_round_seconds.observe(0.01);
        let text = registry.gather_text();
        assert!(text.contains("validator_store_round_seconds"));
    }
}
