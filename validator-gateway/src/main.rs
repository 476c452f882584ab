//! Validator gateway binary.
//!
//! This binary exposes a small HTTP API on top of `validator-core`:
//!
//! - `GET /health`
//! - `GET /status`
//! - `POST /trigger`
//!
//! It embeds a `ValidatorContext` backed by an in-memory chain client,
//! metagraph, and miner fabric, a background step loop, and a Prometheus
//! metrics exporter on `/metrics`.

mod config;
mod demo;
mod routes;
mod state;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::signal;
use tokio::sync::Mutex;

use config::GatewayConfig;
use demo::{DemoChainClient, DemoMetagraph, DemoMinerFabric};
use routes::{health, status, trigger};
use state::{AppState, SharedState};
use validator_core::metadata::InMemoryMetadataStore;
use validator_core::metrics::{run_prometheus_http_server, MetricsRegistry};
use validator_core::orchestrator::{BlobToStore, Step, StepInputs, ValidatorContext};
use validator_core::types::{EncryptionPayload, Hotkey};
use validator_core::ValidatorConfig;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "validator_gateway=info,validator_core=info".to_string()),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let gateway_cfg = GatewayConfig::default();
    let validator_cfg = ValidatorConfig::default();

    let metrics = Arc::new(
        MetricsRegistry::new().map_err(|e| format!("failed to initialize metrics registry: {e}"))?,
    );

    if validator_cfg.metrics.enabled {
        let metrics_clone = metrics.clone();
        let addr = validator_cfg.metrics.listen_addr;
        tokio::spawn(async move {
            if let Err(e) = run_prometheus_http_server(metrics_clone, addr).await {
                eprintln!("metrics HTTP server error: {e}");
            }
        });
        tracing::info!("metrics exporter listening on http://{}/metrics", addr);
    }

    let hotkeys: Vec<Hotkey> = (0..8).map(|i| Hotkey(format!("miner-{i}"))).collect();
    let chain_client = DemoChainClient::new(hotkeys.clone());
    let metagraph = DemoMetagraph::new(hotkeys, 100);
    let fabric = DemoMinerFabric::new();
    let metadata = InMemoryMetadataStore::new();

    let ctx = ValidatorContext::new(validator_cfg, chain_client, fabric, metadata, metrics.clone());

    let app_state: SharedState = Arc::new(AppState {
        ctx,
        metagraph,
        step: Mutex::new(Step::new(0)),
        rng: Mutex::new(StdRng::seed_from_u64(7)),
        metrics: metrics.clone(),
    });

    let step_interval_secs = app_state.ctx.config.protocol.blocks_per_step;
    let loop_state = app_state.clone();
    tokio::spawn(async move {
        run_step_loop(loop_state, step_interval_secs).await;
    });

    let app = Router::new()
        .route("/health", get(health::health))
        .route("/status", get(status::status))
        .route("/trigger", post(trigger::trigger))
        .with_state(app_state);

    tracing::info!("validator gateway listening on http://{}", gateway_cfg.listen_addr);

    let listener = tokio::net::TcpListener::bind(gateway_cfg.listen_addr)
        .await
        .map_err(|e| format!("failed to bind {}: {e}", gateway_cfg.listen_addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| format!("gateway server error: {e}"))?;

    Ok(())
}

/// Background step loop, mirroring `validator-node`'s but driven through the
/// same shared state a manual `/trigger` call uses, so the two never race.
async fn run_step_loop(state: SharedState, interval_secs: u64) {
    let interval = std::time::Duration::from_secs(interval_secs.max(1));
    tracing::info!(interval_secs = interval.as_secs(), "step loop running");

    loop {
        {
            let mut step = state.step.lock().await;
            let mut rng = state.rng.lock().await;

            let pending_stores = if step.index % 5 == 0 {
                vec![BlobToStore {
                    data_hash: format!("gateway-blob-{}", step.index),
                    ciphertext: format!("gateway payload for step {}", step.index).into_bytes(),
                    encryption_payload: EncryptionPayload { nonce: vec![0u8; 12], tag: vec![0u8; 16] },
                }]
            } else {
                Vec::new()
            };

            let inputs = StepInputs {
                pending_stores,
                stored_blob_for_challenge: &|uid| state.ctx.fabric.any_blob_with_root(uid),
                stored_blob_for_retrieve: &|uid| state.ctx.fabric.any_blob(uid),
                stored_blob_for_rebalance: &|uid| state.ctx.fabric.any_blob(uid),
                rebalance_source_count: 1,
            };

            match step.run(&state.ctx, &state.metagraph, inputs, &mut *rng).await {
                Ok(outcome) => {
                    tracing::info!(
                        step = outcome.snapshot.step,
                        block = outcome.snapshot.block,
                        events = outcome.snapshot.events.len(),
                        weights_submitted = outcome.weights_submitted,
                        "step finished"
                    );
                }
                Err(e) => {
                    tracing::warn!("step failed: {e}");
                }
            }
        }

        tokio::time::sleep(interval).await;
    }
}

/// Waits for Ctrl-C and returns, used for graceful shutdown.
async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
