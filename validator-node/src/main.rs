//! Standalone validator node binary.
//!
//! Wires `validator-core`'s step loop up to an in-memory chain client,
//! metagraph, and miner fabric, and runs it on a fixed interval with a
//! Prometheus metrics exporter on `/metrics`, mirroring the teacher's
//! single-binary demo node.

mod demo;

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;

use validator_core::metrics::{run_prometheus_http_server, MetricsRegistry};
use validator_core::metadata::InMemoryMetadataStore;
use validator_core::orchestrator::{BlobToStore, Step, StepInputs, ValidatorContext};
use validator_core::state::PersistedState;
use validator_core::types::{EncryptionPayload, Hotkey};
use validator_core::ValidatorConfig;

use demo::{DemoChainClient, DemoMetagraph, DemoMinerFabric};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "validator_node=info,validator_core=info".to_string()))
        .init();

    if let Err(err) = run_node().await {
        eprintln!("fatal error: {err}");
        std::process::exit(1);
    }
}

async fn run_node() -> Result<(), String> {
    let config = ValidatorConfig::default();

    let metrics = Arc::new(
        MetricsRegistry::new().map_err(|e| format!("failed to initialize metrics registry: {e}"))?,
    );

    if config.metrics.enabled {
        let metrics_clone = metrics.clone();
        let addr = config.metrics.listen_addr;
        tokio::spawn(async move {
            if let Err(e) = run_prometheus_http_server(metrics_clone, addr).await {
                eprintln!("metrics HTTP server error: {e}");
            }
        });
        tracing::info!(%addr, "metrics exporter listening");
    }

    let hotkeys: Vec<Hotkey> = (0..8).map(|i| Hotkey(format!("miner-{i}"))).collect();
    let chain_client = DemoChainClient::new(hotkeys.clone());
    let metagraph = DemoMetagraph::new(hotkeys, 100);
    let fabric = DemoMinerFabric::new();
    let metadata = InMemoryMetadataStore::new();

    let ctx = ValidatorContext::new(config.clone(), chain_client, fabric, metadata, metrics.clone());

    let persisted = PersistedState::load_or_default(&config.persistence.state_path).await;
    ctx.reward_state.lock().await.restore(persisted.moving_averaged_scores.clone());
    let mut step = Step::new(persisted.prev_step_block);

    let mut rng = StdRng::seed_from_u64(42);
    let interval = Duration::from_secs(config.protocol.blocks_per_step.max(1));

    tracing::info!(interval_secs = interval.as_secs(), "starting validator step loop");

    loop {
        let pending_stores = if step.index % 5 == 0 {
            vec![BlobToStore {
                data_hash: format!("demo-blob-{}", step.index),
                ciphertext: format!("demo payload for step {}", step.index).into_bytes(),
                encryption_payload: EncryptionPayload { nonce: vec![0u8; 12], tag: vec![0u8; 16] },
            }]
        } else {
            Vec::new()
        };

        let inputs = StepInputs {
            pending_stores,
            stored_blob_for_challenge: &|uid| ctx.fabric.any_blob_with_root(uid),
            stored_blob_for_retrieve: &|uid| ctx.fabric.any_blob(uid),
            stored_blob_for_rebalance: &|uid| ctx.fabric.any_blob(uid),
            rebalance_source_count: 1,
        };

        match step.run(&ctx, &metagraph, inputs, &mut rng).await {
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

        let snapshot_scores = ctx.reward_state.lock().await.scores_snapshot();
        let persisted = PersistedState {
            moving_averaged_scores: snapshot_scores,
            step: step.index,
            prev_step_block: step.last_submission_block(),
        };
        if let Err(e) = persisted.save(&config.persistence.state_path).await {
            tracing::warn!("failed to persist validator state: {e}");
        }

        tokio::time::sleep(interval).await;
    }
}
