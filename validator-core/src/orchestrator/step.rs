//! The step loop (C7, continued): Store -> Challenge -> Retrieve ->
//! Rebalance -> tier recompute -> weight submission, tying every round
//! together the way a step function composes a block producer's phases in
//! the teacher.

use std::time::Instant;

use rand::Rng;

use crate::chain_client::ChainClient;
use crate::error::OrchestratorError;
use crate::fabric::MinerFabric;
use crate::metadata::MetadataStore;
use crate::selector::Metagraph;
use crate::types::{DataHash, EventRecord, StepSnapshot, Uid};

use super::rebalance::{run_rebalance_round, MigrationOutcome};
use super::round::{run_challenge_round, run_retrieve_round, run_store_round, BlobToStore, RoundContext};
use super::ValidatorContext;

/// Everything a step needs that this crate does not itself own: which blobs
/// are pending a first Store, and how to look up what a given miner is
/// currently believed to hold. An external caller (out of scope per
/// spec.md §1) supplies these.
pub struct StepInputs<'a> {
    pub pending_stores: Vec<BlobToStore>,
    pub stored_blob_for_challenge: &'a (dyn Fn(Uid) -> Option<(DataHash, [u8; 32], usize)> + Send + Sync),
    pub stored_blob_for_retrieve: &'a (dyn Fn(Uid) -> Option<DataHash> + Send + Sync),
    pub stored_blob_for_rebalance: &'a (dyn Fn(Uid) -> Option<DataHash> + Send + Sync),
    pub rebalance_source_count: usize,
}

/// Everything that happened in one step, ready to be logged or persisted.
pub struct StepOutcome {
    pub snapshot: StepSnapshot,
    pub migrations: Vec<MigrationOutcome>,
    pub weights_submitted: bool,
}

/// Owns the step counter and the block at which weights were last
/// submitted, across repeated calls to [`Step::run`].
pub struct Step {
    pub index: u64,
    last_submission_block: u64,
}

impl Step {
    pub fn new(last_submission_block: u64) -> Self {
        Step { index: 0, last_submission_block }
    }

    pub fn last_submission_block(&self) -> u64 {
        self.last_submission_block
    }

    /// Runs one full step: Store, Challenge, Retrieve, Rebalance, a tier
    /// recompute, and (if the weight-submission interval has elapsed) a
    /// `set_weights` call. Honors the round-robin gate by skipping the step
    /// entirely (returning an empty outcome) when this validator is not the
    /// one selected for `current_block`.
    pub async fn run<C, F, M>(
        &mut self,
        ctx: &ValidatorContext<C, F, M>,
        metagraph: &dyn Metagraph,
        inputs: StepInputs<'_>,
        rng: &mut impl Rng,
    ) -> Result<StepOutcome, OrchestratorError>
    where
        C: ChainClient,
        F: MinerFabric,
        M: MetadataStore,
    {
        let current_block = ctx.chain_client.get_current_block().await?;

        if ctx.config.protocol.round_robin_gate.enabled && !self.is_my_turn(metagraph, current_block) {
            return Ok(StepOutcome {
                snapshot: StepSnapshot {
                    step: self.index,
                    block: current_block,
                    total_network_storage_bytes: 0,
                    chunk_hash_to_hotkey: Default::default(),
                    events: Vec::new(),
                },
                migrations: Vec::new(),
                weights_submitted: false,
            });
        }

        let start = Instant::now();
        let round_ctx = RoundContext { ctx, metagraph, current_block };

        let mut events: Vec<EventRecord> = Vec::with_capacity(inputs.pending_stores.len() + 2);
        for blob in &inputs.pending_stores {
            events.push(run_store_round(&round_ctx, blob, rng).await);
        }
        events.push(run_challenge_round(&round_ctx, inputs.stored_blob_for_challenge, rng).await);
        events.push(run_retrieve_round(&round_ctx, inputs.stored_blob_for_retrieve, rng).await);

        let migrations = run_rebalance_round(
            ctx,
            metagraph,
            inputs.rebalance_source_count,
            inputs.stored_blob_for_rebalance,
            rng,
        )
        .await;

        ctx.reputation.recompute_tiers().await;

        let total_network_storage_bytes = ctx.metadata.total_network_storage().await.unwrap_or(0);
        ctx.metrics.rounds.total_network_storage_bytes.set(total_network_storage_bytes as f64);

        let mut chunk_hash_to_hotkey = std::collections::BTreeMap::new();
        for blob in &inputs.pending_stores {
            if let Ok(entries) = ctx.metadata.get_ordered_metadata(&blob.data_hash).await {
                for entry in entries {
                    chunk_hash_to_hotkey.insert(entry.chunk_hash, entry.hotkey);
                }
            }
        }

        let weights_submitted = self
            .maybe_submit_weights(ctx, current_block)
            .await?;

        tracing::info!(
            step = self.index,
            block = current_block,
            duration_ms = start.elapsed().as_millis() as u64,
            migrations = migrations.len(),
            weights_submitted,
            "step complete"
        );

        let snapshot = StepSnapshot {
            step: self.index,
            block: current_block,
            total_network_storage_bytes,
            chunk_hash_to_hotkey,
            events,
        };
        self.index += 1;

        Ok(StepOutcome { snapshot, migrations, weights_submitted })
    }

    /// A simple round-robin gate: this validator's turn is every `n`th
    /// block, offset by its own uid, where `n` is the size of the metagraph.
    fn is_my_turn(&self, metagraph: &dyn Metagraph, current_block: u64) -> bool {
        let n = metagraph.n().max(1) as u64;
        current_block % n == metagraph.self_uid() as u64 % n
    }

    async fn maybe_submit_weights<C, F, M>(
        &mut self,
        ctx: &ValidatorContext<C, F, M>,
        current_block: u64,
    ) -> Result<bool, OrchestratorError>
    where
        C: ChainClient,
        F: MinerFabric,
        M: MetadataStore,
    {
        let blocks_per_weight = ctx.config.reputation.blocks_per_weight;
        if !crate::reward::should_set_weights(current_block, self.last_submission_block, blocks_per_weight) {
            return Ok(false);
        }

        let normalized = ctx.reward_state.lock().await.normalized();
        let uids: Vec<Uid> = normalized.keys().copied().collect();
        let weights: Vec<f64> = uids.iter().map(|uid| normalized[uid]).collect();

        ctx.chain_client
            .set_weights(&uids, &weights, ctx.config.protocol.netuid, current_block)
            .await?;
        self.last_submission_block = current_block;
        Ok(true)
    }
}
