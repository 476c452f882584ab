//! Store, Challenge, and Retrieve round implementations.
//!
//! All peer calls in a wave run concurrently under a shared timeout via
//! `futures::future::join_all`; the orchestrator awaits the entire wave
//! (no early termination on first success) and a single peer's failure
//! never aborts the wave — it is recorded as a failure row.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use futures::future::join_all;
use rand::Rng;

use validator_crypto::commitment::Crs;
use validator_crypto::hash::hash_data;
use validator_protocol::messages::chunk_bytes;
use validator_protocol::verify::{verify_challenge_with_seed, verify_retrieve_with_seed, verify_store_with_seed, Outcome};
use validator_protocol::{ChallengeRequest, RetrieveRequest, Seed, StoreRequest, CURVE_NAME};

use crate::chain_client::ChainClient;
use crate::config::ProtocolConfig;
use crate::fabric::MinerFabric;
use crate::metadata::MetadataStore;
use crate::reward::{combine_reward, normalize_latency_minmax, raw_reward};
use crate::selector::{get_available_query_miners, resolve_hotkey, Availability, Metagraph};
use crate::types::{BlobMetadata, ChunkEntry, DataHash, EncryptionPayload, EventRecord, TaskType, Uid};

use super::ValidatorContext;

/// A ciphertext blob an external caller (out of scope for this crate) wants
/// replicated across `store_redundancy` miners.
#[derive(Clone, Debug)]
pub struct BlobToStore {
    pub data_hash: DataHash,
    pub ciphertext: Vec<u8>,
    pub encryption_payload: EncryptionPayload,
}

/// Per-round dependencies bundled for the free functions in this module,
/// borrowed from a [`ValidatorContext`].
pub struct RoundContext<'a, C, F, M> {
    pub ctx: &'a ValidatorContext<C, F, M>,
    pub metagraph: &'a dyn Metagraph,
    pub current_block: u64,
}

struct WaveOutcome {
    uid: Uid,
    outcome: Outcome,
    latency_ms: u64,
}

async fn with_timeout<T>(fut: impl std::future::Future<Output = Option<T>>, timeout: Duration) -> Option<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(value) => value,
        Err(_elapsed) => None,
    }
}

fn record_event(
    task: TaskType,
    outcomes: &[WaveOutcome],
    rewards: &BTreeMap<Uid, f64>,
    step_duration: Duration,
    block: u64,
) -> EventRecord {
    let per_uid_success = outcomes.iter().map(|o| (o.uid, o.outcome == Outcome::Verified)).collect();
    let per_uid_latency_ms = outcomes.iter().map(|o| (o.uid, o.latency_ms)).collect();
    let best_uid = outcomes
        .iter()
        .filter(|o| o.outcome == Outcome::Verified)
        .min_by_key(|o| o.latency_ms)
        .map(|o| o.uid);

    EventRecord {
        task,
        per_uid_success,
        per_uid_latency_ms,
        rewards: rewards.clone(),
        best_uid,
        step_duration_ms: step_duration.as_millis() as u64,
        block,
    }
}

/// Applies the spec's reward formula to a completed wave and folds the
/// result into the shared `moving_averaged_scores` vector.
async fn score_wave<C, F, M>(
    ctx: &ValidatorContext<C, F, M>,
    metagraph: &dyn Metagraph,
    outcomes: &[WaveOutcome],
) -> BTreeMap<Uid, f64>
where
    C: ChainClient,
    F: MinerFabric,
    M: MetadataStore,
{
    let mut latencies = BTreeMap::new();
    for o in outcomes {
        latencies.insert(o.uid, o.latency_ms);
    }
    let latency_scores = normalize_latency_minmax(&latencies);

    let mut rewards = BTreeMap::new();
    for outcome in outcomes {
        let hotkey_factor = ctx.reputation.get_tier_factor(&resolve_hotkey(metagraph, outcome.uid)).await;
        let (success, had_data) = match &outcome.outcome {
            Outcome::Verified => (true, true),
            Outcome::Failed(_) => (false, true),
            Outcome::NoData => (false, false),
        };
        let raw = raw_reward(success, had_data, hotkey_factor);
        let latency_score = latency_scores.get(&outcome.uid).copied().unwrap_or(0.0);
        rewards.insert(outcome.uid, combine_reward(raw, latency_score));
    }

    // Every known uid must pass through `apply_round`, not just the ones this
    // wave touched, so an untouched uid's score actually decays instead of
    // sitting frozen indefinitely.
    let all_known_uids: Vec<Uid> = (0..metagraph.n() as Uid).collect();
    let mut reward_state = ctx.reward_state.lock().await;
    reward_state.apply_round(&rewards, &all_known_uids);
    rewards
}

pub(crate) fn resolved_chunk_size(cfg: &ProtocolConfig, rng: &mut impl Rng) -> usize {
    if cfg.override_chunk_size != 0 {
        cfg.override_chunk_size
    } else {
        let max = cfg.min_chunk_size * cfg.chunk_factor;
        rng.gen_range(cfg.min_chunk_size..=max.max(cfg.min_chunk_size))
    }
}

/// Runs one Store round: selects `store_redundancy` miners, broadcasts a
/// Store request concurrently, verifies responses, and retries failed
/// subsets up to `max_store_retries` times. Succeeds overall if at least one
/// miner stores the blob.
pub async fn run_store_round<C, F, M>(
    round_ctx: &RoundContext<'_, C, F, M>,
    blob: &BlobToStore,
    rng: &mut impl Rng,
) -> EventRecord
where
    C: ChainClient,
    F: MinerFabric,
    M: MetadataStore,
{
    let start = Instant::now();
    let ctx = round_ctx.ctx;
    let cfg = &ctx.config.protocol;

    let mut all_outcomes: Vec<WaveOutcome> = Vec::new();
    let mut want = cfg.store_redundancy;
    let mut retries = 0usize;

    // Capacity is tier-derived (spec.md §4.3's `hotkey_at_capacity`); compute
    // it once per candidate uid up front since `Availability::NotAtCapacity`
    // takes a plain sync predicate.
    let mut at_capacity_by_uid: BTreeMap<Uid, bool> = BTreeMap::new();
    for uid in 0..round_ctx.metagraph.n() as Uid {
        let hotkey = resolve_hotkey(round_ctx.metagraph, uid);
        let tier = ctx.reputation.get_tier(&hotkey).await;
        let at_capacity = ctx.metadata.hotkey_at_capacity(&hotkey, tier.capacity_bytes()).await.unwrap_or(false);
        at_capacity_by_uid.insert(uid, at_capacity);
    }
    let at_capacity = |uid: Uid| at_capacity_by_uid.get(&uid).copied().unwrap_or(false);

    // Chunk size is fixed once per blob so every miner in this round (and
    // any retry wave) builds the identical Merkle tree over the same leaves.
    let chunk_size = resolved_chunk_size(cfg, rng);
    let chunk_hashes: Vec<String> = chunk_bytes(&blob.ciphertext, chunk_size).iter().map(|c| hash_data(c)).collect();

    loop {
        let avail = Availability::NotAtCapacity { at_capacity: &at_capacity };
        let uids = get_available_query_miners(round_ctx.metagraph, want, &avail, rng);
        if uids.is_empty() {
            break;
        }

        let prepared: Vec<(Uid, Seed, StoreRequest)> = uids
            .iter()
            .map(|uid| {
                let seed = Seed::generate(rng);
                let crs = Crs::for_round(&seed.0);
                let request = StoreRequest::new(&blob.ciphertext, crs.g.to_hex(), crs.h.to_hex(), seed, chunk_size);
                (*uid, seed, request)
            })
            .collect();

        let seed_by_uid: BTreeMap<Uid, Seed> = prepared.iter().map(|(uid, seed, _)| (*uid, *seed)).collect();

        let timeout = cfg.store_timeout;
        let futures = prepared.into_iter().map(|(uid, seed, request)| async move {
            let wave_start = Instant::now();
            let response = with_timeout(ctx.fabric.store(uid, request.clone()), timeout).await;
            let latency_ms = wave_start.elapsed().as_millis() as u64;
            let outcome = match response {
                Some(resp) => verify_store_with_seed(&request, &resp, &seed),
                None => Outcome::NoData,
            };
            (uid, outcome, latency_ms)
        });

        let wave_results = join_all(futures).await;
        let mut failed_uids = Vec::new();
        for (uid, outcome, latency_ms) in wave_results {
            let success = outcome == Outcome::Verified;
            if success {
                let hotkey = resolve_hotkey(round_ctx.metagraph, uid);
                let metadata = BlobMetadata {
                    data_hash: blob.data_hash.clone(),
                    size: blob.ciphertext.len() as u64,
                    encryption_payload: blob.encryption_payload.clone(),
                    prev_seed: seed_by_uid.get(&uid).map(|s| s.0),
                    ttl_seconds: cfg.data_ttl,
                };
                if ctx.metadata.add_metadata(&hotkey, &blob.data_hash, metadata).await.is_err() {
                    tracing::error!(uid, "metadata store unavailable during store round");
                }
                for (chunk_index, chunk_hash) in chunk_hashes.iter().enumerate() {
                    let entry = ChunkEntry { chunk_index, chunk_hash: chunk_hash.clone(), hotkey: hotkey.clone() };
                    if ctx.metadata.store_chunk_metadata(&blob.data_hash, entry).await.is_err() {
                        tracing::error!(uid, chunk_index, "metadata store unavailable for chunk mapping");
                    }
                }
            } else {
                failed_uids.push(uid);
            }
            ctx.reputation.update_statistics(&resolve_hotkey(round_ctx.metagraph, uid), success, TaskType::Store, Some(latency_ms)).await;
            all_outcomes.push(WaveOutcome { uid, outcome, latency_ms });
        }

        if failed_uids.is_empty() || retries >= cfg.max_store_retries {
            break;
        }
        want = failed_uids.len();
        retries += 1;
    }

    let rewards = score_wave(ctx, round_ctx.metagraph, &all_outcomes).await;
    record_event(TaskType::Store, &all_outcomes, &rewards, start.elapsed(), round_ctx.current_block)
}

/// Runs one Challenge round: samples `challenge_sample_size` miners, issues
/// one challenge each against a blob they're believed to hold, verifies.
/// No retries — one failure is a failure.
pub async fn run_challenge_round<C, F, M>(
    round_ctx: &RoundContext<'_, C, F, M>,
    stored_blob_lookup: impl Fn(Uid) -> Option<(DataHash, [u8; 32], usize)> + Sync,
    rng: &mut impl Rng,
) -> EventRecord
where
    C: ChainClient,
    F: MinerFabric,
    M: MetadataStore,
{
    let start = Instant::now();
    let ctx = round_ctx.ctx;
    let cfg = &ctx.config.protocol;

    let has_blob = |uid: Uid| stored_blob_lookup(uid).is_some();
    let avail = Availability::HasStoredBlob { has_blob: &has_blob };
    let uids = get_available_query_miners(round_ctx.metagraph, cfg.challenge_sample_size, &avail, rng);

    let prepared: Vec<(Uid, Seed, ChallengeRequest, [u8; 32])> = uids
        .iter()
        .filter_map(|uid| {
            let uid = *uid;
            let (data_hash, merkle_root, num_chunks) = stored_blob_lookup(uid)?;
            let seed = Seed::generate(rng);
            let crs = Crs::for_round(&seed.0);
            let chunk_size = resolved_chunk_size(cfg, rng);
            let challenge_index = rng.gen_range(0..num_chunks.max(1));
            let request = ChallengeRequest {
                data_hash,
                chunk_size,
                g_hex: crs.g.to_hex(),
                h_hex: crs.h.to_hex(),
                curve: CURVE_NAME.to_string(),
                challenge_index,
                seed: seed.to_hex(),
            };
            Some((uid, seed, request, merkle_root))
        })
        .collect();

    let timeout = cfg.challenge_timeout;
    let futures = prepared.into_iter().map(|(uid, seed, request, merkle_root)| async move {
        let wave_start = Instant::now();
        let response = with_timeout(ctx.fabric.challenge(uid, request.clone()), timeout).await;
        let latency_ms = wave_start.elapsed().as_millis() as u64;
        let outcome = match response {
            Some(resp) => verify_challenge_with_seed(&request, &resp, &seed, &merkle_root),
            None => Outcome::NoData,
        };
        (uid, outcome, latency_ms)
    });

    let wave_results = join_all(futures).await;
    let mut outcomes = Vec::with_capacity(wave_results.len());
    for (uid, outcome, latency_ms) in wave_results {
        if outcome != Outcome::NoData {
            let success = outcome == Outcome::Verified;
            ctx.reputation.update_statistics(&resolve_hotkey(round_ctx.metagraph, uid), success, TaskType::Challenge, Some(latency_ms)).await;
        }
        outcomes.push(WaveOutcome { uid, outcome, latency_ms });
    }

    let rewards = score_wave(ctx, round_ctx.metagraph, &outcomes).await;
    record_event(TaskType::Challenge, &outcomes, &rewards, start.elapsed(), round_ctx.current_block)
}

/// Runs one Retrieve round: requests the full ciphertext from miners
/// believed to hold at least one blob, verifies ciphertext hash and
/// opening. Hash mismatch or failed verification is the most severely
/// punished case because it represents data loss.
pub async fn run_retrieve_round<C, F, M>(
    round_ctx: &RoundContext<'_, C, F, M>,
    stored_blob_lookup: impl Fn(Uid) -> Option<DataHash> + Sync,
    rng: &mut impl Rng,
) -> EventRecord
where
    C: ChainClient,
    F: MinerFabric,
    M: MetadataStore,
{
    let start = Instant::now();
    let ctx = round_ctx.ctx;
    let cfg = &ctx.config.protocol;

    let has_blob = |uid: Uid| stored_blob_lookup(uid).is_some();
    let avail = Availability::HasStoredBlob { has_blob: &has_blob };
    let uids = get_available_query_miners(round_ctx.metagraph, cfg.challenge_sample_size, &avail, rng);

    let prepared: Vec<(Uid, Seed, RetrieveRequest, Crs)> = uids
        .iter()
        .filter_map(|uid| {
            let uid = *uid;
            let data_hash = stored_blob_lookup(uid)?;
            let seed = Seed::generate(rng);
            let crs = Crs::for_round(&seed.0);
            let request = RetrieveRequest::new(data_hash, seed);
            Some((uid, seed, request, crs))
        })
        .collect();

    let timeout = cfg.retrieve_timeout;
    let futures = prepared.into_iter().map(|(uid, seed, request, crs)| async move {
        let wave_start = Instant::now();
        let response = with_timeout(ctx.fabric.retrieve(uid, request.clone()), timeout).await;
        let latency_ms = wave_start.elapsed().as_millis() as u64;
        let outcome = match response {
            Some(resp) => verify_retrieve_with_seed(&request, &resp, &seed, &crs.g, &crs.h),
            None => Outcome::NoData,
        };
        (uid, outcome, latency_ms)
    });

    let wave_results = join_all(futures).await;
    let mut outcomes = Vec::with_capacity(wave_results.len());
    for (uid, outcome, latency_ms) in wave_results {
        if outcome != Outcome::NoData {
            let success = outcome == Outcome::Verified;
            ctx.reputation.update_statistics(&resolve_hotkey(round_ctx.metagraph, uid), success, TaskType::Retrieve, Some(latency_ms)).await;
        }
        outcomes.push(WaveOutcome { uid, outcome, latency_ms });
    }

    let rewards = score_wave(ctx, round_ctx.metagraph, &outcomes).await;
    record_event(TaskType::Retrieve, &outcomes, &rewards, start.elapsed(), round_ctx.current_block)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::config::ValidatorConfig;
    use crate::metadata::{InMemoryMetadataStore, MetadataStore};
    use crate::metrics::MetricsRegistry;
    use crate::orchestrator::test_support::{FakeChainClient, FakeMetagraph, FakeMinerFabric};
    use crate::orchestrator::ValidatorContext;
    use crate::types::{BlobMetadata, EncryptionPayload, Hotkey};

    use super::*;

    fn make_ctx(n: usize) -> (ValidatorContext<FakeChainClient, FakeMinerFabric, InMemoryMetadataStore>, FakeMetagraph) {
        let metagraph = FakeMetagraph::new(n, 0);
        let chain_client = FakeChainClient::new(metagraph.hotkeys.clone());
        let fabric = FakeMinerFabric::new();
        let metadata = InMemoryMetadataStore::new();
        let metrics = Arc::new(MetricsRegistry::new().unwrap());
        let ctx = ValidatorContext::new(ValidatorConfig::default(), chain_client, fabric, metadata, metrics);
        (ctx, metagraph)
    }

    fn sample_blob(data_hash: &str) -> BlobToStore {
        BlobToStore {
            data_hash: data_hash.to_string(),
            ciphertext: format!("payload for {data_hash}").into_bytes(),
            encryption_payload: EncryptionPayload { nonce: vec![0u8; 12], tag: vec![0u8; 16] },
        }
    }

    #[tokio::test]
    async fn store_round_replicates_to_redundancy_count_and_writes_metadata() {
        let (mut ctx, metagraph) = make_ctx(6);
        ctx.config.protocol.store_redundancy = 3;
        let round_ctx = RoundContext { ctx: &ctx, metagraph: &metagraph, current_block: 1 };
        let mut rng = StdRng::seed_from_u64(42);

        let blob = sample_blob("blob-a");
        let event = run_store_round(&round_ctx, &blob, &mut rng).await;

        let successes = event.per_uid_success.values().filter(|v| **v).count();
        assert_eq!(successes, 3);

        let mut replicated = 0;
        for uid in 0..6u16 {
            let hotkey = Hotkey(format!("hotkey-{uid}"));
            if ctx.metadata.get_metadata(&hotkey, &blob.data_hash).await.unwrap().is_some() {
                replicated += 1;
            }
        }
        assert_eq!(replicated, 3);
    }

    #[tokio::test]
    async fn store_round_skips_miners_already_at_capacity() {
        let (mut ctx, metagraph) = make_ctx(4);
        ctx.config.protocol.store_redundancy = 3;

        // Uid 1 is pinned at capacity ahead of time; it must never receive a
        // Store even though it is otherwise reachable.
        let saturated_hotkey = Hotkey("hotkey-1".to_string());
        ctx.metadata
            .add_metadata(
                &saturated_hotkey,
                &"existing".to_string(),
                BlobMetadata::new(
                    "existing".to_string(),
                    2 * 1024 * 1024 * 1024,
                    EncryptionPayload { nonce: vec![], tag: vec![] },
                    0,
                ),
            )
            .await
            .unwrap();

        let round_ctx = RoundContext { ctx: &ctx, metagraph: &metagraph, current_block: 1 };
        let mut rng = StdRng::seed_from_u64(7);
        let blob = sample_blob("blob-b");
        let event = run_store_round(&round_ctx, &blob, &mut rng).await;

        assert!(!event.per_uid_success.contains_key(&1));
        assert!(ctx.metadata.get_metadata(&saturated_hotkey, &blob.data_hash).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn challenge_round_verifies_known_good_blob() {
        let (ctx, metagraph) = make_ctx(4);
        let mut rng = StdRng::seed_from_u64(3);

        let round_ctx = RoundContext { ctx: &ctx, metagraph: &metagraph, current_block: 1 };
        let blob = sample_blob("blob-c");
        let store_event = run_store_round(&round_ctx, &blob, &mut rng).await;
        let stored_uid = *store_event.per_uid_success.iter().find(|(_, ok)| **ok).unwrap().0;

        let lookup = |uid: Uid| {
            if uid == stored_uid {
                ctx.fabric.any_blob_with_root(uid)
            } else {
                None
            }
        };
        let event = run_challenge_round(&round_ctx, lookup, &mut rng).await;
        assert_eq!(event.per_uid_success.get(&stored_uid), Some(&true));
    }

    #[tokio::test]
    async fn store_round_writes_chunk_metadata_for_every_chunk() {
        let (mut ctx, metagraph) = make_ctx(4);
        ctx.config.protocol.override_chunk_size = 4;
        let round_ctx = RoundContext { ctx: &ctx, metagraph: &metagraph, current_block: 1 };
        let mut rng = StdRng::seed_from_u64(5);

        let blob = sample_blob("blob-d");
        let expected_chunks = blob.ciphertext.chunks(4).count();
        run_store_round(&round_ctx, &blob, &mut rng).await;

        let entries = ctx.metadata.get_ordered_metadata(&blob.data_hash).await.unwrap();
        assert_eq!(entries.len(), expected_chunks);
        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry.chunk_index, i);
        }
    }

    #[tokio::test]
    async fn challenge_round_samples_index_within_multi_chunk_blob() {
        let (mut ctx, metagraph) = make_ctx(4);
        ctx.config.protocol.override_chunk_size = 4;
        let round_ctx = RoundContext { ctx: &ctx, metagraph: &metagraph, current_block: 1 };
        let mut rng = StdRng::seed_from_u64(11);

        let blob = sample_blob("blob-e");
        let store_event = run_store_round(&round_ctx, &blob, &mut rng).await;
        let stored_uid = *store_event.per_uid_success.iter().find(|(_, ok)| **ok).unwrap().0;

        let lookup = |uid: Uid| if uid == stored_uid { ctx.fabric.any_blob_with_root(uid) } else { None };
        let event = run_challenge_round(&round_ctx, lookup, &mut rng).await;
        assert_eq!(event.per_uid_success.get(&stored_uid), Some(&true));
    }

    #[tokio::test]
    async fn retrieve_round_reports_no_data_for_unknown_blob() {
        let (ctx, metagraph) = make_ctx(4);
        let round_ctx = RoundContext { ctx: &ctx, metagraph: &metagraph, current_block: 1 };
        let mut rng = StdRng::seed_from_u64(9);

        let lookup = |_uid: Uid| None;
        let event = run_retrieve_round(&round_ctx, lookup, &mut rng).await;
        assert!(event.per_uid_success.is_empty());
    }

    #[test]
    fn resolved_chunk_size_honors_nonzero_override() {
        let mut cfg = ProtocolConfig::default();
        cfg.override_chunk_size = 4096;
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(resolved_chunk_size(&cfg, &mut rng), 4096);
    }

    #[test]
    fn resolved_chunk_size_randomizes_within_bounds_when_zero() {
        let mut cfg = ProtocolConfig::default();
        cfg.min_chunk_size = 100;
        cfg.chunk_factor = 4;
        cfg.override_chunk_size = 0;
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..20 {
            let size = resolved_chunk_size(&cfg, &mut rng);
            assert!((100..=400).contains(&size));
        }
    }
}
