//! The rebalance engine (C8): migrates blobs off under-performing or
//! capacity-saturated miners, reusing the Store/Retrieve primitives exactly
//! as specified rather than a bespoke transport.
//!
//! Rebalance rewards are deliberately out of the per-round scoring loop
//! (per spec.md §9's resolved Open Question): a migration only updates
//! miner statistics and metadata, never `moving_averaged_scores`.

use std::time::Instant;

use rand::Rng;

use validator_crypto::commitment::Crs;
use validator_protocol::verify::{verify_retrieve_with_seed, verify_store_with_seed, Outcome};
use validator_protocol::{RetrieveRequest, Seed, StoreRequest};

use crate::chain_client::ChainClient;
use crate::fabric::MinerFabric;
use crate::metadata::MetadataStore;
use crate::selector::{get_available_query_miners, resolve_hotkey, Availability, Metagraph};
use crate::types::{BlobMetadata, DataHash, TaskType, Uid};

use super::round::resolved_chunk_size;
use super::ValidatorContext;

/// Outcome of attempting to migrate one blob off a source miner.
#[derive(Debug)]
pub enum MigrationOutcome {
    Migrated { data_hash: DataHash, from: Uid, to: Uid },
    /// Retrieve from the source failed; the blob is flagged at-risk and no
    /// migration happens this round.
    AtRisk { data_hash: DataHash, source: Uid },
    /// The source had nothing to migrate.
    NothingToMigrate { source: Uid },
}

/// Runs one Rebalance round: picks `k` source miners, migrates one blob
/// each to a freshly selected destination.
pub async fn run_rebalance_round<C, F, M>(
    ctx: &ValidatorContext<C, F, M>,
    metagraph: &dyn Metagraph,
    k: usize,
    blob_picker: impl Fn(Uid) -> Option<DataHash> + Sync,
    rng: &mut impl Rng,
) -> Vec<MigrationOutcome>
where
    C: ChainClient,
    F: MinerFabric,
    M: MetadataStore,
{
    let _timer = Instant::now();
    let has_blob = |uid: Uid| blob_picker(uid).is_some();
    let avail = Availability::HasStoredBlob { has_blob: &has_blob };
    let sources = get_available_query_miners(metagraph, k, &avail, rng);

    let mut at_capacity_by_uid = std::collections::BTreeMap::new();
    for uid in 0..metagraph.n() as Uid {
        let hotkey = resolve_hotkey(metagraph, uid);
        let tier = ctx.reputation.get_tier(&hotkey).await;
        let at_capacity = ctx.metadata.hotkey_at_capacity(&hotkey, tier.capacity_bytes()).await.unwrap_or(false);
        at_capacity_by_uid.insert(uid, at_capacity);
    }
    let at_capacity = |uid: Uid| at_capacity_by_uid.get(&uid).copied().unwrap_or(false);

    let mut outcomes = Vec::with_capacity(sources.len());
    for source in sources {
        let Some(data_hash) = blob_picker(source) else {
            outcomes.push(MigrationOutcome::NothingToMigrate { source });
            continue;
        };

        let retrieve_seed = Seed::generate(rng);
        let retrieve_crs = Crs::for_round(&retrieve_seed.0);
        let retrieve_request = RetrieveRequest::new(data_hash.clone(), retrieve_seed);
        let retrieve_response = ctx.fabric.retrieve(source, retrieve_request.clone()).await;

        let (ciphertext, outcome) = match &retrieve_response {
            Some(resp) => {
                let outcome = verify_retrieve_with_seed(&retrieve_request, resp, &retrieve_seed, &retrieve_crs.g, &retrieve_crs.h);
                let bytes = if outcome == Outcome::Verified {
                    base64_decode(&resp.encrypted_data_b64)
                } else {
                    None
                };
                (bytes, outcome)
            }
            None => (None, Outcome::NoData),
        };

        let source_hotkey = resolve_hotkey(metagraph, source);
        ctx.reputation
            .update_statistics(&source_hotkey, outcome == Outcome::Verified, TaskType::Retrieve, None)
            .await;

        let Some(ciphertext) = ciphertext else {
            outcomes.push(MigrationOutcome::AtRisk { data_hash, source });
            continue;
        };

        let exclude_source = |uid: Uid| uid == source || at_capacity(uid);
        let dest_avail = Availability::NotAtCapacity { at_capacity: &exclude_source };
        let mut destinations = get_available_query_miners(metagraph, 1, &dest_avail, rng);
        let Some(destination) = destinations.pop() else {
            outcomes.push(MigrationOutcome::AtRisk { data_hash, source });
            continue;
        };

        let store_seed = Seed::generate(rng);
        let store_crs = Crs::for_round(&store_seed.0);
        let chunk_size = resolved_chunk_size(&ctx.config.protocol, rng);
        let store_request = StoreRequest::new(&ciphertext, store_crs.g.to_hex(), store_crs.h.to_hex(), store_seed, chunk_size);
        let store_response = ctx.fabric.store(destination, store_request.clone()).await;

        let store_outcome = match &store_response {
            Some(resp) => verify_store_with_seed(&store_request, resp, &store_seed),
            None => Outcome::NoData,
        };

        if store_outcome != Outcome::Verified {
            outcomes.push(MigrationOutcome::AtRisk { data_hash, source });
            continue;
        }

        let new_metadata = BlobMetadata {
            data_hash: data_hash.clone(),
            size: ciphertext.len() as u64,
            encryption_payload: crate::types::EncryptionPayload { nonce: Vec::new(), tag: Vec::new() },
            prev_seed: Some(store_seed.0),
            ttl_seconds: 0,
        };
        let destination_hotkey = resolve_hotkey(metagraph, destination);
        if ctx.metadata.add_metadata(&destination_hotkey, &data_hash, new_metadata).await.is_ok() {
            let _ = ctx.metadata.remove_metadata(&source_hotkey, &data_hash).await;
            outcomes.push(MigrationOutcome::Migrated { data_hash, from: source, to: destination });
        } else {
            outcomes.push(MigrationOutcome::AtRisk { data_hash, source });
        }
    }

    outcomes
}

fn base64_decode(s: &str) -> Option<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(s).ok()
}
