//! The miner selector (C6): availability-filtered random sampling of peers.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::types::{Hotkey, Uid};

/// A point-in-time view of the network's registered miners, supplied by the
/// external chain client. Parameterized as a trait the way `ForkChoice`/
/// `TxPool` are small seams in the teacher rather than baked into the
/// engine.
pub trait Metagraph: Send + Sync {
    fn n(&self) -> usize;
    fn uid_of(&self, hotkey: &Hotkey) -> Option<Uid>;
    fn hotkey_of(&self, uid: Uid) -> Option<Hotkey>;
    fn is_reachable(&self, uid: Uid) -> bool;
    fn self_uid(&self) -> Uid;
}

/// Resolves a `uid` to the hotkey the reputation/metadata layers key on,
/// falling back to a synthetic placeholder only if the metagraph has no
/// entry for it (a uid it itself just returned, so this should not happen
/// in practice).
pub fn resolve_hotkey(metagraph: &dyn Metagraph, uid: Uid) -> Hotkey {
    metagraph.hotkey_of(uid).unwrap_or_else(|| Hotkey(uid.to_string()))
}

/// What a round needs a candidate miner to satisfy, beyond reachability.
pub enum Availability<'a> {
    /// Store rounds: exclude miners already at storage capacity.
    NotAtCapacity { at_capacity: &'a (dyn Fn(Uid) -> bool + Send + Sync) },
    /// Challenge/Retrieve rounds: only miners holding at least one blob.
    HasStoredBlob { has_blob: &'a (dyn Fn(Uid) -> bool + Send + Sync) },
}

/// Returns up to `k` distinct uids drawn uniformly at random, without
/// replacement, from peers that are reachable, not self, and satisfy
/// `availability`. Never blocks, never errors; returns fewer than `k` if
/// fewer qualify.
pub fn get_available_query_miners(
    metagraph: &dyn Metagraph,
    k: usize,
    availability: &Availability,
    rng: &mut impl Rng,
) -> Vec<Uid> {
    let self_uid = metagraph.self_uid();
    let mut candidates: Vec<Uid> = (0..metagraph.n() as Uid)
        .filter(|uid| *uid != self_uid)
        .filter(|uid| metagraph.is_reachable(*uid))
        .filter(|uid| match availability {
            Availability::NotAtCapacity { at_capacity } => !at_capacity(*uid),
            Availability::HasStoredBlob { has_blob } => has_blob(*uid),
        })
        .collect();

    candidates.shuffle(rng);
    candidates.truncate(k);
    candidates
}
