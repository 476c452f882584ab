//! The reward aggregator (C5): per-response reward vectors folded into a
//! moving-average score tensor used to set on-chain weights.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::Uid;

/// Raw per-response reward before latency weighting, per spec: `+1 *
/// tier_factor` on success, `-0.1 * tier_factor` on verified failure, `0` on
/// no-data.
pub fn raw_reward(success: bool, had_data: bool, tier_factor: f64) -> f64 {
    if !had_data {
        0.0
    } else if success {
        tier_factor
    } else {
        -0.1 * tier_factor
    }
}

/// Maps a set of per-uid processing times to `[0, 1]` by min-max
/// normalization: the fastest response scores 1, the slowest scores 0. A
/// single-entry or all-equal round maps every latency to 1.
pub fn normalize_latency_minmax(latencies_ms: &BTreeMap<Uid, u64>) -> BTreeMap<Uid, f64> {
    if latencies_ms.is_empty() {
        return BTreeMap::new();
    }
    let min = *latencies_ms.values().min().unwrap();
    let max = *latencies_ms.values().max().unwrap();
    if min == max {
        return latencies_ms.keys().map(|uid| (*uid, 1.0)).collect();
    }
    latencies_ms
        .iter()
        .map(|(uid, latency)| {
            let score = 1.0 - (*latency - min) as f64 / (max - min) as f64;
            (*uid, score)
        })
        .collect()
}

/// Combines raw reward and the latency-normalized score into the final
/// per-uid reward for a round (the "minmax" mode).
pub fn combine_reward(raw: f64, latency_score: f64) -> f64 {
    raw * latency_score
}

/// Owns `moving_averaged_scores`, the dense, bounded score vector this crate
/// normalizes and submits on-chain as weights.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RewardState {
    scores: BTreeMap<Uid, f64>,
    alpha: f64,
    decay_rate: f64,
    tier_factor_max: f64,
}

impl RewardState {
    pub fn new(alpha: f64, decay_rate: f64, tier_factor_max: f64) -> Self {
        RewardState {
            scores: BTreeMap::new(),
            alpha,
            decay_rate,
            tier_factor_max,
        }
    }

    pub fn score(&self, uid: Uid) -> f64 {
        self.scores.get(&uid).copied().unwrap_or(0.0)
    }

    /// Folds one round's reward vector into `moving_averaged_scores`:
    /// `s[uid] <- (1-alpha)*s[uid] + alpha*reward[uid]` for touched uids;
    /// untouched uids decay by `(1 - alpha*decay_rate)` to prevent stale
    /// dominance.
    pub fn apply_round(&mut self, rewards: &BTreeMap<Uid, f64>, all_known_uids: &[Uid]) {
        for uid in all_known_uids {
            let current = self.score(*uid);
            let updated = match rewards.get(uid) {
                Some(reward) => (1.0 - self.alpha) * current + self.alpha * reward,
                None => current * (1.0 - self.alpha * self.decay_rate),
            };
            let clamped = updated.clamp(-self.tier_factor_max, self.tier_factor_max);
            self.scores.insert(*uid, clamped);
        }
    }

    /// Normalizes the current score vector to sum to 1 over positive
    /// entries, the shape the chain client's `set_weights` expects.
    pub fn normalized(&self) -> BTreeMap<Uid, f64> {
        let positive_sum: f64 = self.scores.values().filter(|v| **v > 0.0).sum();
        if positive_sum <= 0.0 {
            return self.scores.keys().map(|uid| (*uid, 0.0)).collect();
        }
        self.scores
            .iter()
            .map(|(uid, score)| (*uid, score.max(0.0) / positive_sum))
            .collect()
    }

    pub fn scores_snapshot(&self) -> BTreeMap<Uid, f64> {
        self.scores.clone()
    }

    pub fn restore(&mut self, scores: BTreeMap<Uid, f64>) {
        self.scores = scores;
    }
}

/// Tracks whether it's time to submit weights: every `blocks_per_weight`
/// blocks since the last submission.
pub fn should_set_weights(current_block: u64, last_submission_block: u64, blocks_per_weight: u64) -> bool {
    current_block.saturating_sub(last_submission_block) >= blocks_per_weight
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_reward_matches_spec_constants() {
        assert_eq!(raw_reward(true, true, 1.5), 1.5);
        assert_eq!(raw_reward(false, true, 1.5), -0.15);
        assert_eq!(raw_reward(false, false, 1.5), 0.0);
    }

    #[test]
    fn normalize_latency_maps_fastest_to_one() {
        let mut latencies = BTreeMap::new();
        latencies.insert(1u16, 100u64);
        latencies.insert(2u16, 500u64);
        latencies.insert(3u16, 1000u64);
        let scores = normalize_latency_minmax(&latencies);
        assert_eq!(scores[&1], 1.0);
        assert_eq!(scores[&3], 0.0);
        assert!(scores[&2] > 0.0 && scores[&2] < 1.0);
    }

    #[test]
    fn normalize_latency_single_entry_is_one() {
        let mut latencies = BTreeMap::new();
        latencies.insert(1u16, 250u64);
        let scores = normalize_latency_minmax(&latencies);
        assert_eq!(scores[&1], 1.0);
    }

    #[test]
    fn ema_update_moves_score_toward_reward() {
        let mut state = RewardState::new(0.05, 1.0, 2.0);
        let mut rewards = BTreeMap::new();
        rewards.insert(1u16, 1.0);
        state.apply_round(&rewards, &[1]);
        assert!(state.score(1) > 0.0 && state.score(1) < 1.0);
    }

    #[test]
    fn untouched_uids_decay_toward_zero() {
        let mut state = RewardState::new(0.1, 1.0, 2.0);
        let mut rewards = BTreeMap::new();
        rewards.insert(1u16, 1.0);
        state.apply_round(&rewards, &[1, 2]);
        let first_score_uid2 = state.score(2);
        state.apply_round(&BTreeMap::new(), &[1, 2]);
        assert!(state.score(2) <= first_score_uid2);
    }

    #[test]
    fn scores_stay_within_tier_factor_bounds() {
        let mut state = RewardState::new(0.5, 1.0, 2.0);
        let mut rewards = BTreeMap::new();
        rewards.insert(1u16, 100.0);
        for _ in 0..50 {
            state.apply_round(&rewards, &[1]);
        }
        assert!(state.score(1) <= 2.0);
    }

    #[test]
    fn weight_submission_interval_gates_on_block_delta() {
        assert!(!should_set_weights(105, 100, 10));
        assert!(should_set_weights(110, 100, 10));
        assert!(should_set_weights(200, 100, 10));
    }

    #[test]
    fn restore_round_trips_through_snapshot() {
        let mut state = RewardState::new(0.05, 1.0, 2.0);
        let mut rewards = BTreeMap::new();
        rewards.insert(1u16, 1.0);
        state.apply_round(&rewards, &[1]);
        let snapshot = state.scores_snapshot();

        let mut restored = RewardState::new(0.05, 1.0, 2.0);
        restored.restore(snapshot);
        assert_eq!(restored.score(1), state.score(1));
    }
}
