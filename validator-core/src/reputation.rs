//! The reputation engine (C4): rolling success/latency statistics, tier
//! assignment, and tier-factor lookup.
//!
//! `compute_all_tiers` is a pure projection over all known hotkeys' stats
//! and is safe to run concurrently with `update_statistics` — reads are a
//! snapshot, writes are idempotent and monotonic. Tier changes only take
//! effect once [`ReputationEngine::recompute_tiers`] is called at a round
//! boundary, so reward calculations within a round see a consistent
//! `tier_factor`.

use std::collections::{BTreeMap, VecDeque};

use tokio::sync::Mutex;

use crate::types::{Hotkey, TaskType, Tier};

const LATENCY_WINDOW: usize = 50;

#[derive(Clone, Debug, Default)]
struct TaskStats {
    success_count: u64,
    attempt_count: u64,
    /// Exponentially decayed success ratio, updated on every observation.
    decayed_success_ratio: f64,
}

impl TaskStats {
    fn record(&mut self, success: bool, decay: f64) {
        self.attempt_count += 1;
        if success {
            self.success_count += 1;
        }
        let observation = if success { 1.0 } else { 0.0 };
        self.decayed_success_ratio = (1.0 - decay) * self.decayed_success_ratio + decay * observation;
    }
}

#[derive(Clone, Debug, Default)]
struct MinerStats {
    per_task: BTreeMap<TaskType, TaskStats>,
    latency_samples_ms: VecDeque<u64>,
    uptime: f64,
}

impl MinerStats {
    fn total_attempts(&self) -> u64 {
        self.per_task.values().map(|t| t.attempt_count).sum()
    }

    fn overall_success_ratio(&self) -> f64 {
        let total_success: u64 = self.per_task.values().map(|t| t.success_count).sum();
        let total_attempts = self.total_attempts();
        if total_attempts == 0 {
            0.0
        } else {
            total_success as f64 / total_attempts as f64
        }
    }

    fn latency_median_ms(&self) -> u64 {
        if self.latency_samples_ms.is_empty() {
            return u64::MAX;
        }
        let mut sorted: Vec<u64> = self.latency_samples_ms.iter().copied().collect();
        sorted.sort_unstable();
        sorted[sorted.len() / 2]
    }
}

struct TierThreshold {
    tier: Tier,
    min_success_ratio: f64,
    max_latency_median_ms: u64,
    min_uptime: f64,
}

/// Thresholds are checked from the highest tier down; the first one every
/// condition is met for wins.
fn tier_thresholds() -> [TierThreshold; 4] {
    [
        TierThreshold { tier: Tier::Platinum, min_success_ratio: 0.98, max_latency_median_ms: 500, min_uptime: 0.99 },
        TierThreshold { tier: Tier::Gold, min_success_ratio: 0.95, max_latency_median_ms: 1_500, min_uptime: 0.95 },
        TierThreshold { tier: Tier::Silver, min_success_ratio: 0.85, max_latency_median_ms: 5_000, min_uptime: 0.85 },
        TierThreshold { tier: Tier::Bronze, min_success_ratio: 0.0, max_latency_median_ms: u64::MAX, min_uptime: 0.0 },
    ]
}

/// A pure snapshot of tiers computed for every known hotkey.
#[derive(Clone, Debug, Default)]
pub struct TierTable {
    tiers: BTreeMap<Hotkey, Tier>,
}

impl TierTable {
    pub fn tier_of(&self, hotkey: &Hotkey) -> Tier {
        self.tiers.get(hotkey).copied().unwrap_or(Tier::Provisional)
    }

    pub fn tier_factor(&self, hotkey: &Hotkey) -> f64 {
        self.tier_of(hotkey).factor()
    }
}

/// Owns per-miner statistics and the most recently computed [`TierTable`].
pub struct ReputationEngine {
    stats: Mutex<BTreeMap<Hotkey, MinerStats>>,
    tiers: Mutex<TierTable>,
    min_attempts: u32,
    decay: f64,
}

impl ReputationEngine {
    pub fn new(min_attempts: u32, decay: f64) -> Self {
        ReputationEngine {
            stats: Mutex::new(BTreeMap::new()),
            tiers: Mutex::new(TierTable::default()),
            min_attempts,
            decay,
        }
    }

    /// Records the outcome of one interaction with `hotkey`.
    pub async fn update_statistics(&self, hotkey: &Hotkey, success: bool, task: TaskType, latency_ms: Option<u64>) {
        let mut stats = self.stats.lock().await;
        let entry = stats.entry(hotkey.clone()).or_default();
        entry.per_task.entry(task).or_default().record(success, self.decay);
        if let Some(latency) = latency_ms {
            entry.latency_samples_ms.push_back(latency);
            if entry.latency_samples_ms.len() > LATENCY_WINDOW {
                entry.latency_samples_ms.pop_front();
            }
        }
        entry.uptime = entry.overall_success_ratio();
    }

    /// Pure projection of current stats into a [`TierTable`], without
    /// mutating the cached table other miners are currently reading.
    pub async fn compute_all_tiers(&self) -> TierTable {
        let stats = self.stats.lock().await;
        let mut tiers = BTreeMap::new();
        for (hotkey, miner) in stats.iter() {
            let tier = if miner.total_attempts() < self.min_attempts as u64 {
                Tier::Provisional
            } else {
                let ratio = miner.overall_success_ratio();
                let latency = miner.latency_median_ms();
                let uptime = miner.uptime;
                tier_thresholds()
                    .into_iter()
                    .find(|t| ratio >= t.min_success_ratio && latency <= t.max_latency_median_ms && uptime >= t.min_uptime)
                    .map(|t| t.tier)
                    .unwrap_or(Tier::Provisional)
            };
            tiers.insert(hotkey.clone(), tier);
        }
        TierTable { tiers }
    }

    /// Recomputes tiers and swaps in the new table as the round boundary.
    pub async fn recompute_tiers(&self) {
        let new_table = self.compute_all_tiers().await;
        let mut tiers = self.tiers.lock().await;
        *tiers = new_table;
    }

    /// Pure lookup against the most recently computed table (not live
    /// stats), so tier changes never shift mid-round.
    pub async fn get_tier_factor(&self, hotkey: &Hotkey) -> f64 {
        self.tiers.lock().await.tier_factor(hotkey)
    }

    pub async fn get_tier(&self, hotkey: &Hotkey) -> Tier {
        self.tiers.lock().await.tier_of(hotkey)
    }
}
