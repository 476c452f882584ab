//! Persisted validator state: `moving_averaged_scores`, `step`, and
//! `prev_step_block`, written after every successful weight submission and
//! reloaded on restart so a restart never regresses reputation.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::Uid;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistedState {
    pub moving_averaged_scores: BTreeMap<Uid, f64>,
    pub step: u64,
    pub prev_step_block: u64,
}

impl PersistedState {
    pub fn new() -> Self {
        PersistedState {
            moving_averaged_scores: BTreeMap::new(),
            step: 0,
            prev_step_block: 0,
        }
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self).expect("PersistedState serializes to JSON");
        tokio::fs::write(path, json).await
    }

    pub async fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        serde_json::from_slice(&bytes).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub async fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(&path).await {
            Ok(state) => state,
            Err(_) => PersistedState::new(),
        }
    }
}

impl Default for PersistedState {
    fn default() -> Self {
        Self::new()
    }
}
