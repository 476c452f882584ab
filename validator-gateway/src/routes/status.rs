use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::collections::BTreeMap;

use validator_core::metadata::MetadataStore;
use validator_core::types::Uid;

use crate::state::SharedState;

#[derive(Serialize)]
pub struct StatusResponse {
    pub step: u64,
    pub last_submission_block: u64,
    pub total_network_storage_bytes: u64,
    pub moving_averaged_scores: BTreeMap<Uid, f64>,
}

/// `GET /status`
///
/// Reports the step counter, the block weights were last submitted at, and
/// the current moving-averaged score vector.
pub async fn status(State(state): State<SharedState>) -> Result<Json<StatusResponse>, (StatusCode, String)> {
    let step_guard = state.step.lock().await;
    let moving_averaged_scores = state.ctx.reward_state.lock().await.scores_snapshot();
    let total_network_storage_bytes = state
        .ctx
        .metadata
        .total_network_storage()
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(StatusResponse {
        step: step_guard.index,
        last_submission_block: step_guard.last_submission_block(),
        total_network_storage_bytes,
        moving_averaged_scores,
    }))
}
