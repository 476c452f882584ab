use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use validator_core::orchestrator::StepInputs;
use validator_core::types::StepSnapshot;

use crate::state::SharedState;

#[derive(Serialize)]
pub struct TriggerResponse {
    pub snapshot: StepSnapshot,
    pub weights_submitted: bool,
}

/// `POST /trigger`
///
/// Runs one step out of band, against whatever blobs the embedded miner
/// fabric happens to be holding. No Store is attempted here — only
/// Challenge, Retrieve, and Rebalance, so a trigger never depends on a
/// caller-supplied payload.
pub async fn trigger(State(state): State<SharedState>) -> Result<Json<TriggerResponse>, (StatusCode, String)> {
    let mut step = state.step.lock().await;
    let mut rng = state.rng.lock().await;

    let inputs = StepInputs {
        pending_stores: Vec::new(),
        stored_blob_for_challenge: &|uid| state.ctx.fabric.any_blob_with_root(uid),
        stored_blob_for_retrieve: &|uid| state.ctx.fabric.any_blob(uid),
        stored_blob_for_rebalance: &|uid| state.ctx.fabric.any_blob(uid),
        rebalance_source_count: 1,
    };

    let outcome = step
        .run(&state.ctx, &state.metagraph, inputs, &mut *rng)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(TriggerResponse { snapshot: outcome.snapshot, weights_submitted: outcome.weights_submitted }))
}
