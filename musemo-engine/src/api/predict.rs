//! Inference endpoint
//!
//! POST /predict gathers the stored modalities for a (track, user) pair and
//! runs the affect model. Missing identifiers and missing modalities are
//! client errors; model-load faults are server errors fatal only for the
//! current request.

use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;

use crate::error::{EngineError, EngineResult};
use crate::types::PredictionResult;
use crate::AppState;

/// POST /predict request body
#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub track_id: String,
    pub user_id: String,
}

/// POST /predict
pub async fn predict(
    State(state): State<AppState>,
    Json(request): Json<PredictRequest>,
) -> EngineResult<Json<PredictionResult>> {
    if request.track_id.trim().is_empty() {
        return Err(EngineError::Input("track_id must not be empty".to_string()));
    }
    if request.user_id.trim().is_empty() {
        return Err(EngineError::Input("user_id must not be empty".to_string()));
    }

    let result = state
        .engine
        .predict(&request.track_id, &request.user_id)
        .await?;
    Ok(Json(result))
}

/// Build inference routes
pub fn predict_routes() -> Router<AppState> {
    Router::new().route("/predict", post(predict))
}
