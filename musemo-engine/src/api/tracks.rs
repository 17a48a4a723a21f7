//! Track artifact endpoints
//!
//! PUT /tracks/:track_id/eda/:user_id stores a per-user biosignal recording;
//! GET /tracks/:track_id/artifacts lists the artifact descriptors in a track
//! namespace.

use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use serde::Serialize;
use std::collections::HashMap;

use crate::error::{EngineError, EngineResult};
use crate::store::{ArtifactStore, PutOutcome, StoreError};
use crate::types::{ArtifactKind, ArtifactRef};
use crate::AppState;

/// PUT /tracks/:track_id/eda/:user_id response
#[derive(Debug, Serialize)]
pub struct EdaStoreResponse {
    /// False when an identical key already existed (first write wins)
    pub created: bool,
}

/// PUT /tracks/:track_id/eda/:user_id
///
/// Body is a JSON object mapping channel name to raw samples. Every
/// configured channel must be present and non-empty; sample counts are
/// arbitrary, the inference path resamples to the fixed length.
pub async fn store_eda(
    State(state): State<AppState>,
    Path((track_id, user_id)): Path<(String, String)>,
    Json(channels): Json<HashMap<String, Vec<f32>>>,
) -> EngineResult<Json<EdaStoreResponse>> {
    for channel in &state.config.eda.channels {
        match channels.get(channel) {
            Some(samples) if !samples.is_empty() => {}
            Some(_) => {
                return Err(EngineError::Input(format!(
                    "channel '{}' must not be empty",
                    channel
                )))
            }
            None => {
                return Err(EngineError::Input(format!(
                    "missing channel '{}'",
                    channel
                )))
            }
        }
    }

    let artifact = ArtifactRef::user(&track_id, ArtifactKind::Eda, &user_id);
    let payload = serde_json::to_vec(&channels)
        .map_err(|e| EngineError::Internal(format!("eda serialization failed: {}", e)))?;

    state
        .store
        .ensure_namespace(&artifact.track_id)
        .await
        .map_err(|e| EngineError::Internal(format!("namespace creation failed: {}", e)))?;
    let outcome = state
        .store
        .put(&artifact, &payload)
        .await
        .map_err(|e| EngineError::Internal(format!("store write failed: {}", e)))?;

    Ok(Json(EdaStoreResponse {
        created: outcome == PutOutcome::Created,
    }))
}

/// GET /tracks/:track_id/artifacts
pub async fn list_artifacts(
    State(state): State<AppState>,
    Path(track_id): Path<String>,
) -> EngineResult<Json<Vec<ArtifactRef>>> {
    match state.store.list(&track_id).await {
        Ok(mut artifacts) => {
            artifacts.sort_by_key(|a| a.object_name());
            Ok(Json(artifacts))
        }
        Err(StoreError::NotFound(_)) => Err(EngineError::NotFound(format!(
            "unknown track '{}'",
            track_id.to_lowercase()
        ))),
        Err(e) => Err(EngineError::Internal(format!("store list failed: {}", e))),
    }
}

/// Build track artifact routes
pub fn track_routes() -> Router<AppState> {
    Router::new()
        .route("/tracks/:track_id/eda/:user_id", put(store_eda))
        .route("/tracks/:track_id/artifacts", get(list_artifacts))
}
