//! Ingestion endpoint
//!
//! POST /ingest runs the full pipeline for one track and returns the
//! per-stage status map. Partial stage failure is still a 200; only
//! structural input errors and unattributable faults produce error codes.

use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;

use crate::error::{EngineError, EngineResult};
use crate::types::IngestStatus;
use crate::AppState;

/// POST /ingest request body
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub track_id: String,
    pub source_url: String,
}

/// POST /ingest
pub async fn ingest(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> EngineResult<Json<IngestStatus>> {
    if request.track_id.trim().is_empty() {
        return Err(EngineError::Input("track_id must not be empty".to_string()));
    }
    if request.source_url.trim().is_empty() {
        return Err(EngineError::Input(
            "source_url must not be empty".to_string(),
        ));
    }

    let status = state
        .orchestrator
        .ingest(&request.track_id, &request.source_url)
        .await?;
    Ok(Json(status))
}

/// Build ingestion routes
pub fn ingest_routes() -> Router<AppState> {
    Router::new().route("/ingest", post(ingest))
}
