//! # Musemo Engine
//!
//! Media-processing and multimodal-inference service. Converts a raw audio
//! track plus a per-user biosignal recording into a multimodal feature set
//! and runs it through a regression model to estimate affective
//! valence/arousal.
//!
//! Pipeline: fetch → transcode → {spectrogram raster, acoustic descriptors}
//! → artifact store; inference gathers the stored modalities, resamples the
//! biosignal, assembles tensors, and runs the shared model.

pub mod api;
pub mod config;
pub mod descriptors;
pub mod dsp;
pub mod error;
pub mod fetch;
pub mod inference;
pub mod pipeline;
pub mod signal;
pub mod store;
pub mod transcode;
pub mod types;

pub use error::{EngineError, EngineResult};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::inference::InferenceEngine;
use crate::pipeline::Orchestrator;
use crate::store::ArtifactStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Resolved configuration, loaded once at startup
    pub config: Arc<EngineConfig>,
    /// Durable artifact store
    pub store: Arc<dyn ArtifactStore>,
    /// Ingestion pipeline orchestrator
    pub orchestrator: Arc<Orchestrator>,
    /// Multimodal inference engine
    pub engine: Arc<InferenceEngine>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        config: Arc<EngineConfig>,
        store: Arc<dyn ArtifactStore>,
        orchestrator: Arc<Orchestrator>,
        engine: Arc<InferenceEngine>,
    ) -> Self {
        Self {
            config,
            store,
            orchestrator,
            engine,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::ingest_routes())
        .merge(api::predict_routes())
        .merge(api::track_routes())
        .merge(api::health_routes())
        .with_state(state)
}
