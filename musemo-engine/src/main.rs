//! musemo-engine - Affect Estimation Service
//!
//! HTTP service wrapping the media-processing pipeline and the multimodal
//! inference engine. Configuration, the feature normalization tables, and
//! the capability implementations (filesystem store, HTTP fetcher,
//! subprocess extractor, ONNX model loader) are wired here once at startup.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use musemo_engine::config::{EngineConfig, FeatureNormalization};
use musemo_engine::descriptors::SmileExtractor;
use musemo_engine::fetch::HttpFetcher;
use musemo_engine::inference::{InferenceEngine, OnnxModelLoader};
use musemo_engine::pipeline::Orchestrator;
use musemo_engine::store::FsArtifactStore;
use musemo_engine::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting musemo-engine (Affect Estimation)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(EngineConfig::load());
    info!("Data directory: {}", config.data_dir.display());

    tokio::fs::create_dir_all(config.store_root())
        .await
        .context("Failed to initialize artifact store root")?;

    let normalization = Arc::new(
        FeatureNormalization::load(&config)
            .context("Failed to load feature normalization tables")?,
    );
    info!(
        selected_features = normalization.selected().len(),
        "Feature normalization tables loaded"
    );

    let store = Arc::new(FsArtifactStore::new(config.store_root()));
    let fetcher = Arc::new(HttpFetcher::new(config.fetch.timeout()));
    let extractor = Arc::new(SmileExtractor::new(
        config.descriptors.extractor_bin.clone(),
        config.resolve_path(&config.descriptors.extractor_config),
    ));
    let loader = Arc::new(OnnxModelLoader::new(config.model_weights()));

    let orchestrator = Arc::new(Orchestrator::new(
        config.clone(),
        normalization.clone(),
        store.clone(),
        fetcher,
        extractor,
    ));
    let engine = Arc::new(InferenceEngine::new(
        config.clone(),
        normalization,
        store.clone(),
        loader,
    ));

    let state = AppState::new(config.clone(), store, orchestrator, engine);
    let app = musemo_engine::build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
