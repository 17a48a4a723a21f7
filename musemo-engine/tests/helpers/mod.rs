//! Shared test doubles and fixtures for musemo-engine integration tests
//!
//! Every external collaborator the engine consumes (source fetcher,
//! descriptor extractor, model loader) has a stub here, substituted through
//! the same capability traits the binary wires with real implementations.
#![allow(dead_code)]

use async_trait::async_trait;
use musemo_engine::config::{EngineConfig, FeatureNormalization, SpectrogramConfig};
use musemo_engine::descriptors::{self, DescriptorExtractor};
use musemo_engine::dsp;
use musemo_engine::error::{EngineError, EngineResult, StageError};
use musemo_engine::fetch::SourceFetcher;
use musemo_engine::inference::{AffectModel, InferenceEngine, ModelInput, ModelLoader};
use musemo_engine::pipeline::Orchestrator;
use musemo_engine::store::{ArtifactStore, FsArtifactStore};
use musemo_engine::transcode;
use musemo_engine::types::{ArtifactKind, ArtifactRef, RawDescriptorRow};
use musemo_engine::AppState;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Stereo 16-bit WAV of a 440 Hz sine, used as fetched source audio (the
/// transcoder accepts any symphonia container)
pub fn source_audio_fixture(seconds: f32) -> Vec<u8> {
    let sample_rate = 22050u32;
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        let n = (sample_rate as f32 * seconds) as usize;
        for i in 0..n {
            let t = i as f32 / sample_rate as f32;
            let value = (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5;
            let quantized = (value * i16::MAX as f32) as i16;
            writer.write_sample(quantized).unwrap();
            writer.write_sample(quantized).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Normalization tables matching [`descriptor_row`]
pub fn test_normalization() -> FeatureNormalization {
    FeatureNormalization::from_parts(
        vec![
            ("loudness_amean".to_string(), 2.0),
            ("flux_stddev".to_string(), 0.0),
            ("mfcc1_amean".to_string(), -1.0),
        ],
        vec![
            ("loudness_amean".to_string(), 0.25),
            ("flux_stddev".to_string(), 2.0),
            ("mfcc1_amean".to_string(), 0.5),
        ],
        vec!["mfcc1_amean".to_string(), "loudness_amean".to_string()],
    )
    .unwrap()
}

/// Raw extractor output covering every column in [`test_normalization`]
pub fn descriptor_row() -> RawDescriptorRow {
    RawDescriptorRow {
        columns: vec![
            ("loudness_amean".to_string(), 2.5),
            ("flux_stddev".to_string(), 0.5),
            ("mfcc1_amean".to_string(), -3.0),
        ],
    }
}

/// EDA payload with both default channels at the given sample count
pub fn eda_payload(samples: usize) -> Vec<u8> {
    let arousal: Vec<f32> = (0..samples).map(|i| (i as f32 * 0.01).sin()).collect();
    let valence: Vec<f32> = (0..samples).map(|i| (i as f32 * 0.02).cos()).collect();
    serde_json::to_vec(&serde_json::json!({
        "arousal": arousal,
        "valence": valence,
    }))
    .unwrap()
}

pub struct StubFetcher {
    payload: Vec<u8>,
}

impl StubFetcher {
    pub fn new(payload: Vec<u8>) -> Self {
        Self { payload }
    }
}

#[async_trait]
impl SourceFetcher for StubFetcher {
    async fn fetch(&self, _url: &str) -> Result<Vec<u8>, StageError> {
        Ok(self.payload.clone())
    }
}

pub struct FailingFetcher;

#[async_trait]
impl SourceFetcher for FailingFetcher {
    async fn fetch(&self, _url: &str) -> Result<Vec<u8>, StageError> {
        Err(StageError::Fetch("fixture upstream unavailable".to_string()))
    }
}

pub struct StubExtractor;

#[async_trait]
impl DescriptorExtractor for StubExtractor {
    async fn extract(&self, _wav_path: &Path) -> Result<RawDescriptorRow, StageError> {
        Ok(descriptor_row())
    }
}

pub struct FailingExtractor;

#[async_trait]
impl DescriptorExtractor for FailingExtractor {
    async fn extract(&self, _wav_path: &Path) -> Result<RawDescriptorRow, StageError> {
        Err(StageError::Extraction(
            "fixture extractor unavailable".to_string(),
        ))
    }
}

/// Model double that counts forward passes and returns fixed outputs
pub struct CountingModel {
    invocations: AtomicUsize,
    output: (f32, f32),
}

impl CountingModel {
    pub fn new(arousal: f32, valence: f32) -> Self {
        Self {
            invocations: AtomicUsize::new(0),
            output: (arousal, valence),
        }
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

impl AffectModel for CountingModel {
    fn predict(&self, _input: ModelInput) -> EngineResult<(f32, f32)> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        Ok(self.output)
    }
}

/// Loader double that hands out a shared [`CountingModel`] and counts loads
pub struct StubLoader {
    model: Arc<CountingModel>,
    loads: AtomicUsize,
}

impl StubLoader {
    pub fn new(model: Arc<CountingModel>) -> Self {
        Self {
            model,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelLoader for StubLoader {
    async fn load(&self) -> EngineResult<Arc<dyn AffectModel>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.model.clone())
    }
}

pub struct FailingLoader;

#[async_trait]
impl ModelLoader for FailingLoader {
    async fn load(&self) -> EngineResult<Arc<dyn AffectModel>> {
        Err(EngineError::ModelLoad(
            "fixture weights unavailable".to_string(),
        ))
    }
}

/// Default configuration rooted at a per-test directory
pub fn engine_config(root: &Path) -> Arc<EngineConfig> {
    Arc::new(EngineConfig::with_data_dir(root))
}

/// Orchestrator over a filesystem store rooted at the config's data dir
pub fn build_orchestrator(
    config: Arc<EngineConfig>,
    fetcher: Arc<dyn SourceFetcher>,
    extractor: Arc<dyn DescriptorExtractor>,
) -> (Arc<Orchestrator>, Arc<dyn ArtifactStore>) {
    let store: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::new(config.store_root()));
    let orchestrator = Arc::new(Orchestrator::new(
        config,
        Arc::new(test_normalization()),
        store.clone(),
        fetcher,
        extractor,
    ));
    (orchestrator, store)
}

/// Inference engine over an existing store
pub fn build_engine(
    config: Arc<EngineConfig>,
    store: Arc<dyn ArtifactStore>,
    loader: Arc<dyn ModelLoader>,
) -> Arc<InferenceEngine> {
    Arc::new(InferenceEngine::new(
        config,
        Arc::new(test_normalization()),
        store,
        loader,
    ))
}

/// Full application state with every collaborator stubbed
pub fn build_state(
    config: Arc<EngineConfig>,
    fetcher: Arc<dyn SourceFetcher>,
    extractor: Arc<dyn DescriptorExtractor>,
    loader: Arc<dyn ModelLoader>,
) -> AppState {
    let normalization = Arc::new(test_normalization());
    let store: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::new(config.store_root()));
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
    AppState::new(config, store, orchestrator, engine)
}

/// Seed the spectrogram and features artifacts for a track, bypassing the
/// pipeline (payloads match what ingestion would produce)
pub async fn seed_track_modalities(store: &Arc<dyn ArtifactStore>, track_id: &str) {
    let wav = transcode::to_wav(&source_audio_fixture(1.0)).unwrap();
    let png = dsp::render_spectrogram(&wav, &SpectrogramConfig::default()).unwrap();
    store
        .put(&ArtifactRef::track(track_id, ArtifactKind::Spectrogram), &png)
        .await
        .unwrap();

    let features = descriptors::normalize_row(&descriptor_row(), &test_normalization()).unwrap();
    store
        .put(
            &ArtifactRef::track(track_id, ArtifactKind::Features),
            &features.to_csv(),
        )
        .await
        .unwrap();
}
