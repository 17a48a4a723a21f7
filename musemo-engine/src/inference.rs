//! Multimodal affect inference
//!
//! Gathers the three modalities for a (track, user) pair from the artifact
//! store, assembles batch-of-one tensors, and runs the regression model to
//! produce unclamped arousal/valence estimates.
//!
//! The model handle is process-wide read-only state: loaded lazily on first
//! use through a [`ModelLoader`] capability, cached in a `OnceCell` so
//! concurrent first use initializes exactly once. A failed load is not
//! cached; the next request retries.

use crate::config::{EngineConfig, FeatureNormalization};
use crate::descriptors::FeatureVector;
use crate::error::{EngineError, EngineResult};
use crate::signal;
use crate::store::{ArtifactStore, StoreError};
use crate::types::{ArtifactKind, ArtifactRef, PredictionResult};
use async_trait::async_trait;
use ndarray::{Array2, Array3, Array4};
use ort::session::Session;
use ort::value::Tensor;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// ONNX graph input names, fixed at export time
const IMAGE_INPUT: &str = "spectrogram";
const BIOSIGNAL_INPUT: &str = "biosignal";
const DESCRIPTOR_INPUT: &str = "descriptors";

/// Batch-of-one model input
///
/// Shapes: image `[1, 1, H, W]`, biosignal `[1, channels, 896]`,
/// descriptors `[1, selected-feature-count]`.
#[derive(Debug, Clone)]
pub struct ModelInput {
    pub image: Array4<f32>,
    pub biosignal: Array3<f32>,
    pub descriptors: Array2<f32>,
}

/// Loaded affect regression model
///
/// Implementations must be safe to share across concurrent requests; the
/// forward pass takes `&self`.
pub trait AffectModel: Send + Sync {
    /// Forward pass. Returns `(arousal, valence)`, not clamped.
    fn predict(&self, input: ModelInput) -> EngineResult<(f32, f32)>;
}

/// Capability that produces the shared model instance
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self) -> EngineResult<Arc<dyn AffectModel>>;
}

/// ONNX-backed affect model
///
/// `Session::run` needs exclusive access, so the session sits behind a lock;
/// the loaded weights themselves are never mutated.
pub struct OnnxAffectModel {
    session: Mutex<Session>,
}

// Safety: ort::Session is Send+Sync by design
unsafe impl Send for OnnxAffectModel {}
unsafe impl Sync for OnnxAffectModel {}

impl OnnxAffectModel {
    pub fn new(session: Session) -> Self {
        Self {
            session: Mutex::new(session),
        }
    }
}

impl AffectModel for OnnxAffectModel {
    fn predict(&self, input: ModelInput) -> EngineResult<(f32, f32)> {
        let image = Tensor::from_array(input.image)
            .map_err(|e| EngineError::Internal(format!("image tensor: {}", e)))?;
        let biosignal = Tensor::from_array(input.biosignal)
            .map_err(|e| EngineError::Internal(format!("biosignal tensor: {}", e)))?;
        let descriptors = Tensor::from_array(input.descriptors)
            .map_err(|e| EngineError::Internal(format!("descriptor tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let outputs = session
            .run(ort::inputs![
                IMAGE_INPUT => image,
                BIOSIGNAL_INPUT => biosignal,
                DESCRIPTOR_INPUT => descriptors
            ])
            .map_err(|e| EngineError::Internal(format!("forward pass failed: {}", e)))?;

        let (_, value) = outputs
            .iter()
            .next()
            .ok_or_else(|| EngineError::Internal("model produced no output".to_string()))?;
        let (_shape, data) = value
            .try_extract_tensor::<f32>()
            .map_err(|e| EngineError::Internal(format!("output extraction failed: {}", e)))?;

        if data.len() < 2 {
            return Err(EngineError::Internal(format!(
                "model output has {} values, expected 2",
                data.len()
            )));
        }
        Ok((data[0], data[1]))
    }
}

/// Loads the configured ONNX weights into an [`OnnxAffectModel`]
pub struct OnnxModelLoader {
    weights: PathBuf,
}

impl OnnxModelLoader {
    pub fn new(weights: impl Into<PathBuf>) -> Self {
        Self {
            weights: weights.into(),
        }
    }
}

#[async_trait]
impl ModelLoader for OnnxModelLoader {
    async fn load(&self) -> EngineResult<Arc<dyn AffectModel>> {
        let weights = self.weights.clone();
        let session = tokio::task::spawn_blocking(move || {
            if !weights.exists() {
                return Err(EngineError::ModelLoad(format!(
                    "weights not found: {}",
                    weights.display()
                )));
            }
            let mut builder = Session::builder()
                .map_err(|e| EngineError::ModelLoad(e.to_string()))?
                .with_intra_threads(1)
                .map_err(|e| EngineError::ModelLoad(e.to_string()))?;
            builder
                .commit_from_file(&weights)
                .map_err(|e| EngineError::ModelLoad(e.to_string()))
        })
        .await
        .map_err(|e| EngineError::ModelLoad(format!("load task failed: {}", e)))??;

        info!(weights = %self.weights.display(), "Affect model loaded");
        Ok(Arc::new(OnnxAffectModel::new(session)))
    }
}

/// Gathers modalities and runs the shared model for one (track, user) pair
pub struct InferenceEngine {
    config: Arc<EngineConfig>,
    normalization: Arc<FeatureNormalization>,
    store: Arc<dyn ArtifactStore>,
    loader: Arc<dyn ModelLoader>,
    model: OnceCell<Arc<dyn AffectModel>>,
}

impl InferenceEngine {
    pub fn new(
        config: Arc<EngineConfig>,
        normalization: Arc<FeatureNormalization>,
        store: Arc<dyn ArtifactStore>,
        loader: Arc<dyn ModelLoader>,
    ) -> Self {
        Self {
            config,
            normalization,
            store,
            loader,
            model: OnceCell::new(),
        }
    }

    /// Estimate affective arousal/valence for a (track, user) pair
    ///
    /// Every required modality must be present before the model is touched;
    /// a missing one fails with [`EngineError::MissingModality`] and performs
    /// zero model invocations.
    pub async fn predict(&self, track_id: &str, user_id: &str) -> EngineResult<PredictionResult> {
        let track_id = track_id.trim().to_lowercase();
        let user_id = user_id.trim().to_lowercase();
        if track_id.is_empty() {
            return Err(EngineError::Input("track_id must not be empty".to_string()));
        }
        if user_id.is_empty() {
            return Err(EngineError::Input("user_id must not be empty".to_string()));
        }

        let namespace_known = self
            .store
            .namespace_exists(&track_id)
            .await
            .map_err(|e| EngineError::Internal(format!("namespace check failed: {}", e)))?;
        if !namespace_known {
            return Err(EngineError::NotFound(format!("unknown track '{}'", track_id)));
        }

        // Gather before any model work
        let png = self
            .required(&ArtifactRef::track(&track_id, ArtifactKind::Spectrogram))
            .await?;
        let features_csv = self
            .required(&ArtifactRef::track(&track_id, ArtifactKind::Features))
            .await?;
        let eda_bytes = self.eda_payload(&track_id, &user_id).await?;

        let image = decode_spectrogram(&png)?;
        let features = FeatureVector::from_csv(&features_csv)
            .map_err(|e| EngineError::Internal(format!("stored feature row unreadable: {}", e)))?;
        let descriptors = descriptor_tensor(&features, &self.normalization)?;
        let channels = parse_eda(&eda_bytes)?;
        let biosignal = biosignal_tensor(&self.config.eda.channels, &channels)?;

        debug!(
            track_id = %track_id,
            user_id = %user_id,
            image_shape = ?image.shape(),
            biosignal_shape = ?biosignal.shape(),
            descriptors = descriptors.len(),
            "Modalities assembled"
        );

        let model = self.model().await?;
        let input = ModelInput {
            image,
            biosignal,
            descriptors,
        };
        let (arousal, valence) = tokio::task::spawn_blocking(move || model.predict(input))
            .await
            .map_err(|e| EngineError::Internal(format!("inference task failed: {}", e)))??;

        info!(track_id = %track_id, user_id = %user_id, arousal, valence, "Prediction complete");
        Ok(PredictionResult {
            track_id,
            arousal,
            valence,
        })
    }

    /// Shared model instance, initialized exactly once on first success
    async fn model(&self) -> EngineResult<Arc<dyn AffectModel>> {
        self.model
            .get_or_try_init(|| self.loader.load())
            .await
            .cloned()
    }

    /// Fetch a track-scoped modality; absence is `MissingModality`
    async fn required(&self, artifact: &ArtifactRef) -> EngineResult<Vec<u8>> {
        match self.store.get(artifact).await {
            Ok(bytes) => Ok(bytes),
            Err(StoreError::NotFound(_)) => Err(EngineError::MissingModality(format!(
                "no {} artifact for track '{}'",
                artifact.kind.as_str(),
                artifact.track_id
            ))),
            Err(e) => Err(EngineError::Internal(format!("store read failed: {}", e))),
        }
    }

    /// User-scoped EDA, falling back to the configured shared sample set
    async fn eda_payload(&self, track_id: &str, user_id: &str) -> EngineResult<Vec<u8>> {
        let user_ref = ArtifactRef::user(track_id, ArtifactKind::Eda, user_id);
        match self.store.get(&user_ref).await {
            Ok(bytes) => return Ok(bytes),
            Err(StoreError::NotFound(_)) => {}
            Err(e) => return Err(EngineError::Internal(format!("store read failed: {}", e))),
        }

        if let Some(default_user) = &self.config.eda.default_user {
            let fallback = ArtifactRef::user(track_id, ArtifactKind::Eda, default_user);
            match self.store.get(&fallback).await {
                Ok(bytes) => {
                    debug!(track_id = %track_id, user_id = %user_id, "Using shared EDA sample set");
                    return Ok(bytes);
                }
                Err(StoreError::NotFound(_)) => {}
                Err(e) => return Err(EngineError::Internal(format!("store read failed: {}", e))),
            }
        }

        Err(EngineError::MissingModality(format!(
            "no eda artifact for track '{}' and user '{}'",
            track_id, user_id
        )))
    }
}

/// Decode the spectrogram PNG into a `[1, 1, H, W]` grayscale tensor
///
/// Pixel intensities are scaled to `[0, 1]`, matching training-time
/// preprocessing of the raster.
pub fn decode_spectrogram(png: &[u8]) -> EngineResult<Array4<f32>> {
    let img = image::load_from_memory(png)
        .map_err(|e| EngineError::Internal(format!("spectrogram decode failed: {}", e)))?
        .to_luma8();
    let (width, height) = (img.width() as usize, img.height() as usize);

    let pixels: Vec<f32> = img.into_raw().iter().map(|&p| p as f32 / 255.0).collect();
    Array4::from_shape_vec((1, 1, height, width), pixels)
        .map_err(|e| EngineError::Internal(format!("image tensor shape: {}", e)))
}

/// Parse the stored EDA artifact: JSON object mapping channel name to raw samples
pub fn parse_eda(bytes: &[u8]) -> EngineResult<HashMap<String, Vec<f32>>> {
    serde_json::from_slice(bytes)
        .map_err(|e| EngineError::Internal(format!("stored eda payload unreadable: {}", e)))
}

/// Resample each configured channel to 896 samples and stack into
/// `[1, channels, 896]`
pub fn biosignal_tensor(
    channel_names: &[String],
    channels: &HashMap<String, Vec<f32>>,
) -> EngineResult<Array3<f32>> {
    let mut stacked = Vec::with_capacity(channel_names.len() * signal::FIXED_LEN);
    for name in channel_names {
        let raw = channels.get(name).ok_or_else(|| {
            EngineError::MissingModality(format!("eda artifact lacks channel '{}'", name))
        })?;
        let resampled =
            signal::resample(raw).map_err(|e| EngineError::Input(e.to_string()))?;
        stacked.extend_from_slice(&resampled);
    }

    Array3::from_shape_vec((1, channel_names.len(), signal::FIXED_LEN), stacked)
        .map_err(|e| EngineError::Internal(format!("biosignal tensor shape: {}", e)))
}

/// Validate the stored feature row against the configured column selection
/// and shape it as `[1, selected-feature-count]`
pub fn descriptor_tensor(
    features: &FeatureVector,
    norm: &FeatureNormalization,
) -> EngineResult<Array2<f32>> {
    if features.names != norm.selected() {
        return Err(EngineError::Internal(format!(
            "stored feature columns do not match configuration: {:?} vs {:?}",
            features.names,
            norm.selected()
        )));
    }
    Array2::from_shape_vec((1, features.values.len()), features.values.clone())
        .map_err(|e| EngineError::Internal(format!("descriptor tensor shape: {}", e)))
}
