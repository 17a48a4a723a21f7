//! Ingestion pipeline orchestrator
//!
//! Sequences the per-track stages: fetch → MP3 persist → transcode → WAV
//! persist → {spectrogram, descriptors}. The two final stages run
//! concurrently and independently; a failure in either leaves the other
//! untouched.
//!
//! # Error handling
//! - Per-stage isolation: a stage failure is recorded as a false status flag
//!   and never aborts the ingestion; downstream stages are skipped only when
//!   their input is missing.
//! - Only structural input errors (malformed identifiers or source locator)
//!   and faults not attributable to a single stage surface as errors.
//! - Local temporary copies live in a per-invocation temp directory that is
//!   removed on every exit path.

use crate::config::{EngineConfig, FeatureNormalization};
use crate::descriptors::{self, DescriptorExtractor};
use crate::error::{EngineError, EngineResult, StageError};
use crate::fetch::{validate_source_url, SourceFetcher};
use crate::store::ArtifactStore;
use crate::transcode;
use crate::types::{ArtifactKind, ArtifactRef, IngestStatus};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Pipeline stage identifier for events and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Mp3,
    Wav,
    Spectrogram,
    Features,
}

/// Progress events emitted while a track is ingested
#[derive(Debug, Clone)]
pub enum StageEvent {
    IngestStarted {
        track_id: String,
    },
    StageCompleted {
        track_id: String,
        stage: Stage,
    },
    StageFailed {
        track_id: String,
        stage: Stage,
        message: String,
    },
    IngestSettled {
        track_id: String,
        complete: bool,
    },
}

/// Orchestrates the ingestion stages for one track at a time; distinct
/// tracks may be ingested fully in parallel
pub struct Orchestrator {
    config: Arc<EngineConfig>,
    normalization: Arc<FeatureNormalization>,
    store: Arc<dyn ArtifactStore>,
    fetcher: Arc<dyn SourceFetcher>,
    extractor: Arc<dyn DescriptorExtractor>,
    event_tx: Option<mpsc::Sender<StageEvent>>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<EngineConfig>,
        normalization: Arc<FeatureNormalization>,
        store: Arc<dyn ArtifactStore>,
        fetcher: Arc<dyn SourceFetcher>,
        extractor: Arc<dyn DescriptorExtractor>,
    ) -> Self {
        Self {
            config,
            normalization,
            store,
            fetcher,
            extractor,
            event_tx: None,
        }
    }

    /// Attach an event channel for progress reporting
    pub fn with_events(mut self, event_tx: mpsc::Sender<StageEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Run the full ingestion pipeline for one track
    ///
    /// Returns the per-stage status map. Stage failures do not error; the
    /// map simply carries false flags for whatever did not complete.
    pub async fn ingest(&self, track_id: &str, source_url: &str) -> EngineResult<IngestStatus> {
        let track_id = track_id.trim().to_lowercase();
        if track_id.is_empty() {
            return Err(EngineError::Input("track_id must not be empty".to_string()));
        }
        validate_source_url(source_url).map_err(EngineError::Input)?;

        info!(track_id = %track_id, source_url = %source_url, "Ingestion started");
        self.emit(StageEvent::IngestStarted {
            track_id: track_id.clone(),
        })
        .await;

        let mut status = IngestStatus::pending(&track_id);

        self.store
            .ensure_namespace(&track_id)
            .await
            .map_err(|e| EngineError::Internal(format!("namespace creation failed: {}", e)))?;

        // Scoped to this invocation; dropped (and deleted) on every exit path
        let temp_dir = tempfile::tempdir()
            .map_err(|e| EngineError::Internal(format!("temp dir creation failed: {}", e)))?;

        match self.fetcher.fetch(source_url).await {
            Ok(source_bytes) => {
                self.stage_completed(&track_id, Stage::Fetch).await;
                self.run_media_stages(&track_id, source_bytes, temp_dir.path(), &mut status)
                    .await;
            }
            Err(e) => {
                // All downstream flags stay false; still a non-error outcome
                self.stage_failed(&track_id, Stage::Fetch, &e).await;
            }
        }

        self.reconcile(&mut status).await;

        info!(
            track_id = %status.track_id,
            mp3 = status.mp3,
            wav = status.wav,
            spectrogram = status.spectrogram,
            features = status.features,
            "Ingestion settled"
        );
        self.emit(StageEvent::IngestSettled {
            track_id: status.track_id.clone(),
            complete: status.is_complete(),
        })
        .await;

        Ok(status)
    }

    /// Stages that run once source bytes are available
    async fn run_media_stages(
        &self,
        track_id: &str,
        source_bytes: Vec<u8>,
        temp_dir: &std::path::Path,
        status: &mut IngestStatus,
    ) {
        status.mp3 = self
            .persist(track_id, ArtifactKind::Mp3, Stage::Mp3, &source_bytes)
            .await;

        let wav_bytes = {
            let source = source_bytes.clone();
            tokio::task::spawn_blocking(move || transcode::to_wav(&source)).await
        };
        let wav_bytes = match wav_bytes {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                // Spectrogram and descriptor stages depend on the WAV; skip both
                self.stage_failed(track_id, Stage::Wav, &e).await;
                return;
            }
            Err(e) => {
                self.stage_failed(track_id, Stage::Wav, &StageError::Decode(e.to_string()))
                    .await;
                return;
            }
        };

        status.wav = self
            .persist(track_id, ArtifactKind::Wav, Stage::Wav, &wav_bytes)
            .await;

        // Independent branches: each failure is local
        let (spectrogram_done, features_done) = tokio::join!(
            self.spectrogram_stage(track_id, &wav_bytes),
            self.descriptor_stage(track_id, &wav_bytes, temp_dir),
        );
        status.spectrogram = spectrogram_done;
        status.features = features_done;
    }

    /// Render the spectrogram raster and persist it
    async fn spectrogram_stage(&self, track_id: &str, wav_bytes: &[u8]) -> bool {
        let wav = wav_bytes.to_vec();
        let config = self.config.spectrogram.clone();
        let rendered =
            tokio::task::spawn_blocking(move || crate::dsp::render_spectrogram(&wav, &config))
                .await;

        match rendered {
            Ok(Ok(png)) => {
                self.persist(track_id, ArtifactKind::Spectrogram, Stage::Spectrogram, &png)
                    .await
            }
            Ok(Err(e)) => {
                self.stage_failed(track_id, Stage::Spectrogram, &e).await;
                false
            }
            Err(e) => {
                self.stage_failed(
                    track_id,
                    Stage::Spectrogram,
                    &StageError::Render(e.to_string()),
                )
                .await;
                false
            }
        }
    }

    /// Run the external descriptor extractor and persist the normalized row
    async fn descriptor_stage(
        &self,
        track_id: &str,
        wav_bytes: &[u8],
        temp_dir: &std::path::Path,
    ) -> bool {
        let wav_path = temp_dir.join(format!("{}.wav", track_id));
        if let Err(e) = tokio::fs::write(&wav_path, wav_bytes).await {
            self.stage_failed(track_id, Stage::Features, &StageError::Io(e))
                .await;
            return false;
        }

        let features = match self.extractor.extract(&wav_path).await {
            Ok(row) => match descriptors::normalize_row(&row, &self.normalization) {
                Ok(features) => features,
                Err(e) => {
                    self.stage_failed(track_id, Stage::Features, &e).await;
                    return false;
                }
            },
            Err(e) => {
                self.stage_failed(track_id, Stage::Features, &e).await;
                return false;
            }
        };

        self.persist(
            track_id,
            ArtifactKind::Features,
            Stage::Features,
            &features.to_csv(),
        )
        .await
    }

    /// Idempotent artifact write; both `Created` and `AlreadyPresent` count
    /// as stage completion
    async fn persist(&self, track_id: &str, kind: ArtifactKind, stage: Stage, bytes: &[u8]) -> bool {
        let artifact = ArtifactRef::track(track_id, kind);
        match self.store.put(&artifact, bytes).await {
            Ok(outcome) => {
                debug!(object = %artifact.object_name(), outcome = ?outcome, "Stage artifact persisted");
                self.stage_completed(track_id, stage).await;
                true
            }
            Err(e) => {
                self.stage_failed(track_id, stage, &StageError::Store(e.to_string()))
                    .await;
                false
            }
        }
    }

    /// Fold existing artifacts into the status map so flags stay monotonic
    /// across repeated ingestion calls
    async fn reconcile(&self, status: &mut IngestStatus) {
        for (flag, kind) in [
            (&mut status.mp3, ArtifactKind::Mp3),
            (&mut status.wav, ArtifactKind::Wav),
            (&mut status.spectrogram, ArtifactKind::Spectrogram),
            (&mut status.features, ArtifactKind::Features),
        ] {
            if !*flag {
                let artifact = ArtifactRef::track(&status.track_id, kind);
                if let Ok(true) = self.store.exists(&artifact).await {
                    *flag = true;
                }
            }
        }
    }

    async fn stage_completed(&self, track_id: &str, stage: Stage) {
        debug!(track_id = %track_id, stage = ?stage, "Stage completed");
        self.emit(StageEvent::StageCompleted {
            track_id: track_id.to_string(),
            stage,
        })
        .await;
    }

    async fn stage_failed(&self, track_id: &str, stage: Stage, error: &StageError) {
        warn!(track_id = %track_id, stage = ?stage, error = %error, "Stage failed");
        self.emit(StageEvent::StageFailed {
            track_id: track_id.to_string(),
            stage,
            message: error.to_string(),
        })
        .await;
    }

    async fn emit(&self, event: StageEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }
}
