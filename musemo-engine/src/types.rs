//! Core types for the musemo processing and inference pipeline

use serde::{Deserialize, Serialize};

/// Kind of a derived artifact attached to a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Source audio as fetched
    Mp3,
    /// Transcoded mono PCM audio
    Wav,
    /// Rendered grayscale mel-spectrogram raster
    Spectrogram,
    /// Normalized acoustic descriptor row
    Features,
    /// Per-user electrodermal recording
    Eda,
}

impl ArtifactKind {
    /// Lower-case name used in object names
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Mp3 => "mp3",
            ArtifactKind::Wav => "wav",
            ArtifactKind::Spectrogram => "spectrogram",
            ArtifactKind::Features => "features",
            ArtifactKind::Eda => "eda",
        }
    }

    /// File extension of the artifact payload
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Mp3 => "mp3",
            ArtifactKind::Wav => "wav",
            ArtifactKind::Spectrogram => "png",
            ArtifactKind::Features => "csv",
            ArtifactKind::Eda => "json",
        }
    }
}

/// Descriptor of a stored artifact
///
/// Identity key is `(track_id, kind)` for track-scoped artifacts and
/// `(track_id, kind, user_id)` for EDA.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub track_id: String,
    pub kind: ArtifactKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl ArtifactRef {
    /// Track-scoped artifact reference. `track_id` is lower-cased.
    pub fn track(track_id: &str, kind: ArtifactKind) -> Self {
        Self {
            track_id: track_id.to_lowercase(),
            kind,
            user_id: None,
        }
    }

    /// User-scoped artifact reference (EDA). Both identifiers are lower-cased.
    pub fn user(track_id: &str, kind: ArtifactKind, user_id: &str) -> Self {
        Self {
            track_id: track_id.to_lowercase(),
            kind,
            user_id: Some(user_id.to_lowercase()),
        }
    }

    /// Object name within the track namespace: `kind-trackid[-userid].ext`
    pub fn object_name(&self) -> String {
        match &self.user_id {
            Some(user) => format!(
                "{}-{}-{}.{}",
                self.kind.as_str(),
                self.track_id,
                user,
                self.kind.extension()
            ),
            None => format!(
                "{}-{}.{}",
                self.kind.as_str(),
                self.track_id,
                self.kind.extension()
            ),
        }
    }
}

/// Per-stage completion flags for one ingestion run
///
/// Fields are fixed booleans, never dynamically keyed. A flag that is true
/// for a track never reverts to false across repeated ingestion calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStatus {
    pub track_id: String,
    pub mp3: bool,
    pub wav: bool,
    pub spectrogram: bool,
    pub features: bool,
}

impl IngestStatus {
    /// All-false status for a track
    pub fn pending(track_id: &str) -> Self {
        Self {
            track_id: track_id.to_lowercase(),
            mp3: false,
            wav: false,
            spectrogram: false,
            features: false,
        }
    }

    /// True when every stage completed
    pub fn is_complete(&self) -> bool {
        self.mp3 && self.wav && self.spectrogram && self.features
    }
}

/// Model output for a (track, user) pair. Values are not clamped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub track_id: String,
    pub arousal: f32,
    pub valence: f32,
}

/// One raw descriptor row from the external extractor: ordered named columns
#[derive(Debug, Clone, Default)]
pub struct RawDescriptorRow {
    pub columns: Vec<(String, f32)>,
}

impl RawDescriptorRow {
    pub fn value(&self, name: &str) -> Option<f32> {
        self.columns
            .iter()
            .find(|(col, _)| col == name)
            .map(|(_, v)| *v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_name_track_scoped() {
        let artifact = ArtifactRef::track("AbC", ArtifactKind::Spectrogram);
        assert_eq!(artifact.object_name(), "spectrogram-abc.png");
    }

    #[test]
    fn test_object_name_user_scoped() {
        let artifact = ArtifactRef::user("abc", ArtifactKind::Eda, "U1");
        assert_eq!(artifact.object_name(), "eda-abc-u1.json");
    }

    #[test]
    fn test_ingest_status_pending() {
        let status = IngestStatus::pending("ABC");
        assert_eq!(status.track_id, "abc");
        assert!(!status.mp3 && !status.wav && !status.spectrogram && !status.features);
        assert!(!status.is_complete());
    }

    #[test]
    fn test_raw_row_lookup() {
        let row = RawDescriptorRow {
            columns: vec![("loudness".to_string(), 1.5), ("flux".to_string(), -0.25)],
        };
        assert_eq!(row.value("flux"), Some(-0.25));
        assert_eq!(row.value("missing"), None);
    }
}
