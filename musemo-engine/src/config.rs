//! Configuration for musemo-engine
//!
//! All configuration is resolved once at process startup into an
//! [`EngineConfig`] that is passed by reference into the pipeline and the
//! inference engine. Nothing is re-read per request.
//!
//! Resolution order for the data directory follows musemo-common:
//! `MUSEMO_DATA_DIR` env var, then the `data_dir` key of the service TOML
//! file, then the OS default.

use musemo_common::{config as common_config, Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable overriding the data directory
pub const DATA_DIR_ENV: &str = "MUSEMO_DATA_DIR";

/// Service name used for config/data directory resolution
pub const SERVICE_NAME: &str = "musemo";

/// HTTP server settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5731,
        }
    }
}

/// Source fetch settings: bounded timeout, single retry then fail
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Mel-spectrogram rendering parameters
///
/// These fix the mel transform; the raster is deterministic given identical
/// input bytes and these values.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpectrogramConfig {
    /// Analysis sample rate the waveform is resampled to before the STFT
    pub sample_rate: u32,
    /// FFT window size
    pub n_fft: usize,
    /// Hop between consecutive frames
    pub hop_length: usize,
    /// Number of mel bands (raster height)
    pub n_mels: usize,
    /// Dynamic range floor below the peak, in dB
    pub top_db: f32,
}

impl Default for SpectrogramConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22050,
            n_fft: 2048,
            hop_length: 512,
            n_mels: 128,
            top_db: 80.0,
        }
    }
}

/// External acoustic-descriptor extractor settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DescriptorConfig {
    /// Extractor binary (openSMILE `SMILExtract` convention)
    pub extractor_bin: String,
    /// Extractor configuration file passed with `-C`
    pub extractor_config: PathBuf,
    /// Per-feature mean vector, `name,value` lines
    pub mean_csv: PathBuf,
    /// Per-feature std vector, `name,value` lines
    pub std_csv: PathBuf,
    /// Selected column names, one per line, output order
    pub selected_csv: PathBuf,
}

impl Default for DescriptorConfig {
    fn default() -> Self {
        Self {
            extractor_bin: "SMILExtract".to_string(),
            extractor_config: PathBuf::from("config/IS13_ComParE.conf"),
            mean_csv: PathBuf::from("config/features_mean.csv"),
            std_csv: PathBuf::from("config/features_std.csv"),
            selected_csv: PathBuf::from("config/selected_features.csv"),
        }
    }
}

/// Biosignal modality composition
///
/// The channel list is configuration, not convention: each channel is one
/// named series inside the user's EDA artifact, and the model receives
/// `[1, channels.len(), 896]`. `default_user` optionally names a shared
/// sample set used when no user-scoped recording exists.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EdaConfig {
    pub channels: Vec<String>,
    pub default_user: Option<String>,
}

impl Default for EdaConfig {
    fn default() -> Self {
        Self {
            channels: vec!["arousal".to_string(), "valence".to_string()],
            default_user: None,
        }
    }
}

/// Model weight settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// ONNX weights file, resolved against the data directory when relative
    pub weights: PathBuf,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            weights: PathBuf::from("model/affect.onnx"),
        }
    }
}

/// TOML file shape (all sections optional)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlEngineConfig {
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub spectrogram: SpectrogramConfig,
    #[serde(default)]
    pub descriptors: DescriptorConfig,
    #[serde(default)]
    pub eda: EdaConfig,
    #[serde(default)]
    pub model: ModelConfig,
}

/// Resolved engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base directory for the artifact store and bundled config files
    pub data_dir: PathBuf,
    pub server: ServerConfig,
    pub fetch: FetchConfig,
    pub spectrogram: SpectrogramConfig,
    pub descriptors: DescriptorConfig,
    pub eda: EdaConfig,
    pub model: ModelConfig,
}

impl EngineConfig {
    /// Resolve configuration from the default config file location and
    /// environment
    pub fn load() -> Self {
        let file_config = common_config::default_config_path(SERVICE_NAME)
            .filter(|p| p.exists())
            .and_then(|p| match common_config::load_toml_config::<TomlEngineConfig>(&p) {
                Ok(config) => {
                    info!("Loaded configuration from {}", p.display());
                    Some(config)
                }
                Err(e) => {
                    warn!("Ignoring unreadable config file {}: {}", p.display(), e);
                    None
                }
            })
            .unwrap_or_default();

        Self::from_toml(file_config)
    }

    /// Build a resolved configuration from a parsed TOML shape
    pub fn from_toml(toml: TomlEngineConfig) -> Self {
        let data_dir = match std::env::var(DATA_DIR_ENV) {
            Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => toml
                .data_dir
                .unwrap_or_else(|| common_config::resolve_data_dir(DATA_DIR_ENV, SERVICE_NAME)),
        };

        Self {
            data_dir,
            server: toml.server,
            fetch: toml.fetch,
            spectrogram: toml.spectrogram,
            descriptors: toml.descriptors,
            eda: toml.eda,
            model: toml.model,
        }
    }

    /// Default configuration rooted at an explicit data directory (tests)
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let mut config = Self::from_toml(TomlEngineConfig::default());
        config.data_dir = data_dir.into();
        config
    }

    /// Root directory of the filesystem artifact store
    pub fn store_root(&self) -> PathBuf {
        self.data_dir.join("artifacts")
    }

    /// Resolve a configured path against the data directory
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }

    /// Path to the model weights
    pub fn model_weights(&self) -> PathBuf {
        self.resolve_path(&self.model.weights)
    }
}

/// Per-feature z-score statistics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureStats {
    pub mean: f32,
    pub std: f32,
}

/// Feature normalization tables, loaded once at startup
///
/// `selected` fixes both the column subset and its output order; `stats`
/// holds the precomputed mean/std per feature name.
#[derive(Debug, Clone)]
pub struct FeatureNormalization {
    stats: HashMap<String, FeatureStats>,
    selected: Vec<String>,
}

impl FeatureNormalization {
    /// Load mean/std/selected tables from the configured CSV files
    pub fn load(config: &EngineConfig) -> Result<Self> {
        let mean = read_named_values(&config.resolve_path(&config.descriptors.mean_csv))?;
        let std = read_named_values(&config.resolve_path(&config.descriptors.std_csv))?;
        let selected = read_names(&config.resolve_path(&config.descriptors.selected_csv))?;
        Self::from_parts(mean, std, selected)
    }

    /// Assemble tables from in-memory vectors (tests and embedded defaults)
    pub fn from_parts(
        mean: Vec<(String, f32)>,
        std: Vec<(String, f32)>,
        selected: Vec<String>,
    ) -> Result<Self> {
        let mut stats = HashMap::with_capacity(mean.len());
        for (name, mean_value) in mean {
            stats.insert(
                name,
                FeatureStats {
                    mean: mean_value,
                    std: 1.0,
                },
            );
        }
        for (name, std_value) in std {
            if !std_value.is_finite() || std_value == 0.0 {
                return Err(Error::Config(format!(
                    "Feature '{}' has degenerate std {}",
                    name, std_value
                )));
            }
            match stats.get_mut(&name) {
                Some(entry) => entry.std = std_value,
                None => {
                    return Err(Error::Config(format!(
                        "Std vector names feature '{}' absent from mean vector",
                        name
                    )))
                }
            }
        }
        for name in &selected {
            if !stats.contains_key(name) {
                return Err(Error::Config(format!(
                    "Selected feature '{}' has no mean/std entry",
                    name
                )));
            }
        }
        if selected.is_empty() {
            return Err(Error::Config("Selected feature list is empty".to_string()));
        }
        Ok(Self { stats, selected })
    }

    pub fn stats(&self, name: &str) -> Option<FeatureStats> {
        self.stats.get(name).copied()
    }

    /// Selected column names in output order
    pub fn selected(&self) -> &[String] {
        &self.selected
    }
}

/// Parse `name,value` lines (no header)
fn read_named_values(path: &Path) -> Result<Vec<(String, f32)>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let mut values = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (name, value) = line.rsplit_once(',').ok_or_else(|| {
            Error::Config(format!(
                "{}:{}: expected 'name,value'",
                path.display(),
                line_no + 1
            ))
        })?;
        let value: f32 = value.trim().parse().map_err(|e| {
            Error::Config(format!(
                "{}:{}: bad value for '{}': {}",
                path.display(),
                line_no + 1,
                name,
                e
            ))
        })?;
        values.push((name.trim().to_string(), value));
    }
    Ok(values)
}

/// Parse one feature name per line (no header)
fn read_names(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats_fixture() -> FeatureNormalization {
        FeatureNormalization::from_parts(
            vec![("a".to_string(), 1.0), ("b".to_string(), 2.0)],
            vec![("a".to_string(), 0.5), ("b".to_string(), 4.0)],
            vec!["b".to_string(), "a".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::with_data_dir("/tmp/musemo");
        assert_eq!(config.server.port, 5731);
        assert_eq!(config.spectrogram.n_mels, 128);
        assert_eq!(config.spectrogram.sample_rate, 22050);
        assert_eq!(config.fetch.timeout_secs, 30);
        assert_eq!(config.eda.channels, vec!["arousal", "valence"]);
        assert_eq!(config.store_root(), PathBuf::from("/tmp/musemo/artifacts"));
    }

    #[test]
    fn test_resolve_path() {
        let config = EngineConfig::with_data_dir("/data");
        assert_eq!(
            config.resolve_path(Path::new("model/affect.onnx")),
            PathBuf::from("/data/model/affect.onnx")
        );
        assert_eq!(
            config.resolve_path(Path::new("/abs/weights.onnx")),
            PathBuf::from("/abs/weights.onnx")
        );
    }

    #[test]
    fn test_normalization_from_parts() {
        let norm = stats_fixture();
        assert_eq!(norm.selected(), &["b".to_string(), "a".to_string()]);
        assert_eq!(norm.stats("a"), Some(FeatureStats { mean: 1.0, std: 0.5 }));
        assert!(norm.stats("missing").is_none());
    }

    #[test]
    fn test_normalization_rejects_unknown_selection() {
        let result = FeatureNormalization::from_parts(
            vec![("a".to_string(), 0.0)],
            vec![("a".to_string(), 1.0)],
            vec!["ghost".to_string()],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_read_named_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mean.csv");
        std::fs::write(&path, "loudness_amean,-23.5\nflux_stddev,0.125\n").unwrap();

        let values = read_named_values(&path).unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0].0, "loudness_amean");
        assert!((values[0].1 + 23.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_toml_round_trip() {
        let parsed: TomlEngineConfig = toml::from_str(
            r#"
            data_dir = "/srv/musemo"

            [server]
            port = 6000

            [eda]
            channels = ["combined"]
            default_user = "sample"
            "#,
        )
        .unwrap();
        let config = EngineConfig::from_toml(parsed);
        if std::env::var(DATA_DIR_ENV).is_err() {
            assert_eq!(config.data_dir, PathBuf::from("/srv/musemo"));
        }
        assert_eq!(config.server.port, 6000);
        assert_eq!(config.eda.channels, vec!["combined"]);
        assert_eq!(config.eda.default_user.as_deref(), Some("sample"));
    }
}
