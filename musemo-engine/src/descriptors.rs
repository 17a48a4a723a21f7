//! Acoustic descriptor extraction and normalization
//!
//! Descriptors come from an external command-line extractor (openSMILE
//! `SMILExtract` convention) that writes a one-row ARFF table of named static
//! audio descriptors. The extractor is a capability trait so the pipeline can
//! be exercised without the binary installed.
//!
//! Post-processing drops the non-feature columns, z-score normalizes against
//! the configuration-supplied mean/std vectors, and reduces the row to the
//! configured ordered column subset.

use crate::config::FeatureNormalization;
use crate::error::StageError;
use crate::types::RawDescriptorRow;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;
use uuid::Uuid;

/// Columns the extractor emits that are not audio descriptors
const NON_FEATURE_COLUMNS: [&str; 2] = ["name", "class"];

/// External descriptor extractor: WAV path → one raw descriptor row
#[async_trait]
pub trait DescriptorExtractor: Send + Sync {
    async fn extract(&self, wav_path: &Path) -> Result<RawDescriptorRow, StageError>;
}

/// openSMILE-style subprocess extractor
pub struct SmileExtractor {
    bin: String,
    config_path: PathBuf,
}

impl SmileExtractor {
    pub fn new(bin: impl Into<String>, config_path: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            config_path: config_path.into(),
        }
    }
}

#[async_trait]
impl DescriptorExtractor for SmileExtractor {
    async fn extract(&self, wav_path: &Path) -> Result<RawDescriptorRow, StageError> {
        let output_path = std::env::temp_dir().join(format!("descriptors_{}.arff", Uuid::new_v4()));

        let output = Command::new(&self.bin)
            .arg("-C")
            .arg(&self.config_path)
            .arg("-I")
            .arg(wav_path)
            .arg("-O")
            .arg(&output_path)
            .arg("-instname")
            .arg(wav_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                StageError::Extraction(format!("failed to execute {}: {}", self.bin, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let _ = tokio::fs::remove_file(&output_path).await;
            return Err(StageError::Extraction(format!(
                "{} exited with {}: {}",
                self.bin, output.status, stderr
            )));
        }

        let arff = tokio::fs::read_to_string(&output_path)
            .await
            .map_err(|e| StageError::Extraction(format!("failed to read extractor output: {}", e)))?;
        let _ = tokio::fs::remove_file(&output_path).await;

        let row = parse_arff_row(&arff)
            .map_err(|e| StageError::Extraction(format!("ARFF parse failed: {}", e)))?;

        debug!(
            wav = %wav_path.display(),
            columns = row.columns.len(),
            "Descriptor extraction complete"
        );
        Ok(row)
    }
}

/// Parse the single data row of an ARFF table into named numeric columns
///
/// String-typed attributes (the instance name) and unparsable cells (the
/// trailing `?` class placeholder) are skipped; only numeric descriptor
/// columns survive.
pub fn parse_arff_row(arff: &str) -> anyhow::Result<RawDescriptorRow> {
    let mut attributes: Vec<(String, bool)> = Vec::new(); // (name, numeric)
    let mut lines = arff.lines();

    for line in lines.by_ref() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('%') {
            continue;
        }
        let lower = trimmed.to_lowercase();
        if lower.starts_with("@attribute") {
            let rest = trimmed["@attribute".len()..].trim();
            let (name, type_spec) = split_attribute(rest)
                .ok_or_else(|| anyhow!("malformed attribute line: {}", trimmed))?;
            let numeric = type_spec.eq_ignore_ascii_case("numeric")
                || type_spec.eq_ignore_ascii_case("real");
            attributes.push((name, numeric));
        } else if lower.starts_with("@data") {
            break;
        }
    }

    if attributes.is_empty() {
        return Err(anyhow!("no attribute declarations found"));
    }

    let data_line = lines
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('%'))
        .ok_or_else(|| anyhow!("no data row found"))?;

    let cells = split_data_row(data_line);
    if cells.len() != attributes.len() {
        return Err(anyhow!(
            "data row has {} cells but {} attributes declared",
            cells.len(),
            attributes.len()
        ));
    }

    let mut columns = Vec::with_capacity(attributes.len());
    for ((name, numeric), cell) in attributes.into_iter().zip(cells) {
        if !numeric {
            continue;
        }
        match cell.parse::<f32>() {
            Ok(value) => columns.push((name, value)),
            // `?` or nominal cells carry no descriptor value
            Err(_) => continue,
        }
    }

    if columns.is_empty() {
        return Err(anyhow!("data row contains no numeric descriptor values"));
    }

    Ok(RawDescriptorRow { columns })
}

/// Split `@attribute` remainder into (name, type), honoring quoted names
fn split_attribute(rest: &str) -> Option<(String, String)> {
    let rest = rest.trim();
    if let Some(stripped) = rest.strip_prefix('\'') {
        let end = stripped.find('\'')?;
        let name = &stripped[..end];
        let type_spec = stripped[end + 1..].trim();
        Some((name.to_string(), type_spec.to_string()))
    } else {
        let mut parts = rest.splitn(2, char::is_whitespace);
        let name = parts.next()?;
        let type_spec = parts.next()?.trim();
        Some((name.to_string(), type_spec.to_string()))
    }
}

/// Split an ARFF data row on commas, honoring single-quoted cells
fn split_data_row(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in line.chars() {
        match c {
            '\'' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                cells.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    cells.push(current.trim().to_string());
    cells
}

/// Normalized, column-reduced descriptor row
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    /// Selected column names, configuration order
    pub names: Vec<String>,
    /// `(raw - mean) / std` per selected column
    pub values: Vec<f32>,
}

impl FeatureVector {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Serialize as a two-line CSV: header of column names, one data row
    pub fn to_csv(&self) -> Vec<u8> {
        let header = self.names.join(",");
        let row = self
            .values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",");
        format!("{}\n{}\n", header, row).into_bytes()
    }

    /// Parse the CSV payload written by [`FeatureVector::to_csv`]
    pub fn from_csv(bytes: &[u8]) -> anyhow::Result<Self> {
        let text = std::str::from_utf8(bytes).context("feature payload is not UTF-8")?;
        let mut lines = text.lines();
        let header = lines.next().context("feature payload missing header")?;
        let row = lines.next().context("feature payload missing data row")?;

        let names: Vec<String> = header.split(',').map(str::to_string).collect();
        let values = row
            .split(',')
            .map(|cell| cell.trim().parse::<f32>())
            .collect::<Result<Vec<f32>, _>>()
            .context("feature payload has non-numeric cell")?;

        if names.len() != values.len() {
            return Err(anyhow!(
                "feature payload header/row mismatch: {} names, {} values",
                names.len(),
                values.len()
            ));
        }
        Ok(Self { names, values })
    }
}

/// Drop non-feature columns, z-score normalize, and reduce to the configured
/// ordered subset
pub fn normalize_row(
    row: &RawDescriptorRow,
    norm: &FeatureNormalization,
) -> Result<FeatureVector, StageError> {
    let mut names = Vec::with_capacity(norm.selected().len());
    let mut values = Vec::with_capacity(norm.selected().len());

    for name in norm.selected() {
        if NON_FEATURE_COLUMNS.contains(&name.as_str()) {
            return Err(StageError::Extraction(format!(
                "selected column '{}' is not a descriptor",
                name
            )));
        }
        let raw = row.value(name).ok_or_else(|| {
            StageError::Extraction(format!("extractor output missing column '{}'", name))
        })?;
        let stats = norm.stats(name).ok_or_else(|| {
            StageError::Extraction(format!("no normalization stats for column '{}'", name))
        })?;
        names.push(name.clone());
        values.push((raw - stats.mean) / stats.std);
    }

    Ok(FeatureVector { names, values })
}
