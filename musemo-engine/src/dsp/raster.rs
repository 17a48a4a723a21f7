//! Spectrogram rasterization
//!
//! Maps the dB-scaled mel spectrogram onto a single-channel grayscale PNG:
//! one column per frame, one row per mel band, low frequencies at the bottom,
//! no axes or labels. The rasterization call is not reentrant and runs under
//! a single process-wide lock, independent of track identity.

use super::mel::{compute_mel_spectrogram, MelSpectrogram};
use crate::config::SpectrogramConfig;
use crate::error::StageError;
use crate::transcode;
use image::{DynamicImage, GrayImage};
use once_cell::sync::Lazy;
use std::io::Cursor;
use std::sync::Mutex;
use tracing::debug;

/// Global critical section around the rasterization call site
static RENDER_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Render a WAV payload as a grayscale mel-spectrogram PNG
pub fn render_spectrogram(
    wav_bytes: &[u8],
    config: &SpectrogramConfig,
) -> Result<Vec<u8>, StageError> {
    let decoded = transcode::decode_bytes(wav_bytes)
        .map_err(|e| StageError::Render(format!("waveform decode: {}", e)))?;
    let mel = compute_mel_spectrogram(&decoded.samples, decoded.sample_rate, config)?;

    let guard = RENDER_LOCK
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let png = rasterize(&mel)?;
    drop(guard);

    debug!(
        width = mel.width(),
        height = mel.n_mels,
        bytes = png.len(),
        "Spectrogram rendered"
    );
    Ok(png)
}

/// Encode the mel matrix as PNG. Callers must hold [`RENDER_LOCK`].
fn rasterize(mel: &MelSpectrogram) -> Result<Vec<u8>, StageError> {
    let width = mel.width();
    let height = mel.n_mels;
    if width == 0 || height == 0 {
        return Err(StageError::Render("empty spectrogram".to_string()));
    }

    let mut pixels = vec![0u8; width * height];
    for (x, frame) in mel.frames.iter().enumerate() {
        for (band, &db) in frame.iter().enumerate() {
            // Row 0 is the top of the image; highest band first
            let y = height - 1 - band;
            let level = ((db + mel.top_db) / mel.top_db).clamp(0.0, 1.0);
            pixels[y * width + x] = (level * 255.0).round() as u8;
        }
    }

    let img = GrayImage::from_raw(width as u32, height as u32, pixels)
        .ok_or_else(|| StageError::Render("raster buffer size mismatch".to_string()))?;

    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .map_err(|e| StageError::Render(format!("PNG encode failed: {}", e)))?;
    Ok(out.into_inner())
}
