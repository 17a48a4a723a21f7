//! Signal processing for spectrogram rendering
//!
//! `mel` computes the log-scaled mel power spectrogram; `raster` turns it
//! into the grayscale PNG artifact under the process-wide render lock.

pub mod mel;
pub mod raster;

pub use mel::{compute_mel_spectrogram, MelSpectrogram};
pub use raster::render_spectrogram;
