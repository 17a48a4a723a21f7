//! Mel spectrogram computation
//!
//! STFT over Hann-windowed frames (realfft), triangular mel filterbank on
//! the HTK mel scale, then dB scaling relative to the spectrogram peak with
//! a fixed dynamic-range floor. Deterministic for identical input and
//! parameters.

use crate::config::SpectrogramConfig;
use crate::error::StageError;
use realfft::RealFftPlanner;

/// Mel power spectrogram in dB, frame-major
#[derive(Debug, Clone)]
pub struct MelSpectrogram {
    /// One vector of `n_mels` dB values per frame, in `[-top_db, 0]`
    pub frames: Vec<Vec<f32>>,
    pub n_mels: usize,
    /// Dynamic range floor used for the dB clamp
    pub top_db: f32,
}

impl MelSpectrogram {
    /// Raster width (number of frames)
    pub fn width(&self) -> usize {
        self.frames.len()
    }
}

/// Compute the log-scaled mel spectrogram of a mono waveform
///
/// The waveform is first brought to the configured analysis rate with
/// linear interpolation, so the mel transform parameters always refer to the
/// same rate regardless of the source material.
pub fn compute_mel_spectrogram(
    samples: &[f32],
    sample_rate: u32,
    config: &SpectrogramConfig,
) -> Result<MelSpectrogram, StageError> {
    if samples.is_empty() {
        return Err(StageError::Render("empty waveform".to_string()));
    }

    let analysis = if sample_rate == config.sample_rate {
        samples.to_vec()
    } else {
        resample_linear(samples, sample_rate as f32, config.sample_rate as f32)
    };

    if analysis.len() < config.n_fft {
        return Err(StageError::Render(format!(
            "waveform too short for analysis: {} samples < one {}-point window",
            analysis.len(),
            config.n_fft
        )));
    }

    let window = hann_window(config.n_fft);
    let filterbank = mel_filterbank(config.n_mels, config.n_fft, config.sample_rate as f32);

    let mut planner = RealFftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(config.n_fft);
    let mut fft_input = fft.make_input_vec();
    let mut spectrum = fft.make_output_vec();

    let n_frames = (analysis.len() - config.n_fft) / config.hop_length + 1;
    let mut power_frames = Vec::with_capacity(n_frames);

    for frame_idx in 0..n_frames {
        let start = frame_idx * config.hop_length;
        for (i, slot) in fft_input.iter_mut().enumerate() {
            *slot = analysis[start + i] * window[i];
        }
        fft.process(&mut fft_input, &mut spectrum)
            .map_err(|e| StageError::Render(format!("FFT failed: {}", e)))?;

        let mut mel_bands = vec![0.0f32; config.n_mels];
        for (band, filter) in filterbank.iter().enumerate() {
            let mut energy = 0.0f32;
            for &(bin, coeff) in filter {
                energy += coeff * spectrum[bin].norm_sqr();
            }
            mel_bands[band] = energy;
        }
        power_frames.push(mel_bands);
    }

    // dB relative to the spectrogram peak, floored at -top_db
    let peak = power_frames
        .iter()
        .flatten()
        .copied()
        .fold(f32::MIN, f32::max)
        .max(1e-10);

    let frames = power_frames
        .into_iter()
        .map(|bands| {
            bands
                .into_iter()
                .map(|p| {
                    let db = 10.0 * (p.max(1e-10) / peak).log10();
                    db.max(-config.top_db)
                })
                .collect()
        })
        .collect();

    Ok(MelSpectrogram {
        frames,
        n_mels: config.n_mels,
        top_db: config.top_db,
    })
}

/// Linear-interpolation resampling to the analysis rate
fn resample_linear(samples: &[f32], from_rate: f32, to_rate: f32) -> Vec<f32> {
    let ratio = from_rate / to_rate;
    let output_len = (samples.len() as f32 / ratio) as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f32 * ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f32;

        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        } else if idx < samples.len() {
            samples[idx]
        } else {
            0.0
        };
        output.push(sample);
    }

    output
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let phase = 2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32;
            0.5 * (1.0 - phase.cos())
        })
        .collect()
}

/// Sparse triangular mel filterbank: per band, `(fft_bin, coefficient)` pairs
fn mel_filterbank(n_bands: usize, n_fft: usize, sample_rate: f32) -> Vec<Vec<(usize, f32)>> {
    let n_bins = n_fft / 2 + 1;
    let mel_min = hz_to_mel(0.0);
    let mel_max = hz_to_mel(sample_rate / 2.0);

    let n_points = n_bands + 2;
    let bin_points: Vec<f32> = (0..n_points)
        .map(|i| mel_min + (mel_max - mel_min) * i as f32 / (n_points - 1) as f32)
        .map(mel_to_hz)
        .map(|hz| hz * n_fft as f32 / sample_rate)
        .collect();

    let mut filterbank = Vec::with_capacity(n_bands);
    for band in 0..n_bands {
        let left = bin_points[band];
        let center = bin_points[band + 1];
        let right = bin_points[band + 2];

        let mut filter = Vec::new();
        for bin in 0..n_bins {
            let bin_f = bin as f32;
            let coeff = if bin_f >= left && bin_f <= center && (center - left) > 0.0 {
                (bin_f - left) / (center - left)
            } else if bin_f > center && bin_f <= right && (right - center) > 0.0 {
                (right - bin_f) / (right - center)
            } else {
                0.0
            };
            if coeff > 0.0 {
                filter.push((bin, coeff));
            }
        }
        filterbank.push(filter);
    }

    filterbank
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0_f32.powf(mel / 2595.0) - 1.0)
}
