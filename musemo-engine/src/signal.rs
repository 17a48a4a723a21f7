//! Biosignal resampling
//!
//! Electrodermal recordings arrive at arbitrary lengths; the model consumes
//! exactly [`FIXED_LEN`] samples per channel. Resampling is piecewise-linear
//! over the original sample positions `0..len-1`, evaluated at `FIXED_LEN`
//! equally spaced points spanning the full range. No extrapolation occurs:
//! the target grid lies inside the source domain.

use musemo_common::{Error, Result};

/// Fixed biosignal length consumed by the model
pub const FIXED_LEN: usize = 896;

/// Resample a raw series to exactly [`FIXED_LEN`] samples
///
/// A series already at the target length is returned unchanged. A
/// single-sample series resamples to a constant. An empty series is invalid.
pub fn resample(raw: &[f32]) -> Result<Vec<f32>> {
    if raw.is_empty() {
        return Err(Error::InvalidInput(
            "biosignal series is empty".to_string(),
        ));
    }
    if raw.len() == FIXED_LEN {
        return Ok(raw.to_vec());
    }
    if raw.len() == 1 {
        return Ok(vec![raw[0]; FIXED_LEN]);
    }

    let span = (raw.len() - 1) as f64;
    let step = span / (FIXED_LEN - 1) as f64;

    let mut output = Vec::with_capacity(FIXED_LEN);
    for i in 0..FIXED_LEN {
        let pos = i as f64 * step;
        let idx = (pos.floor() as usize).min(raw.len() - 2);
        let frac = (pos - idx as f64) as f32;
        output.push(raw[idx] * (1.0 - frac) + raw[idx + 1] * frac);
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_at_target_length() {
        let raw: Vec<f32> = (0..FIXED_LEN).map(|i| i as f32).collect();
        assert_eq!(resample(&raw).unwrap(), raw);
    }

    #[test]
    fn test_output_length_upsampling() {
        let raw: Vec<f32> = (0..100).map(|i| i as f32).collect();
        assert_eq!(resample(&raw).unwrap().len(), FIXED_LEN);
    }

    #[test]
    fn test_output_length_downsampling() {
        let raw: Vec<f32> = (0..1800).map(|i| (i as f32).sin()).collect();
        assert_eq!(resample(&raw).unwrap().len(), FIXED_LEN);
    }

    #[test]
    fn test_linear_ramp_stays_linear() {
        // A 10-sample ramp interpolates to a ramp: value at grid position i
        // must equal i * span / (FIXED_LEN - 1)
        let raw: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let resampled = resample(&raw).unwrap();

        let step = 9.0f64 / (FIXED_LEN - 1) as f64;
        for (i, &value) in resampled.iter().enumerate() {
            let expected = (i as f64 * step) as f32;
            assert!(
                (value - expected).abs() < 1e-4,
                "index {}: {} != {}",
                i,
                value,
                expected
            );
        }
    }

    #[test]
    fn test_endpoints_preserved() {
        let raw: Vec<f32> = vec![3.5, -1.0, 0.25, 7.75];
        let resampled = resample(&raw).unwrap();
        assert!((resampled[0] - 3.5).abs() < 1e-6);
        assert!((resampled[FIXED_LEN - 1] - 7.75).abs() < 1e-6);
    }

    #[test]
    fn test_single_sample_is_constant() {
        let resampled = resample(&[2.0]).unwrap();
        assert_eq!(resampled.len(), FIXED_LEN);
        assert!(resampled.iter().all(|&v| v == 2.0));
    }

    #[test]
    fn test_empty_is_invalid() {
        assert!(resample(&[]).is_err());
    }
}
