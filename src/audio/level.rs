//! Pure signal-level measurements.
//!
//! Both functions are O(n) over the sample buffer and return `0.0` for an
//! empty input so callers never see NaN from a zero-length window.

// ---------------------------------------------------------------------------
// calculate_rms
// ---------------------------------------------------------------------------

/// Root-mean-square amplitude of `samples`.
///
/// # Example
///
/// ```rust
/// use stream_denoise::audio::calculate_rms;
///
/// let rms = calculate_rms(&[0.5_f32, -0.5, 0.5, -0.5]);
/// assert!((rms - 0.5).abs() < 1e-6);
/// ```
pub fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let mean_sq: f32 = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    mean_sq.sqrt()
}

// ---------------------------------------------------------------------------
// calculate_peak
// ---------------------------------------------------------------------------

/// Peak absolute amplitude of `samples`.
pub fn calculate_peak(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s.abs()).fold(0.0_f32, f32::max)
}

/// Mean power (mean of squared samples) of `samples`; `0.0` for empty input.
///
/// Used for the per-frame noise-reduction power ratio
/// `(1 - output_power / input_power)`.
pub fn calculate_power(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rms_of_empty_is_zero() {
        assert_eq!(calculate_rms(&[]), 0.0);
    }

    #[test]
    fn rms_of_dc_signal_is_amplitude() {
        let rms = calculate_rms(&[0.3_f32; 480]);
        assert!((rms - 0.3).abs() < 1e-6);
    }

    #[test]
    fn rms_ignores_sign() {
        let a = calculate_rms(&[0.4_f32; 100]);
        let b = calculate_rms(&[-0.4_f32; 100]);
        assert!((a - b).abs() < 1e-7);
    }

    #[test]
    fn peak_of_empty_is_zero() {
        assert_eq!(calculate_peak(&[]), 0.0);
    }

    #[test]
    fn peak_finds_largest_magnitude() {
        let peak = calculate_peak(&[0.1_f32, -0.9, 0.5]);
        assert!((peak - 0.9).abs() < 1e-7);
    }

    #[test]
    fn power_of_silence_is_zero() {
        assert_eq!(calculate_power(&[0.0_f32; 480]), 0.0);
    }

    #[test]
    fn power_is_square_of_rms() {
        let samples: Vec<f32> = (0..480).map(|i| ((i as f32) * 0.13).sin() * 0.4).collect();
        let rms = calculate_rms(&samples);
        let power = calculate_power(&samples);
        assert!((rms * rms - power).abs() < 1e-6);
    }
}
