//! Audio resampling and channel mixing utilities.
//!
//! The denoising model requires **48 kHz mono `f32`** audio.  This module
//! provides the two conversion steps:
//!
//! 1. [`stereo_to_mono`] — downmix any number of interleaved channels to mono.
//! 2. [`resample_to_48k`] — resample from any source rate to 48 000 Hz.
//!
//! Resampling quality is not this crate's business; the linear interpolator
//! below is the minimum needed to honour the WAV batch contract and live
//! capture from devices that do not run at 48 kHz natively.

// ---------------------------------------------------------------------------
// stereo_to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// The output length is `samples.len() / channels`.
///
/// * If `channels == 1` the input slice is returned as an owned `Vec` with no
///   averaging (fast path — avoids an extra allocation when already mono).
/// * If `channels == 0` an empty vector is returned.
///
/// # Example
///
/// ```rust
/// use stream_denoise::audio::stereo_to_mono;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, -0.2]; // L R L R
/// let mono = stereo_to_mono(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[0] - 0.0).abs() < 1e-6);
/// assert!((mono[1] - 0.0).abs() < 1e-6);
/// ```
pub fn stereo_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// resample
// ---------------------------------------------------------------------------

/// Resample `samples` from `source_rate` Hz to `target_rate` Hz using linear
/// interpolation.
///
/// * If the rates match the input is cloned and returned unchanged.
/// * If `samples` is empty an empty vector is returned.
///
/// The output length is approximately
/// `samples.len() * target_rate / source_rate`.
pub fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate {
        return samples.to_vec();
    }

    if samples.is_empty() {
        return Vec::new();
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let output_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;

        let sample = if idx + 1 < samples.len() {
            // Linear interpolation between adjacent samples
            samples[idx] * (1.0 - frac as f32) + samples[idx + 1] * frac as f32
        } else if idx < samples.len() {
            samples[idx]
        } else {
            0.0
        };

        output.push(sample);
    }

    output
}

/// Resample to the model's 48 000 Hz rate.
///
/// # Example
///
/// ```rust
/// use stream_denoise::audio::resample_to_48k;
///
/// // Upsample from 16 kHz to 48 kHz (ratio = 3)
/// let lo = vec![0.5_f32; 160];
/// let hi = resample_to_48k(&lo, 16_000);
/// assert_eq!(hi.len(), 480);
/// ```
pub fn resample_to_48k(samples: &[f32], source_rate: u32) -> Vec<f32> {
    resample(samples, source_rate, crate::audio::codec::SAMPLE_RATE)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
