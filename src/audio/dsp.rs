//! Preprocessing chain: IIR filtering, gain control, noise reduction
//!
//! All stages degrade to pass-through on out-of-range parameters; none of
//! them can fail. The chain order is high-pass, band-pass, AGC, then
//! optional noise reduction.

use crate::config::PreprocessConfig;

/// Apply the configured preprocessing steps to a decoded signal
pub fn preprocess(samples: &[f64], sample_rate: u32, config: &PreprocessConfig) -> Vec<f64> {
    if samples.is_empty() {
        return vec![];
    }

    let mut result = samples.to_vec();

    if config.high_pass_enabled {
        result = high_pass_filter(&result, sample_rate, config.high_pass_cutoff_hz);
    }

    if config.band_pass_enabled {
        result = band_pass_filter(
            &result,
            sample_rate,
            config.band_pass_low_hz,
            config.band_pass_high_hz,
        );
    }

    if config.agc_enabled {
        result = apply_agc(&result, config.agc_target_rms);
    }

    if config.noise_reduction_enabled {
        result = noise_reduction(&result, config.noise_reduction_alpha);
    }

    result
}

/// Remove frequencies below `cutoff_hz` with a first-order IIR filter
///
/// y[0] = x[0]; y[n] = alpha * (y[n-1] + x[n] - x[n-1])
pub fn high_pass_filter(samples: &[f64], sample_rate: u32, cutoff_hz: f64) -> Vec<f64> {
    if cutoff_hz <= 0.0 || cutoff_hz >= sample_rate as f64 / 2.0 {
        return samples.to_vec();
    }

    let rc = 1.0 / (2.0 * std::f64::consts::PI * cutoff_hz);
    let dt = 1.0 / sample_rate as f64;
    let alpha = rc / (rc + dt);

    let mut filtered = Vec::with_capacity(samples.len());
    let mut prev_output = 0.0;

    for (i, &x) in samples.iter().enumerate() {
        let y = if i == 0 {
            x
        } else {
            alpha * (prev_output + x - samples[i - 1])
        };
        filtered.push(y);
        prev_output = y;
    }

    filtered
}

/// Remove frequencies above `cutoff_hz` with a first-order IIR filter
///
/// y[0] = alpha * x[0]; y[n] = alpha * x[n] + (1 - alpha) * y[n-1]
pub fn low_pass_filter(samples: &[f64], sample_rate: u32, cutoff_hz: f64) -> Vec<f64> {
    if cutoff_hz <= 0.0 || cutoff_hz >= sample_rate as f64 / 2.0 {
        return samples.to_vec();
    }

    let rc = 1.0 / (2.0 * std::f64::consts::PI * cutoff_hz);
    let dt = 1.0 / sample_rate as f64;
    let alpha = dt / (rc + dt);

    let mut filtered = Vec::with_capacity(samples.len());
    let mut prev_output = 0.0;

    for (i, &x) in samples.iter().enumerate() {
        let y = if i == 0 {
            x * alpha
        } else {
            alpha * x + (1.0 - alpha) * prev_output
        };
        filtered.push(y);
        prev_output = y;
    }

    filtered
}

/// High-pass then low-pass in sequence
pub fn band_pass_filter(samples: &[f64], sample_rate: u32, low_hz: f64, high_hz: f64) -> Vec<f64> {
    let result = high_pass_filter(samples, sample_rate, low_hz);
    low_pass_filter(&result, sample_rate, high_hz)
}

/// Normalize signal level towards `target_rms` with a tanh soft limiter
///
/// Amplified samples whose magnitude exceeds 0.95 are replaced with
/// `tanh(amplified) * 0.95` to prevent hard clipping.
pub fn apply_agc(samples: &[f64], target_rms: f64) -> Vec<f64> {
    if samples.is_empty() {
        return vec![];
    }

    let sum_squares: f64 = samples.iter().map(|s| s * s).sum();
    let current_rms = (sum_squares / samples.len() as f64).sqrt();

    if current_rms == 0.0 || (current_rms - target_rms).abs() < 1e-6 {
        return samples.to_vec();
    }

    let gain = target_rms / current_rms;

    samples
        .iter()
        .map(|&s| {
            let amplified = s * gain;
            if amplified.abs() > 0.95 {
                amplified.tanh() * 0.95
            } else {
                amplified
            }
        })
        .collect()
}

/// Basic time-domain spectral subtraction
///
/// The noise floor is estimated as the RMS of the leading 10% of the signal
/// (at least 512 samples). Samples above `floor * (1 + alpha)` have
/// `floor * alpha` subtracted with their sign; samples below are attenuated
/// by `1 - 2 * alpha`. Inputs shorter than 1024 samples pass through.
pub fn noise_reduction(samples: &[f64], alpha: f64) -> Vec<f64> {
    if samples.len() < 1024 {
        return samples.to_vec();
    }

    let noise_len = (samples.len() / 10).max(512);
    let noise_floor = segment_rms(&samples[..noise_len]);
    let noise_threshold = noise_floor * (1.0 + alpha);

    samples
        .iter()
        .map(|&s| {
            if s.abs() > noise_threshold {
                s - (noise_floor * alpha).copysign(s)
            } else {
                s * (1.0 - alpha * 2.0)
            }
        })
        .collect()
}

pub(crate) fn segment_rms(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f64 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f64).sqrt()
}
