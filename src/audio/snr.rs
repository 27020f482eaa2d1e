//! SNR estimation and the SNR-adaptive decision threshold

use super::dsp::segment_rms;

/// Estimate the signal-to-noise ratio of a recording in dB.
///
/// The noise floor is taken from the leading 10% of the input (at least 512
/// samples, clamped to the input length) on the assumption that the capture
/// starts relatively quiet; signal power is the mean square of the whole
/// input.
pub fn estimate_snr(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }

    let noise_len = (samples.len() / 10).max(512).min(samples.len());
    let noise_rms = segment_rms(&samples[..noise_len]);
    let noise_power = noise_rms * noise_rms;

    let signal_power: f64 =
        samples.iter().map(|s| s * s).sum::<f64>() / samples.len() as f64;

    if noise_power == 0.0 {
        return 100.0;
    }

    let ratio = signal_power / noise_power;
    if ratio <= 0.0 {
        return -100.0;
    }

    10.0 * ratio.log10()
}

/// Adjust the base confidence threshold for the measured SNR.
///
/// Noisier captures demand more confidence before a detection is accepted:
///
/// | SNR (dB)   | adjustment |
/// |------------|------------|
/// | < 10       | +0.15      |
/// | 10 to < 20 | +0.10      |
/// | 20 to < 30 | +0.05      |
/// | >= 30      | +0.00      |
///
/// The result is clamped to [0.5, 0.9].
pub fn adaptive_threshold(base_threshold: f64, snr_db: f64) -> f64 {
    let adjustment = if snr_db < 10.0 {
        0.15
    } else if snr_db < 20.0 {
        0.10
    } else if snr_db < 30.0 {
        0.05
    } else {
        0.0
    };

    (base_threshold + adjustment).clamp(0.5, 0.9)
}
