//! The individual acoustic descriptors
//!
//! Frequency-domain descriptors take the magnitude spectrum and bin
//! frequencies; temporal descriptors work on the raw window. Functions here
//! return raw (un-normalised) values where later features depend on them —
//! `extract_feature_vector` applies the final clipping and scaling.

use super::spectrum::Spectrum;

/// Root mean square amplitude
pub fn root_mean_square(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|v| v * v).sum();
    (sum / samples.len() as f64).sqrt()
}

/// Fraction of consecutive non-zero sample pairs that change sign
pub fn zero_crossing_rate(samples: &[f64]) -> f64 {
    if samples.len() <= 1 {
        return 0.0;
    }
    let mut count = 0u64;
    for i in 1..samples.len() {
        if samples[i - 1] == 0.0 || samples[i] == 0.0 {
            continue;
        }
        if (samples[i - 1] > 0.0) != (samples[i] > 0.0) {
            count += 1;
        }
    }
    count as f64 / (samples.len() - 1) as f64
}

/// Population variance of the signal
pub fn signal_variance(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    samples.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / samples.len() as f64
}

/// Magnitude-weighted average frequency in Hz
pub fn spectral_centroid(spectrum: &Spectrum) -> f64 {
    let mut weighted_sum = 0.0;
    let mut total = 0.0;
    for i in 0..spectrum.len() {
        weighted_sum += spectrum.magnitude[i] * spectrum.freqs[i];
        total += spectrum.magnitude[i];
    }
    if total == 0.0 {
        return 0.0;
    }
    weighted_sum / total
}

/// Magnitude-weighted standard deviation of frequency around the centroid
pub fn spectral_bandwidth(spectrum: &Spectrum, centroid: f64) -> f64 {
    let mut variance = 0.0;
    let mut total = 0.0;
    for i in 0..spectrum.len() {
        let deviation = spectrum.freqs[i] - centroid;
        variance += spectrum.magnitude[i] * deviation * deviation;
        total += spectrum.magnitude[i];
    }
    if total == 0.0 {
        return 0.0;
    }
    (variance / total).sqrt()
}

/// Smallest frequency whose cumulative magnitude reaches `threshold` of the total
pub fn spectral_rolloff(spectrum: &Spectrum, threshold: f64) -> f64 {
    if spectrum.is_empty() {
        return 0.0;
    }
    let threshold = if threshold <= 0.0 || threshold >= 1.0 {
        0.85
    } else {
        threshold
    };

    let total: f64 = spectrum.magnitude.iter().sum();
    if total == 0.0 {
        return *spectrum.freqs.last().unwrap();
    }

    let target = threshold * total;
    let mut cumulative = 0.0;
    for i in 0..spectrum.len() {
        cumulative += spectrum.magnitude[i];
        if cumulative >= target {
            return spectrum.freqs[i];
        }
    }

    *spectrum.freqs.last().unwrap()
}

/// Geometric over arithmetic mean of the magnitudes; 1 for white noise
pub fn spectral_flatness(magnitude: &[f64]) -> f64 {
    if magnitude.is_empty() {
        return 0.0;
    }
    const EPS: f64 = 1e-12;

    let mut log_sum = 0.0;
    let mut arithmetic = 0.0;
    for &mag in magnitude {
        let value = mag + EPS;
        log_sum += value.ln();
        arithmetic += value;
    }

    let count = magnitude.len() as f64;
    let geo_mean = (log_sum / count).exp();
    let ari_mean = arithmetic / count;

    if ari_mean == 0.0 {
        return 0.0;
    }
    geo_mean / ari_mean
}

/// Peak-to-average magnitude ratio
pub fn spectral_crest_factor(magnitude: &[f64]) -> f64 {
    if magnitude.is_empty() {
        return 0.0;
    }
    let max_val = magnitude.iter().cloned().fold(f64::MIN, f64::max);
    let mean = magnitude.iter().sum::<f64>() / magnitude.len() as f64;
    if mean == 0.0 {
        return 0.0;
    }
    max_val / mean
}

/// Shannon entropy of the power distribution, normalised to [0, 1]
pub fn spectral_entropy(magnitude: &[f64]) -> f64 {
    if magnitude.is_empty() {
        return 0.0;
    }
    let power_sum: f64 = magnitude.iter().map(|m| m * m).sum();
    if power_sum == 0.0 {
        return 0.0;
    }

    let mut entropy = 0.0;
    for &mag in magnitude {
        let p = (mag * mag) / power_sum;
        if p > 0.0 {
            entropy -= p * p.log2();
        }
    }
    entropy / (magnitude.len() as f64).log2()
}

/// Frequency of the strongest bin in Hz
pub fn dominant_frequency(spectrum: &Spectrum) -> f64 {
    if spectrum.is_empty() {
        return 0.0;
    }
    let mut idx = 0;
    let mut max_val = spectrum.magnitude[0];
    for (i, &mag) in spectrum.magnitude.iter().enumerate() {
        if mag > max_val {
            max_val = mag;
            idx = i;
        }
    }
    spectrum.freqs[idx]
}

/// Temporal centre of energy mass, normalised to [0, 1]
pub fn temporal_centroid(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }

    let mut energy_sum = 0.0;
    let mut weighted_sum = 0.0;
    for (i, &sample) in samples.iter().enumerate() {
        let energy = sample * sample;
        energy_sum += energy;
        weighted_sum += energy * i as f64;
    }

    if energy_sum == 0.0 {
        return 0.0;
    }

    (weighted_sum / energy_sum) / samples.len() as f64
}

/// Rate of upward amplitude-threshold crossings, capped and scaled to [0, 1].
///
/// The threshold is `mean + stddev` of the amplitude envelope; the rate is
/// capped at 20 onsets per second before scaling.
pub fn onset_rate(samples: &[f64], sample_rate: u32) -> f64 {
    if samples.len() < 2 || sample_rate == 0 {
        return 0.0;
    }

    let abs_vals: Vec<f64> = samples.iter().map(|s| s.abs()).collect();
    let mean = abs_vals.iter().sum::<f64>() / abs_vals.len() as f64;
    let variance =
        abs_vals.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / abs_vals.len() as f64;
    let threshold = mean + variance.sqrt();

    let mut onset_count = 0u64;
    for i in 1..abs_vals.len() {
        if abs_vals[i - 1] < threshold && abs_vals[i] >= threshold {
            onset_count += 1;
        }
    }

    let duration = samples.len() as f64 / sample_rate as f64;
    if duration <= 0.0 {
        return 0.0;
    }

    const MAX_RATE: f64 = 20.0;
    let rate = (onset_count as f64 / duration).min(MAX_RATE);
    rate / MAX_RATE
}

/// Ratio of envelope variability to mean level, clipped to [0, 1]
pub fn amplitude_modulation_depth(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }

    let mean = samples.iter().map(|s| s.abs()).sum::<f64>() / samples.len() as f64;
    if mean == 0.0 {
        return 0.0;
    }

    let variance = samples
        .iter()
        .map(|s| {
            let diff = s.abs() - mean;
            diff * diff
        })
        .sum::<f64>()
        / samples.len() as f64;
    let std = variance.sqrt();

    (std / (mean + 1e-9)).min(1.0)
}

/// Asymmetry of the frequency distribution, squashed to (-1, 1) via tanh
pub fn spectral_skewness(spectrum: &Spectrum, centroid: f64, bandwidth: f64) -> f64 {
    if spectrum.is_empty() || bandwidth == 0.0 {
        return 0.0;
    }

    let mut total = 0.0;
    let mut third_moment = 0.0;
    for i in 0..spectrum.len() {
        let diff = spectrum.freqs[i] - centroid;
        third_moment += spectrum.magnitude[i] * diff * diff * diff;
        total += spectrum.magnitude[i];
    }
    if total == 0.0 {
        return 0.0;
    }

    let value = (third_moment / total) / (bandwidth.powi(3) + 1e-12);
    value.tanh()
}

/// Peakedness of the frequency distribution relative to Gaussian kurtosis
pub fn spectral_kurtosis(spectrum: &Spectrum, centroid: f64, bandwidth: f64) -> f64 {
    if spectrum.is_empty() || bandwidth == 0.0 {
        return 0.0;
    }

    let mut total = 0.0;
    let mut fourth_moment = 0.0;
    for i in 0..spectrum.len() {
        let diff = spectrum.freqs[i] - centroid;
        fourth_moment += spectrum.magnitude[i] * diff * diff * diff * diff;
        total += spectrum.magnitude[i];
    }
    if total == 0.0 {
        return 0.0;
    }

    let value = (fourth_moment / total) / (bandwidth.powi(4) + 1e-12);
    (value / 3.0).max(0.0)
}

/// Contrast between the three strongest bins and the average spectrum level
pub fn spectral_peak_prominence(magnitude: &[f64]) -> f64 {
    if magnitude.is_empty() {
        return 0.0;
    }

    let mean = magnitude.iter().sum::<f64>() / magnitude.len() as f64;
    if mean == 0.0 {
        return 0.0;
    }

    let mut peaks = magnitude.to_vec();
    peaks.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let top_count = peaks.len().min(3);
    let top_sum: f64 = peaks[peaks.len() - top_count..].iter().sum();
    let top_avg = top_sum / top_count as f64;

    let prominence = (top_avg - mean) / (top_avg + mean + 1e-9);
    prominence.clamp(0.0, 1.0)
}

/// Harmonic content around integer multiples of the fundamental.
///
/// Returns `(ratio, count, strength)`:
/// - ratio of harmonic energy to total spectral energy,
/// - number of detected harmonics out of 10,
/// - mean detected-harmonic magnitude relative to the spectrum peak.
///
/// A harmonic counts when the local maximum within a window of
/// `ceil(0.1 * f0 / bin_width)` bins (clamped to [1, 10]) around the target
/// bin exceeds 1.5x the average magnitude.
pub fn harmonic_features(
    spectrum: &Spectrum,
    fundamental_freq: f64,
    sample_rate: u32,
) -> (f64, f64, f64) {
    let magnitude = &spectrum.magnitude;
    if magnitude.is_empty() || fundamental_freq <= 0.0 {
        return (0.0, 0.0, 0.0);
    }

    let mut total_energy = 0.0;
    let mut sum_mag = 0.0;
    let mut max_mag = 0.0f64;
    for &mag in magnitude {
        total_energy += mag * mag;
        sum_mag += mag;
        max_mag = max_mag.max(mag);
    }
    if total_energy == 0.0 {
        return (0.0, 0.0, 0.0);
    }
    let avg_mag = sum_mag / magnitude.len() as f64;

    let freq_resolution = sample_rate as f64 / (magnitude.len() * 2) as f64;
    let tolerance = fundamental_freq * 0.1;
    let search_window = ((tolerance / freq_resolution).ceil() as usize).clamp(1, 10);

    const MAX_HARMONIC: usize = 10;
    let mut harmonic_energy = 0.0;
    let mut harmonic_magnitudes: Vec<f64> = Vec::new();

    for h in 1..=MAX_HARMONIC {
        let target_freq = fundamental_freq * h as f64;
        if target_freq >= sample_rate as f64 / 2.0 {
            break;
        }

        let target_bin = (target_freq / freq_resolution) as usize;
        if target_bin >= magnitude.len() {
            break;
        }

        let start_bin = target_bin.saturating_sub(search_window);
        let end_bin = (target_bin + search_window).min(magnitude.len() - 1);

        let local_max = magnitude[start_bin..=end_bin]
            .iter()
            .cloned()
            .fold(0.0f64, f64::max);

        if local_max > avg_mag * 1.5 {
            harmonic_energy += local_max * local_max;
            harmonic_magnitudes.push(local_max);
        }
    }

    let harmonic_ratio = harmonic_energy / total_energy;
    let harmonic_count = (harmonic_magnitudes.len() as f64 / MAX_HARMONIC as f64).min(1.0);

    let harmonic_strength = if !harmonic_magnitudes.is_empty() && max_mag > 0.0 {
        harmonic_magnitudes.iter().sum::<f64>() / harmonic_magnitudes.len() as f64 / max_mag
    } else {
        0.0
    };

    (harmonic_ratio, harmonic_count, harmonic_strength)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::spectrum::compute_spectrum;

    fn sine(freq: f64, sample_rate: u32, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * freq * i as f64 / sample_rate as f64).sin())
            .collect()
    }

    #[test]
    fn test_rms_full_scale_sine() {
        let samples = sine(440.0, 44100, 44100);
        let rms = root_mean_square(&samples);
        assert!((rms - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-3);
    }

    #[test]
    fn test_zcr_alternating() {
        let samples = vec![1.0, -1.0, 1.0, -1.0, 1.0];
        assert_eq!(zero_crossing_rate(&samples), 1.0);
    }

    #[test]
    fn test_zcr_skips_zeros() {
        let samples = vec![1.0, 0.0, -1.0, 0.0, 1.0];
        assert_eq!(zero_crossing_rate(&samples), 0.0);
    }

    #[test]
    fn test_variance_constant_signal() {
        let samples = vec![0.5; 1000];
        assert!(signal_variance(&samples) < 1e-12);
    }

    #[test]
    fn test_centroid_of_pure_tone() {
        let samples = sine(2000.0, 8192, 8192);
        let spectrum = compute_spectrum(&samples, 8192).unwrap();
        let centroid = spectral_centroid(&spectrum);
        assert!(
            (centroid - 2000.0).abs() < 100.0,
            "centroid {} not near 2 kHz",
            centroid
        );
    }

    #[test]
    fn test_flatness_tone_vs_flat_spectrum() {
        let samples = sine(1000.0, 8192, 8192);
        let spectrum = compute_spectrum(&samples, 8192).unwrap();
        // Concentrated spectrum: flatness near zero
        assert!(spectral_flatness(&spectrum.magnitude) < 0.1);
        // Identical magnitudes: flatness 1
        let flat = vec![0.5; 512];
        assert!((spectral_flatness(&flat) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_entropy_bounds() {
        let flat = vec![1.0; 256];
        assert!((spectral_entropy(&flat) - 1.0).abs() < 1e-9);
        let mut single = vec![0.0; 256];
        single[17] = 1.0;
        assert!(spectral_entropy(&single).abs() < 1e-9);
    }

    #[test]
    fn test_temporal_centroid_late_energy() {
        let mut samples = vec![0.0; 1000];
        for s in samples.iter_mut().skip(900) {
            *s = 1.0;
        }
        let centroid = temporal_centroid(&samples);
        assert!(centroid > 0.9, "centroid {} should be near the end", centroid);
    }

    #[test]
    fn test_am_depth_steady_vs_pulsed() {
        let steady = vec![0.5; 1000];
        assert!(amplitude_modulation_depth(&steady) < 1e-9);

        let mut pulsed = vec![0.0; 1000];
        for s in pulsed.iter_mut().step_by(10) {
            *s = 1.0;
        }
        assert!(amplitude_modulation_depth(&pulsed) > 0.5);
    }

    #[test]
    fn test_harmonics_of_sawtooth_like_tone() {
        // Sum of harmonics at 500 Hz fundamental
        let sr = 16384u32;
        let n = 16384usize;
        let samples: Vec<f64> = (0..n)
            .map(|i| {
                let t = i as f64 / sr as f64;
                (1..=5)
                    .map(|h| {
                        (2.0 * std::f64::consts::PI * 500.0 * h as f64 * t).sin() / h as f64
                    })
                    .sum::<f64>()
            })
            .collect();

        let spectrum = compute_spectrum(&samples, sr).unwrap();
        let fundamental = dominant_frequency(&spectrum);
        assert!((fundamental - 500.0).abs() < 10.0);

        let (ratio, count, strength) = harmonic_features(&spectrum, fundamental, sr);
        assert!(ratio > 0.3, "harmonic ratio too low: {}", ratio);
        assert!(count >= 0.3, "harmonic count too low: {}", count);
        assert!(strength > 0.0);
    }

    #[test]
    fn test_harmonics_zero_fundamental() {
        let samples = sine(1000.0, 8192, 8192);
        let spectrum = compute_spectrum(&samples, 8192).unwrap();
        assert_eq!(harmonic_features(&spectrum, 0.0, 8192), (0.0, 0.0, 0.0));
    }
}
