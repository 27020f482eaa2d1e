//! Acoustic feature extraction
//!
//! Derives a compact 19-dimensional descriptor from a preprocessed mono
//! waveform. The vector combines temporal statistics, FFT-derived spectral
//! shape, and harmonic structure — the harmonic features matter most for
//! rotor craft, whose propellers produce strong partials at multiples of the
//! blade-pass frequency.
//!
//! Output ordering is part of the contract: downstream scaling and the
//! prototype files identify features by index.

pub mod descriptors;
pub mod scaling;
pub mod spectrum;

use crate::{Error, Result};
use descriptors::*;
use spectrum::compute_spectrum;

/// Human-readable names for the 19 feature dimensions, in output order
pub const FEATURE_NAMES: [&str; 19] = [
    "Energy (RMS)",
    "Zero Crossing Rate",
    "Spectral Centroid",
    "Spectral Bandwidth",
    "Spectral Rolloff",
    "Spectral Flatness",
    "Dominant Frequency",
    "Spectral Crest Factor",
    "Spectral Entropy",
    "Variance",
    "Temporal Centroid",
    "Onset Rate",
    "Amplitude Modulation Depth",
    "Spectral Skewness",
    "Spectral Kurtosis",
    "Peak Prominence",
    "Harmonic Ratio",
    "Harmonic Count",
    "Harmonic Strength",
];

/// Extract the 19-dimensional acoustic descriptor for a waveform.
///
/// Deterministic: repeated calls on the same input produce bitwise-identical
/// vectors. Frequency-valued features are computed in raw Hz first (the
/// harmonic and shape features need them that way) and divided by the Nyquist
/// frequency at the end, so that no dimension spans a wildly different range
/// than the others before scaling.
pub fn extract_feature_vector(samples: &[f64], sample_rate: u32) -> Result<Vec<f64>> {
    if samples.is_empty() {
        return Err(Error::InvalidInput("no samples provided".into()));
    }
    if sample_rate == 0 {
        return Err(Error::InvalidInput("invalid sample rate".into()));
    }

    let energy = root_mean_square(samples);
    let zcr = zero_crossing_rate(samples);
    let variance = signal_variance(samples);

    let spectrum = compute_spectrum(samples, sample_rate)?;
    let mut centroid = spectral_centroid(&spectrum);
    let mut bandwidth = spectral_bandwidth(&spectrum, centroid);
    let mut rolloff = spectral_rolloff(&spectrum, 0.85);
    let flatness = spectral_flatness(&spectrum.magnitude);
    let mut crest = spectral_crest_factor(&spectrum.magnitude);
    let entropy = spectral_entropy(&spectrum.magnitude);
    let mut dominant = dominant_frequency(&spectrum);

    let temporal_centre = temporal_centroid(samples);
    let onset = onset_rate(samples, sample_rate);
    let am_depth = amplitude_modulation_depth(samples);
    let skewness = spectral_skewness(&spectrum, centroid, bandwidth);
    let mut kurtosis = spectral_kurtosis(&spectrum, centroid, bandwidth);
    let peak_prominence = spectral_peak_prominence(&spectrum.magnitude);

    // Harmonic structure needs the fundamental in raw Hz
    let (harmonic_ratio, harmonic_count, harmonic_strength) = if dominant > 0.0 {
        harmonic_features(&spectrum, dominant, sample_rate)
    } else {
        (0.0, 0.0, 0.0)
    };

    // Frequency features are in Hz (0..sample_rate/2); bring them to [0, 1]
    // only after every dependent computation is done
    let nyquist = sample_rate as f64 / 2.0;
    if nyquist > 0.0 {
        centroid = clamp01(centroid / nyquist);
        bandwidth = clamp01(bandwidth / nyquist);
        rolloff = clamp01(rolloff / nyquist);
        dominant = clamp01(dominant / nyquist);
    }

    // Crest factor ranges roughly 1-200 in practice
    crest = clamp01(crest / 100.0);
    // Shift kurtosis from its -3.. range into [0, 1]
    kurtosis = clamp01((kurtosis + 3.0) / 13.0);

    Ok(vec![
        energy,
        zcr,
        centroid,
        bandwidth,
        rolloff,
        flatness,
        dominant,
        crest,
        entropy,
        variance,
        temporal_centre,
        onset,
        am_depth,
        skewness,
        kurtosis,
        peak_prominence,
        harmonic_ratio,
        harmonic_count,
        harmonic_strength,
    ])
}

/// Rescale a vector to unit L2 length, in place. Zero vectors are left alone.
pub fn l2_normalize_in_place(vector: &mut [f64]) {
    let sum_squares: f64 = vector.iter().map(|v| v * v).sum();
    if sum_squares == 0.0 {
        return;
    }
    let factor = 1.0 / sum_squares.sqrt();
    for v in vector.iter_mut() {
        *v *= factor;
    }
}

/// Rescale a vector to unit L2 length, returning a copy
pub fn l2_normalize(vector: &[f64]) -> Vec<f64> {
    let mut result = vector.to_vec();
    l2_normalize_in_place(&mut result);
    result
}

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FEATURE_DIM;

    fn drone_like(sample_rate: u32, seconds: f64) -> Vec<f64> {
        let n = (sample_rate as f64 * seconds) as usize;
        (0..n)
            .map(|i| {
                let t = i as f64 / sample_rate as f64;
                let mut v = 0.0;
                for h in 1..=4 {
                    v += (2.0 * std::f64::consts::PI * 220.0 * h as f64 * t).sin() / h as f64;
                }
                v * 0.2
            })
            .collect()
    }

    #[test]
    fn test_extract_errors() {
        assert!(extract_feature_vector(&[], 44100).is_err());
        assert!(extract_feature_vector(&[0.1, 0.2], 0).is_err());
    }

    #[test]
    fn test_extract_dimension_and_names() {
        let samples = drone_like(44100, 0.5);
        let features = extract_feature_vector(&samples, 44100).unwrap();
        assert_eq!(features.len(), FEATURE_DIM);
        assert_eq!(FEATURE_NAMES.len(), FEATURE_DIM);
    }

    #[test]
    fn test_extract_deterministic() {
        let samples = drone_like(44100, 1.0);
        let a = extract_feature_vector(&samples, 44100).unwrap();
        let b = extract_feature_vector(&samples, 44100).unwrap();
        let max_diff = a
            .iter()
            .zip(&b)
            .map(|(x, y)| (x - y).abs())
            .fold(0.0f64, f64::max);
        assert!(max_diff < 1e-10);
    }

    #[test]
    fn test_extract_all_finite() {
        let samples = drone_like(22050, 0.3);
        let features = extract_feature_vector(&samples, 22050).unwrap();
        assert!(features.iter().all(|f| f.is_finite()));
    }

    #[test]
    fn test_normalized_dims_in_unit_range() {
        let samples = drone_like(44100, 0.5);
        let features = extract_feature_vector(&samples, 44100).unwrap();
        // Dims 3-8 (centroid..entropy) and 12-16 (onset..prominence) are
        // normalised to [0, 1] by contract; indices here are zero-based.
        // Skewness is tanh-squashed and may legitimately be negative.
        for &idx in &[2, 3, 4, 5, 6, 7, 8, 11, 12, 14, 15] {
            assert!(
                (0.0..=1.0).contains(&features[idx]),
                "feature {} ({}) out of range: {}",
                idx,
                FEATURE_NAMES[idx],
                features[idx]
            );
        }
        assert!((-1.0..=1.0).contains(&features[13]));
    }

    #[test]
    fn test_in_range_input_keeps_temporal_dims_in_unit_range() {
        let samples = drone_like(44100, 0.5);
        let features = extract_feature_vector(&samples, 44100).unwrap();
        for &idx in &[0, 1, 9, 10, 12] {
            assert!(
                (0.0..=1.0).contains(&features[idx]),
                "feature {} out of range: {}",
                idx,
                features[idx]
            );
        }
    }

    #[test]
    fn test_harmonic_features_populated_for_harmonic_signal() {
        let samples = drone_like(44100, 1.0);
        let features = extract_feature_vector(&samples, 44100).unwrap();
        assert!(features[16] > 0.0, "harmonic ratio should be non-zero");
        assert!(features[17] > 0.0, "harmonic count should be non-zero");
        assert!(features[18] > 0.0, "harmonic strength should be non-zero");
    }

    #[test]
    fn test_l2_normalize() {
        let v = vec![3.0, 4.0];
        let n = l2_normalize(&v);
        assert!((n[0] - 0.6).abs() < 1e-12);
        assert!((n[1] - 0.8).abs() < 1e-12);

        let mut zero = vec![0.0, 0.0];
        l2_normalize_in_place(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }
}
