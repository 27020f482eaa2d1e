//! Single-frame magnitude spectrum computation
//!
//! The descriptor set operates on one FFT over the whole (zero-padded)
//! window rather than an STFT: the analysis windows are short and the
//! descriptors are scalar summaries, so one frame is enough.

use crate::{Error, Result};
use realfft::RealFftPlanner;

/// Magnitude spectrum over the positive-frequency bins
#[derive(Debug, Clone)]
pub struct Spectrum {
    /// Bin magnitudes, `fft_size / 2` entries
    pub magnitude: Vec<f64>,
    /// Bin centre frequencies in Hz
    pub freqs: Vec<f64>,
}

impl Spectrum {
    /// Number of bins
    pub fn len(&self) -> usize {
        self.magnitude.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.magnitude.is_empty()
    }
}

/// Smallest power of two >= n (1 for n == 0)
pub fn next_power_of_two(n: usize) -> usize {
    let mut power = 1;
    while power < n {
        power <<= 1;
    }
    power
}

/// Multiply the buffer by a Hann window spanning its full length
pub fn apply_hann_window(buffer: &mut [f64]) {
    let len = buffer.len();
    if len <= 1 {
        return;
    }
    for (i, value) in buffer.iter_mut().enumerate() {
        *value *= 0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / (len - 1) as f64).cos());
    }
}

/// Compute the Hann-windowed magnitude spectrum of a signal.
///
/// The signal is zero-padded to the next power of two, windowed, and passed
/// through a real-input FFT. Only the `fft_size / 2` positive-frequency bins
/// are kept; bin `i` sits at `i * sample_rate / fft_size` Hz.
pub fn compute_spectrum(samples: &[f64], sample_rate: u32) -> Result<Spectrum> {
    if samples.is_empty() {
        return Err(Error::InvalidInput("no samples provided".into()));
    }

    let fft_size = next_power_of_two(samples.len());
    let mut buffer = vec![0.0f64; fft_size];
    buffer[..samples.len()].copy_from_slice(samples);
    apply_hann_window(&mut buffer);

    let mut planner = RealFftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(fft_size);
    let mut output = fft.make_output_vec();
    fft.process(&mut buffer, &mut output)
        .map_err(|e| Error::Audio(format!("FFT failed: {}", e)))?;

    let bin_count = fft_size / 2;
    let mut magnitude = Vec::with_capacity(bin_count);
    let mut freqs = Vec::with_capacity(bin_count);
    for (i, value) in output.iter().take(bin_count).enumerate() {
        magnitude.push(value.norm());
        freqs.push(i as f64 * sample_rate as f64 / fft_size as f64);
    }

    Ok(Spectrum { magnitude, freqs })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_power_of_two() {
        assert_eq!(next_power_of_two(0), 1);
        assert_eq!(next_power_of_two(1), 1);
        assert_eq!(next_power_of_two(2), 2);
        assert_eq!(next_power_of_two(3), 4);
        assert_eq!(next_power_of_two(1024), 1024);
        assert_eq!(next_power_of_two(1025), 2048);
    }

    #[test]
    fn test_hann_window_endpoints() {
        let mut buffer = vec![1.0; 1024];
        apply_hann_window(&mut buffer);
        assert!(buffer[0].abs() < 1e-12);
        assert!(buffer[1023].abs() < 1e-12);
        assert!((buffer[511] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_hann_window_degenerate() {
        let mut buffer = vec![0.7];
        apply_hann_window(&mut buffer);
        assert_eq!(buffer[0], 0.7);
    }

    #[test]
    fn test_spectrum_peak_at_tone() {
        let sr = 8192u32;
        // 1 kHz lands exactly on a bin for a power-of-two input length
        let samples: Vec<f64> = (0..8192)
            .map(|i| (2.0 * std::f64::consts::PI * 1000.0 * i as f64 / sr as f64).sin())
            .collect();

        let spectrum = compute_spectrum(&samples, sr).unwrap();
        assert_eq!(spectrum.len(), 4096);

        let peak_idx = spectrum
            .magnitude
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap()
            .0;
        assert!((spectrum.freqs[peak_idx] - 1000.0).abs() < 2.0);
    }

    #[test]
    fn test_spectrum_empty_input() {
        assert!(compute_spectrum(&[], 44100).is_err());
    }
}
