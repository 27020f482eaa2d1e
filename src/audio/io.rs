//! WAV loading for the CLI drivers and prototype ingest
//!
//! The classification core consumes already-decoded samples; this loader
//! exists so the thin drivers can feed it files. Multi-channel input is
//! downmixed by averaging.

use super::AudioSample;
use crate::{Error, Result};
use hound::{SampleFormat, WavReader};
use std::path::Path;

/// Load a WAV file as mono f64 samples in [-1, 1]
pub fn load_wav_mono<P: AsRef<Path>>(path: P) -> Result<AudioSample> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::FileNotFound(path.display().to_string()));
    }

    let reader =
        WavReader::open(path).map_err(|e| Error::Audio(format!("failed to open WAV: {}", e)))?;
    let spec = reader.spec();
    let sample_rate = spec.sample_rate;
    let channels = spec.channels as usize;

    let samples: Vec<f64> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.map(f64::from))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Audio(format!("failed to read samples: {}", e)))?,
        SampleFormat::Int => {
            let bits = spec.bits_per_sample;
            let max_val = (1i64 << (bits - 1)) as f64;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f64 / max_val))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| Error::Audio(format!("failed to read samples: {}", e)))?
        }
    };

    let mono = if channels > 1 {
        samples
            .chunks(channels)
            .map(|chunk| chunk.iter().sum::<f64>() / channels as f64)
            .collect()
    } else {
        samples
    };

    Ok(AudioSample::new(mono, sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    #[test]
    fn test_load_missing_file() {
        let result = load_wav_mono("definitely/not/here.wav");
        assert!(matches!(result, Err(Error::FileNotFound(_))));
    }

    #[test]
    fn test_load_stereo_downmix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");

        let spec = WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for _ in 0..100 {
            writer.write_sample(16384i16).unwrap();
            writer.write_sample(-16384i16).unwrap();
        }
        writer.finalize().unwrap();

        let audio = load_wav_mono(&path).unwrap();
        assert_eq!(audio.sample_rate, 8000);
        assert_eq!(audio.len(), 100);
        // Opposite-phase channels cancel on downmix
        assert!(audio.samples.iter().all(|s| s.abs() < 1e-4));
    }
}
