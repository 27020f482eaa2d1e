//! Configuration management for rotorsense
//!
//! Runtime configuration is read from environment variables exactly once at
//! startup; preprocessing and window settings carry compile-time defaults that
//! callers may override per pipeline.

use crate::{Error, Result, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_K, DEFAULT_TEMPLATE_THRESHOLD};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Audio preprocessing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Enable the first-order IIR high-pass stage
    pub high_pass_enabled: bool,
    /// High-pass cutoff in Hz
    pub high_pass_cutoff_hz: f64,
    /// Enable the band-pass stage (high-pass then low-pass)
    pub band_pass_enabled: bool,
    /// Band-pass lower edge in Hz
    pub band_pass_low_hz: f64,
    /// Band-pass upper edge in Hz
    pub band_pass_high_hz: f64,
    /// Enable automatic gain control
    pub agc_enabled: bool,
    /// AGC target RMS level
    pub agc_target_rms: f64,
    /// Enable time-domain spectral subtraction
    pub noise_reduction_enabled: bool,
    /// Spectral subtraction factor
    pub noise_reduction_alpha: f64,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            high_pass_enabled: true,
            high_pass_cutoff_hz: 50.0,
            band_pass_enabled: true,
            band_pass_low_hz: 100.0,
            band_pass_high_hz: 5000.0,
            agc_enabled: true,
            agc_target_rms: 0.3,
            noise_reduction_enabled: false,
            noise_reduction_alpha: 0.1,
        }
    }
}

/// Sliding-window analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Window length in seconds
    pub window_seconds: f64,
    /// Overlap between consecutive windows in seconds
    pub overlap_seconds: f64,
    /// Minimum input duration before windows are used at all
    pub min_duration_seconds: f64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            window_seconds: 3.0,
            overlap_seconds: 1.5,
            min_duration_seconds: 4.0,
        }
    }
}

/// Runtime configuration resolved from the environment
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Prototype model file
    pub model_path: PathBuf,
    /// Requested neighbour count (pre-adaptation)
    pub k: usize,
    /// Base confidence threshold for the drone decision
    pub confidence_threshold: f64,
    /// Template bank file
    pub template_path: PathBuf,
    /// Minimum confidence for template matches
    pub template_threshold: f64,
    /// Prefer the external embedding service over hand-crafted features
    pub use_embeddings: bool,
    /// Embedding service endpoint
    pub embedding_service_url: String,
    /// Preprocessing settings
    pub preprocess: PreprocessConfig,
    /// Sliding-window settings
    pub window: WindowConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("drone/prototypes.json"),
            k: DEFAULT_K,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            template_path: PathBuf::from("drone/templates.json"),
            template_threshold: DEFAULT_TEMPLATE_THRESHOLD,
            use_embeddings: true,
            embedding_service_url: "http://localhost:5002".into(),
            preprocess: PreprocessConfig::default(),
            window: WindowConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Resolve configuration from environment variables.
    ///
    /// Unset or unparseable values fall back to their defaults; a malformed
    /// value is logged rather than treated as fatal.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            model_path: env_var("DRONE_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_path),
            k: env_parsed("DRONE_MODEL_K", defaults.k),
            confidence_threshold: env_parsed(
                "DRONE_CONFIDENCE_THRESHOLD",
                defaults.confidence_threshold,
            ),
            template_path: env_var("DRONE_TEMPLATE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.template_path),
            template_threshold: env_parsed("DRONE_TEMPLATE_THRESHOLD", defaults.template_threshold),
            use_embeddings: env_var("USE_PANNS_EMBEDDINGS")
                .map(|v| v == "true")
                .unwrap_or(defaults.use_embeddings),
            embedding_service_url: env_var("EMBEDDING_SERVICE_URL")
                .unwrap_or(defaults.embedding_service_url),
            preprocess: PreprocessConfig::default(),
            window: WindowConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(Error::Config("neighbour count k must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(Error::Config(
                "confidence threshold must be in [0, 1]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.template_threshold) {
            return Err(Error::Config("template threshold must be in [0, 1]".into()));
        }
        if self.window.window_seconds <= 0.0 {
            return Err(Error::Config("window length must be > 0".into()));
        }
        if self.window.overlap_seconds < 0.0 {
            return Err(Error::Config("window overlap must be >= 0".into()));
        }
        if self.window.overlap_seconds >= self.window.window_seconds {
            log::warn!(
                "window overlap {}s >= window length {}s; hop degrades to half-window",
                self.window.overlap_seconds,
                self.window.window_seconds
            );
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env_var(name) {
        Some(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                log::warn!("ignoring unparseable {}={:?}", name, raw);
                default
            }
        },
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_defaults() {
        let config = PreprocessConfig::default();
        assert!(config.high_pass_enabled);
        assert_eq!(config.high_pass_cutoff_hz, 50.0);
        assert_eq!(config.band_pass_low_hz, 100.0);
        assert_eq!(config.band_pass_high_hz, 5000.0);
        assert_eq!(config.agc_target_rms, 0.3);
        assert!(!config.noise_reduction_enabled);
    }

    #[test]
    fn test_runtime_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.k, 5);
        assert_eq!(config.confidence_threshold, 0.55);
        assert_eq!(config.template_threshold, 0.75);
        assert!(config.use_embeddings);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_k() {
        let config = RuntimeConfig {
            k: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_threshold() {
        let config = RuntimeConfig {
            confidence_threshold: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
