//! Rotorsense - Acoustic Drone Classification Core
//!
//! This library ingests short mono PCM recordings and decides whether they
//! contain a drone, and if so which prototype drone class they resemble.
//! Classification is prototype-based: a cosine-similarity k-nearest-neighbour
//! lookup over a labelled store of reference feature vectors.
//!
//! # Features
//! - IIR preprocessing chain (high-pass, band-pass, AGC, noise reduction)
//! - 19-dimensional spectral/temporal/harmonic acoustic descriptors
//! - Optional 2048-dimensional embeddings from an external service
//! - Z-score feature scaling fitted on the prototype set
//! - SNR-adaptive decision thresholds
//! - Sliding-window analysis with per-window aggregation
//! - Template bank matching merged into the k-NN predictions
//!
//! # Example
//! ```no_run
//! use rotorsense::pipeline::{ClassifyInput, DetectionPipeline};
//! use rotorsense::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env();
//! let pipeline = DetectionPipeline::new(&config).unwrap();
//!
//! let samples: Vec<f64> = vec![0.0; 44100];
//! let summary = pipeline
//!     .classify(ClassifyInput::new(&samples, 44100))
//!     .unwrap();
//! println!("drone: {}", summary.is_drone);
//! ```

// Allow traditional for loops - often clearer for audio DSP code
#![allow(clippy::needless_range_loop)]

pub mod audio;
pub mod classifier;
pub mod config;
pub mod embedding;
pub mod error;
pub mod features;
pub mod pipeline;
pub mod store;

pub use config::RuntimeConfig;
pub use error::{Error, Result};
pub use pipeline::DetectionPipeline;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Dimensionality of the hand-crafted acoustic feature vector
pub const FEATURE_DIM: usize = 19;

/// Dimensionality of embeddings produced by the external embedding service
pub const EMBEDDING_DIM: usize = 2048;

/// Default number of nearest neighbours consulted per prediction
pub const DEFAULT_K: usize = 5;

/// Default base confidence threshold for the drone decision
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.55;

/// Default minimum confidence for template bank matches
pub const DEFAULT_TEMPLATE_THRESHOLD: f64 = 0.75;
