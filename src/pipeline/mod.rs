//! End-to-end detection pipeline
//!
//! Wires the preprocessing chain, feature extraction (or the external
//! embedding service), the k-NN classifier, the optional template bank and
//! the SNR-adaptive decision into one classify call, and exposes prototype
//! ingest on top of the store.

use crate::audio::{adaptive_threshold, estimate_snr, load_wav_mono, preprocess};
use crate::classifier::template::{merge_predictions, TemplateMatcher};
use crate::classifier::window::WindowPrediction;
use crate::classifier::{is_drone_likely, Classifier, Prediction};
use crate::config::{PreprocessConfig, RuntimeConfig, WindowConfig};
use crate::embedding::EmbeddingClient;
use crate::features::extract_feature_vector;
use crate::store::{ModelStats, Prototype, PrototypeStore};
use crate::{Error, Result, EMBEDDING_DIM};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// One classification request
#[derive(Debug, Clone)]
pub struct ClassifyInput<'a> {
    /// Decoded mono samples in [-1, 1]
    pub samples: &'a [f64],
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Skip the preprocessing chain (samples were already preprocessed)
    pub preprocessed: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Passed through to the summary verbatim
    pub recording_path: Option<String>,
}

impl<'a> ClassifyInput<'a> {
    /// Classify raw decoded samples with default options
    pub fn new(samples: &'a [f64], sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            preprocessed: false,
            latitude: None,
            longitude: None,
            recording_path: None,
        }
    }
}

/// Raw predictions packaged with auxiliary telemetry
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationSummary {
    pub predictions: Vec<Prediction>,
    pub is_drone: bool,
    pub latency_ms: f64,
    /// Raw feature vector the decision was made on (19 or 2048 dims)
    pub feature_vector: Vec<f64>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub primary_type: String,
    pub snr_db: f64,
    /// Threshold actually applied after SNR adjustment
    pub adjusted_threshold: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub windows: Vec<WindowPrediction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recording_path: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub template_predictions: Vec<Prediction>,
}

/// Prototype ingest parameters
#[derive(Debug, Clone, Default)]
pub struct IngestRequest {
    pub label: String,
    /// Defaults to "drone" when empty
    pub category: String,
    pub description: Option<String>,
    pub source: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// The assembled classification pipeline
pub struct DetectionPipeline {
    store: Arc<PrototypeStore>,
    classifier: Classifier,
    template_matcher: Option<TemplateMatcher>,
    embedder: Option<EmbeddingClient>,
    preprocess_cfg: PreprocessConfig,
    window_cfg: WindowConfig,
    base_threshold: f64,
}

impl DetectionPipeline {
    /// Build the pipeline from runtime configuration: load the prototype
    /// store (with example fallback), the optional template bank, and set up
    /// the embedding client when the store holds embedding-width vectors.
    pub fn new(config: &RuntimeConfig) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(PrototypeStore::load(&config.model_path, config.k)?);
        log::info!(
            "loaded {} prototypes from {} ({} dims)",
            store.len(),
            config.model_path.display(),
            store.expected_dim()
        );

        let template_matcher = match TemplateMatcher::load(
            &config.template_path,
            config.template_threshold,
            store.expected_dim(),
        ) {
            Ok(matcher) => {
                log::info!("loaded {} templates", matcher.count());
                Some(matcher)
            }
            Err(err) => {
                log::debug!("template bank not loaded: {}", err);
                None
            }
        };

        let embedder = if config.use_embeddings && store.expected_dim() == EMBEDDING_DIM {
            let client = EmbeddingClient::new(&config.embedding_service_url)?;
            if let Err(err) = client.health_check() {
                log::warn!("embedding service health check failed: {}", err);
            }
            Some(client)
        } else {
            None
        };

        Ok(Self::from_parts(store, template_matcher, embedder, config))
    }

    /// Assemble a pipeline from already-constructed parts
    pub fn from_parts(
        store: Arc<PrototypeStore>,
        template_matcher: Option<TemplateMatcher>,
        embedder: Option<EmbeddingClient>,
        config: &RuntimeConfig,
    ) -> Self {
        let classifier = Classifier::new(Arc::clone(&store));
        Self {
            store,
            classifier,
            template_matcher,
            embedder,
            preprocess_cfg: config.preprocess.clone(),
            window_cfg: config.window.clone(),
            base_threshold: config.confidence_threshold,
        }
    }

    /// The underlying prototype store
    pub fn store(&self) -> &Arc<PrototypeStore> {
        &self.store
    }

    /// Summary metadata about the loaded model
    pub fn stats(&self) -> ModelStats {
        self.store.stats()
    }

    /// Run the full classification pipeline on one recording.
    ///
    /// Estimates SNR on the raw signal, preprocesses (unless the caller did),
    /// derives features or an embedding, classifies (with sliding windows for
    /// long 19-dim captures), merges template matches and applies the
    /// SNR-adjusted decision threshold.
    pub fn classify(&self, input: ClassifyInput) -> Result<ClassificationSummary> {
        let started = Instant::now();

        if input.samples.is_empty() {
            return Err(Error::InvalidInput("no samples provided".into()));
        }
        if input.sample_rate == 0 {
            return Err(Error::InvalidInput("invalid sample rate".into()));
        }

        let snr_db = estimate_snr(input.samples);
        let duration = input.samples.len() as f64 / input.sample_rate as f64;

        let processed: Vec<f64> = if input.preprocessed {
            input.samples.to_vec()
        } else {
            preprocess(input.samples, input.sample_rate, &self.preprocess_cfg)
        };

        // Embeddings are computed on the unprocessed capture; the filter
        // chain only exists for the hand-crafted descriptors
        let features = match &self.embedder {
            Some(embedder) => match embedder.embed_samples(input.samples, input.sample_rate) {
                Ok(embedding) => {
                    log::info!("extracted embedding ({} dims)", embedding.len());
                    embedding
                }
                Err(err) => {
                    log::warn!(
                        "embedding failed, falling back to acoustic features: {}",
                        err
                    );
                    extract_feature_vector(&processed, input.sample_rate)?
                }
            },
            None => extract_feature_vector(&processed, input.sample_rate)?,
        };

        let mut predictions: Vec<Prediction> = vec![];
        let mut windows: Vec<WindowPrediction> = vec![];
        let mut sliding_resolved = false;

        // Sliding windows only apply to whole-capture feature extraction;
        // embeddings describe the entire file
        let use_sliding = duration >= self.window_cfg.min_duration_seconds
            && features.len() != EMBEDDING_DIM;
        if use_sliding {
            match self.classifier.predict_with_sliding_windows(
                &processed,
                input.sample_rate,
                self.window_cfg.window_seconds,
                self.window_cfg.overlap_seconds,
            ) {
                Ok((window_predictions, window_breakdown)) => {
                    let any_prediction = window_breakdown
                        .iter()
                        .any(|w| !w.predictions.is_empty());
                    if any_prediction {
                        predictions = window_predictions;
                        windows = window_breakdown;
                        sliding_resolved = true;
                        log::info!("applied sliding window analysis ({} windows)", windows.len());
                    }
                }
                Err(err) => {
                    log::warn!(
                        "sliding window analysis failed, falling back to single-pass: {}",
                        err
                    );
                }
            }
        }

        if !sliding_resolved {
            predictions = self.classifier.predict(&features)?;
        }

        let template_predictions = self
            .template_matcher
            .as_ref()
            .map(|matcher| matcher.predict(&features))
            .unwrap_or_default();
        if !template_predictions.is_empty() {
            predictions = merge_predictions(predictions, template_predictions.clone());
        }

        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        let adjusted_threshold = if snr_db == 0.0 {
            self.base_threshold
        } else {
            adaptive_threshold(self.base_threshold, snr_db)
        };
        let is_drone = is_drone_likely(&predictions, self.base_threshold, snr_db);
        let primary_type = predictions
            .first()
            .map(|p| p.kind.clone())
            .unwrap_or_default();

        if let Some(best) = predictions.first() {
            log::info!(
                "classification complete: is_drone={} label={} confidence={:.3} latency={:.1}ms",
                is_drone,
                best.label,
                best.confidence,
                latency_ms
            );
        } else {
            log::info!(
                "classification complete: is_drone=false (no predictions) latency={:.1}ms",
                latency_ms
            );
        }

        Ok(ClassificationSummary {
            predictions,
            is_drone,
            latency_ms,
            feature_vector: features,
            primary_type,
            snr_db,
            adjusted_threshold,
            windows,
            latitude: input.latitude,
            longitude: input.longitude,
            recording_path: input.recording_path,
            template_predictions,
        })
    }

    /// Build a prototype from decoded samples without adding it to the store.
    ///
    /// The same preprocessing used during live detection is applied, so
    /// prototypes and inference samples never drift apart. Features are kept
    /// raw; the store scales and normalises on add.
    pub fn build_prototype(
        &self,
        samples: &[f64],
        sample_rate: u32,
        request: &IngestRequest,
    ) -> Result<Prototype> {
        if request.label.is_empty() {
            return Err(Error::InvalidInput("label is required".into()));
        }

        let category = if request.category.is_empty() {
            "drone".to_string()
        } else {
            request.category.clone()
        };

        let features = match &self.embedder {
            // Embedding-width stores ingest through the service; a fallback
            // 19-dim vector could never be added to them
            Some(embedder) => embedder.embed_samples(samples, sample_rate)?,
            None => {
                let processed = preprocess(samples, sample_rate, &self.preprocess_cfg);
                extract_feature_vector(&processed, sample_rate)?
            }
        };

        Ok(Prototype {
            id: build_prototype_id(&request.label),
            label: request.label.clone(),
            category,
            description: request.description.clone(),
            source: request.source.clone(),
            features,
            metadata: request.metadata.clone(),
        })
    }

    /// Ingest an audio asset: build a prototype, add it to the store and
    /// persist the model file. Returns the stored prototype and fresh stats.
    pub fn ingest(
        &self,
        samples: &[f64],
        sample_rate: u32,
        request: &IngestRequest,
    ) -> Result<(Prototype, ModelStats)> {
        let proto = self.build_prototype(samples, sample_rate, request)?;
        let stored = self.store.add(proto)?;
        self.store.save()?;
        Ok((stored, self.store.stats()))
    }

    /// Ingest a WAV file from disk
    pub fn ingest_file<P: AsRef<Path>>(
        &self,
        path: P,
        request: &IngestRequest,
    ) -> Result<(Prototype, ModelStats)> {
        let audio = load_wav_mono(path)?;
        self.ingest(&audio.samples, audio.sample_rate, request)
    }
}

/// `proto_<sanitised-label>_<8-hex>`: lowercase alphanumerics, `_` and `-`
/// survive, spaces become underscores, everything else is dropped
fn build_prototype_id(label: &str) -> String {
    let safe: String = label
        .chars()
        .filter_map(|c| match c {
            'a'..='z' | '0'..='9' | '_' | '-' => Some(c),
            'A'..='Z' => Some(c.to_ascii_lowercase()),
            ' ' => Some('_'),
            _ => None,
        })
        .collect();

    let safe = if safe.is_empty() {
        "prototype".to_string()
    } else {
        safe
    };

    format!("proto_{}_{:08x}", safe, rand::random::<u32>())
}
