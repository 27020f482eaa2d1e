//! Template bank matching
//!
//! A parallel recognition channel for very small datasets: each template is a
//! single labelled reference vector, matched with thresholded cosine
//! similarity instead of k-NN voting. Template predictions are merged into
//! the canonical list, keeping the higher-confidence entry per label.

use super::{cosine_similarity, sort_predictions, Prediction, FEATURE_WEIGHTS};
use crate::audio::{load_wav_mono, preprocess};
use crate::config::PreprocessConfig;
use crate::features::{extract_feature_vector, l2_normalize_in_place};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// A single reference embedding derived from a labelled audio sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub label: String,
    #[serde(default)]
    pub source: String,
    pub features: Vec<f64>,
}

/// Cosine-similarity lookups against a small template bank
pub struct TemplateMatcher {
    templates: Vec<Template>,
    threshold: f64,
}

impl TemplateMatcher {
    /// Load template embeddings from disk.
    ///
    /// Every template must match `expected_dim` (when non-zero); stored
    /// vectors are L2-normalised in place. The confidence threshold is
    /// clamped to [0, 1].
    pub fn load<P: AsRef<Path>>(path: P, threshold: f64, expected_dim: usize) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .map_err(|e| Error::Template(format!("failed to read template file: {}", e)))?;

        let mut templates: Vec<Template> = serde_json::from_slice(&data)
            .map_err(|e| Error::Template(format!("failed to parse template file: {}", e)))?;

        if templates.is_empty() {
            return Err(Error::Template(format!(
                "template file {} contained no entries",
                path.display()
            )));
        }

        let expected = if expected_dim != 0 {
            expected_dim
        } else {
            templates[0].features.len()
        };
        for template in &mut templates {
            if template.features.len() != expected {
                return Err(Error::Template(format!(
                    "template {} has {} features, expected {}",
                    template.label,
                    template.features.len(),
                    expected
                )));
            }
            l2_normalize_in_place(&mut template.features);
        }

        Ok(Self {
            templates,
            threshold: threshold.clamp(0.0, 1.0),
        })
    }

    /// Build a matcher from in-memory templates (tests and tools)
    pub fn from_templates(mut templates: Vec<Template>, threshold: f64) -> Self {
        for template in &mut templates {
            l2_normalize_in_place(&mut template.features);
        }
        Self {
            templates,
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    /// Number of loaded templates
    pub fn count(&self) -> usize {
        self.templates.len()
    }

    /// Ranked predictions from cosine similarity against every template.
    ///
    /// Similarity in [-1, 1] maps to confidence `(s + 1) / 2`; entries below
    /// the configured threshold are dropped.
    pub fn predict(&self, features: &[f64]) -> Vec<Prediction> {
        if features.is_empty() {
            return vec![];
        }

        let mut results: Vec<Prediction> = Vec::with_capacity(self.templates.len());
        for template in &self.templates {
            let similarity = cosine_similarity(features, &template.features, &FEATURE_WEIGHTS);
            let confidence = ((similarity + 1.0) / 2.0).clamp(0.0, 1.0);
            if self.threshold > 0.0 && confidence < self.threshold {
                continue;
            }

            results.push(Prediction {
                label: template.label.clone(),
                category: "template".into(),
                kind: template.label.clone(),
                description: format!("template:{}", template.source),
                confidence,
                average_distance: 1.0 - similarity,
                support: 1,
                top_prototypes: vec![],
                metadata: HashMap::new(),
                threat_assessment: None,
            });
        }

        sort_predictions(&mut results);
        results
    }
}

/// Merge template predictions into the canonical list, keeping the
/// higher-confidence entry when labels overlap (case-insensitively)
pub fn merge_predictions(base: Vec<Prediction>, additions: Vec<Prediction>) -> Vec<Prediction> {
    if additions.is_empty() {
        return base;
    }

    let mut index: HashMap<String, Prediction> = HashMap::with_capacity(base.len());
    for pred in base {
        index.insert(pred.label.to_lowercase(), pred);
    }

    for pred in additions {
        let key = pred.label.to_lowercase();
        match index.get(&key) {
            Some(existing) if pred.confidence <= existing.confidence => {}
            _ => {
                index.insert(key, pred);
            }
        }
    }

    let mut merged: Vec<Prediction> = index.into_values().collect();
    sort_predictions(&mut merged);
    merged
}

/// Ingest every WAV file in a directory and emit one template per file,
/// labelled by file stem. Features are stored raw; the matcher normalises
/// them at load.
pub fn build_templates_from_dir<P: AsRef<Path>>(dir: P) -> Result<Vec<Template>> {
    let mut paths: Vec<_> = std::fs::read_dir(dir.as_ref())?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("wav"))
                    .unwrap_or(false)
        })
        .collect();
    paths.sort();

    let preprocess_cfg = PreprocessConfig::default();
    let mut templates = Vec::with_capacity(paths.len());
    for path in paths {
        let label = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("template")
            .to_string();
        let audio = load_wav_mono(&path)?;
        let processed = preprocess(&audio.samples, audio.sample_rate, &preprocess_cfg);
        let features = extract_feature_vector(&processed, audio.sample_rate)?;

        templates.push(Template {
            label,
            source: path
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string(),
            features,
        });
    }

    if templates.is_empty() {
        return Err(Error::Template(format!(
            "no WAV files found in {}",
            dir.as_ref().display()
        )));
    }

    Ok(templates)
}

/// Write a template bank to disk as JSON
pub fn save_templates<P: AsRef<Path>>(path: P, templates: &[Template]) -> Result<()> {
    if templates.is_empty() {
        return Err(Error::Template("no templates to save".into()));
    }

    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let data = serde_json::to_vec_pretty(templates)
        .map_err(|e| Error::Template(format!("failed to serialize templates: {}", e)))?;
    std::fs::write(path, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::build_prediction;

    fn template(label: &str, features: Vec<f64>) -> Template {
        Template {
            label: label.into(),
            source: format!("{}.wav", label),
            features,
        }
    }

    #[test]
    fn test_predict_thresholds_low_similarity() {
        let matcher = TemplateMatcher::from_templates(
            vec![
                template("quad", vec![1.0, 0.0, 0.0]),
                template("heli", vec![0.0, 1.0, 0.0]),
            ],
            0.75,
        );

        // Aligned with "quad": similarity 1 -> confidence 1; orthogonal to
        // "heli": similarity 0 -> confidence 0.5, below threshold
        let predictions = matcher.predict(&[1.0, 0.0, 0.0]);
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].label, "quad");
        assert!((predictions[0].confidence - 1.0).abs() < 1e-9);
        assert_eq!(predictions[0].category, "template");
        assert_eq!(predictions[0].support, 1);
    }

    #[test]
    fn test_predict_empty_query() {
        let matcher = TemplateMatcher::from_templates(vec![template("x", vec![1.0, 0.0])], 0.5);
        assert!(matcher.predict(&[]).is_empty());
    }

    #[test]
    fn test_merge_keeps_higher_confidence() {
        let base = vec![build_prediction(
            "drone_x",
            "drone".into(),
            None,
            0.52,
            0.3,
            2,
            vec![],
        )];
        let additions = vec![build_prediction(
            "Drone_X",
            "template".into(),
            None,
            0.81,
            0.1,
            1,
            vec![],
        )];

        let merged = merge_predictions(base, additions);
        assert_eq!(merged.len(), 1);
        assert!((merged[0].confidence - 0.81).abs() < 1e-9);
        assert_eq!(merged[0].category, "template");
    }

    #[test]
    fn test_merge_empty_additions_identity() {
        let base = vec![build_prediction(
            "quad",
            "drone".into(),
            None,
            0.6,
            0.2,
            1,
            vec![],
        )];
        let merged = merge_predictions(base.clone(), vec![]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].label, "quad");
    }

    #[test]
    fn test_load_rejects_dim_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("templates.json");
        let bank = vec![template("quad", vec![1.0, 0.0, 0.0])];
        std::fs::write(&path, serde_json::to_vec(&bank).unwrap()).unwrap();

        assert!(TemplateMatcher::load(&path, 0.75, 19).is_err());
        let matcher = TemplateMatcher::load(&path, 0.75, 3).unwrap();
        assert_eq!(matcher.count(), 1);
    }

    #[test]
    fn test_load_rejects_empty_bank() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("templates.json");
        std::fs::write(&path, b"[]").unwrap();
        assert!(TemplateMatcher::load(&path, 0.75, 19).is_err());
    }

    #[test]
    fn test_templates_normalised_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("templates.json");
        let bank = vec![template("quad", vec![3.0, 4.0])];
        std::fs::write(&path, serde_json::to_vec(&bank).unwrap()).unwrap();

        let matcher = TemplateMatcher::load(&path, 0.0, 2).unwrap();
        // Matching direction yields similarity 1 regardless of magnitude
        let predictions = matcher.predict(&[30.0, 40.0]);
        assert!((predictions[0].confidence - 1.0).abs() < 1e-9);
        assert!(predictions[0].average_distance.abs() < 1e-9);
    }
}
