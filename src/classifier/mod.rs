//! Prototype-based k-nearest-neighbour classifier
//!
//! Classification runs entirely on a snapshot of the prototype store: the
//! query is scaled and L2-normalised the same way the residents were, cosine
//! distance ranks every prototype, and the k nearest vote with weight
//! `1 / (distance + epsilon)`. Per-label weight sums become calibrated
//! confidences that always total 1 across the returned predictions.

pub mod template;
pub mod threat;
pub mod window;

use crate::audio::adaptive_threshold;
use crate::features::l2_normalize_in_place;
use crate::store::{PrototypeStore, StoreSnapshot};
use crate::{Error, Result, EMBEDDING_DIM};
use lazy_static::lazy_static;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use threat::ThreatAssessment;

lazy_static! {
    /// Per-dimension similarity weights, sized for the largest supported
    /// vector. Equal weighting across all dimensions; initialised once and
    /// read-only thereafter.
    pub static ref FEATURE_WEIGHTS: Vec<f64> = vec![1.0; EMBEDDING_DIM];
}

/// Similarity between the analysed audio and one stored prototype
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrototypeScore {
    pub id: String,
    pub distance: f64,
    pub weight: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Per-label aggregation across the nearest prototypes
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub label: String,
    pub category: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub confidence: f64,
    pub average_distance: f64,
    pub support: usize,
    pub top_prototypes: Vec<PrototypeScore>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threat_assessment: Option<ThreatAssessment>,
}

/// Maximum top-prototype entries carried per prediction
pub(crate) const TOP_PROTOTYPE_LIMIT: usize = 5;

/// k-nearest prototype lookups in the feature space
pub struct Classifier {
    store: Arc<PrototypeStore>,
}

impl Classifier {
    /// Wrap a prototype store
    pub fn new(store: Arc<PrototypeStore>) -> Self {
        Self { store }
    }

    /// The underlying prototype store
    pub fn store(&self) -> &Arc<PrototypeStore> {
        &self.store
    }

    /// Find the best prototype matches for a feature vector.
    ///
    /// Returns one prediction per label found among the k nearest
    /// prototypes, sorted by descending confidence with ties broken by
    /// ascending average distance. An empty store yields an empty list.
    pub fn predict(&self, features: &[f64]) -> Result<Vec<Prediction>> {
        if features.is_empty() {
            return Err(Error::InvalidInput("feature vector is empty".into()));
        }

        let snapshot = self.store.snapshot();
        if snapshot.prototypes.is_empty() {
            return Ok(vec![]);
        }

        let expected = snapshot.prototypes[0].features.len();
        if features.len() != expected {
            return Err(Error::DimensionMismatch {
                expected,
                actual: features.len(),
            });
        }

        let query = prepare_query(features, &snapshot);
        Ok(rank_and_aggregate(&query, &snapshot))
    }
}

/// Scale and L2-normalise a query the same way store residents were.
///
/// Embedding vectors skip both steps; cosine similarity is norm-invariant so
/// they can be used as-is.
fn prepare_query(features: &[f64], snapshot: &StoreSnapshot) -> Vec<f64> {
    match &snapshot.scaler {
        Some(scaler) if features.len() == scaler.dim() && features.len() != EMBEDDING_DIM => {
            let mut query = scaler.transform(features);
            l2_normalize_in_place(&mut query);
            log::debug!("applied scaling to {}-dim query", features.len());
            query
        }
        Some(scaler) => {
            log::warn!(
                "scaler fitted on {} dims given {}-dim query; bypassing scaling",
                scaler.dim(),
                features.len()
            );
            features.to_vec()
        }
        None => features.to_vec(),
    }
}

fn rank_and_aggregate(query: &[f64], snapshot: &StoreSnapshot) -> Vec<Prediction> {
    let prototypes = &snapshot.prototypes;
    let k = snapshot.k.min(prototypes.len()).max(1);

    // Cosine similarity lands in [-1, 1]; distance = 1 - similarity
    let mut distances: Vec<(usize, f64)> = prototypes
        .iter()
        .enumerate()
        .map(|(i, proto)| {
            let similarity = cosine_similarity(query, &proto.features, &FEATURE_WEIGHTS);
            (i, 1.0 - similarity)
        })
        .collect();
    distances.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

    struct LabelScore {
        weight_sum: f64,
        dist_sum: f64,
        count: usize,
        prototypes: Vec<PrototypeScore>,
    }

    let mut label_scores: HashMap<&str, LabelScore> = HashMap::new();
    let mut total_weight = 0.0;

    for &(index, distance) in distances.iter().take(k) {
        let proto = &prototypes[index];
        let weight = 1.0 / (distance + 1e-9);

        let stats = label_scores
            .entry(proto.label.as_str())
            .or_insert_with(|| LabelScore {
                weight_sum: 0.0,
                dist_sum: 0.0,
                count: 0,
                prototypes: Vec::new(),
            });
        stats.weight_sum += weight;
        stats.dist_sum += distance;
        stats.count += 1;
        if stats.prototypes.len() < TOP_PROTOTYPE_LIMIT {
            stats.prototypes.push(PrototypeScore {
                id: proto.id.clone(),
                distance,
                weight,
                source: proto.source.clone(),
            });
        }

        total_weight += weight;
    }

    if total_weight == 0.0 {
        return vec![];
    }

    let mut predictions: Vec<Prediction> = label_scores
        .into_iter()
        .map(|(label, stats)| {
            let label_meta = snapshot.label_metadata.get(label);
            let category = snapshot
                .label_category
                .get(label)
                .cloned()
                .unwrap_or_default();

            build_prediction(
                label,
                category,
                label_meta,
                stats.weight_sum / total_weight,
                if stats.count > 0 {
                    stats.dist_sum / stats.count as f64
                } else {
                    0.0
                },
                stats.count,
                stats.prototypes,
            )
        })
        .collect();

    sort_predictions(&mut predictions);
    predictions
}

pub(crate) fn build_prediction(
    label: &str,
    category: String,
    label_meta: Option<&HashMap<String, String>>,
    confidence: f64,
    average_distance: f64,
    support: usize,
    top_prototypes: Vec<PrototypeScore>,
) -> Prediction {
    let metadata = label_meta.cloned().unwrap_or_default();
    let description = metadata.get("description").cloned().unwrap_or_default();

    let mut entry = Prediction {
        label: label.to_string(),
        category: category.clone(),
        kind: derive_prediction_kind(label, &category, &metadata),
        description,
        confidence,
        average_distance,
        support,
        top_prototypes,
        metadata,
        threat_assessment: None,
    };

    if !entry.metadata.is_empty() && category.eq_ignore_ascii_case("drone") {
        let assessment = ThreatAssessment::from_metadata(&entry.metadata);
        if assessment.threat_level.is_some() || assessment.risk_category.is_some() {
            entry.threat_assessment = Some(assessment);
        }
    }

    entry
}

/// Pick a human-facing type string: metadata `model`, `type`, `description`,
/// then `label (category)`
fn derive_prediction_kind(
    label: &str,
    category: &str,
    metadata: &HashMap<String, String>,
) -> String {
    for key in ["model", "type", "description"] {
        if let Some(value) = metadata.get(key) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }

    if !category.is_empty() {
        format!("{} ({})", label, category)
    } else {
        label.to_string()
    }
}

/// Sort by descending confidence (1e-9 tolerance), ties by ascending average
/// distance, then label for a fully deterministic ordering
pub(crate) fn sort_predictions(predictions: &mut [Prediction]) {
    predictions.sort_by(|a, b| {
        if (a.confidence - b.confidence).abs() > 1e-9 {
            return b
                .confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal);
        }
        match a
            .average_distance
            .partial_cmp(&b.average_distance)
            .unwrap_or(Ordering::Equal)
        {
            Ordering::Equal => a.label.cmp(&b.label),
            other => other,
        }
    });
}

/// Interpret the prediction list: is the analysed audio likely a drone?
///
/// The base threshold is adjusted for SNR (an SNR of exactly 0.0 means "no
/// estimate" and leaves the base threshold in place). A top prediction
/// categorised as noise always answers no.
pub fn is_drone_likely(predictions: &[Prediction], base_threshold: f64, snr_db: f64) -> bool {
    let Some(best) = predictions.first() else {
        return false;
    };

    if best.category.eq_ignore_ascii_case("noise") {
        return false;
    }

    let threshold = if snr_db == 0.0 {
        base_threshold
    } else {
        adaptive_threshold(base_threshold, snr_db)
    };

    best.confidence >= threshold
}

/// Weighted cosine similarity between two vectors; higher is more similar
pub fn cosine_similarity(a: &[f64], b: &[f64], weights: &[f64]) -> f64 {
    let limit = a.len().min(b.len());

    let mut dot_product = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;

    for i in 0..limit {
        let weight = weights.get(i).copied().unwrap_or(1.0);
        let wa = a[i] * weight;
        let wb = b[i] * weight;
        dot_product += wa * wb;
        norm_a += wa * wa;
        norm_b += wb * wb;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::l2_normalize;
    use crate::store::Prototype;

    fn basis_vector(peaks: &[(usize, f64)]) -> Vec<f64> {
        let mut vec = vec![0.0; 19];
        for &(idx, value) in peaks {
            vec[idx] = value;
        }
        l2_normalize(&vec)
    }

    fn synthetic_prototype(label: &str, id: &str, peaks: &[(usize, f64)]) -> Prototype {
        Prototype {
            id: id.into(),
            label: label.into(),
            category: "drone".into(),
            description: None,
            source: None,
            features: basis_vector(peaks),
            metadata: HashMap::new(),
        }
    }

    fn classifier_without_scaler(protos: Vec<Prototype>, k: usize) -> Classifier {
        // from_prototypes fits no scaler, so the synthetic basis vectors stay
        // exactly as constructed
        Classifier::new(Arc::new(
            PrototypeStore::from_prototypes(protos, k).unwrap(),
        ))
    }

    #[test]
    fn test_cosine_similarity_basics() {
        let a = vec![1.0, 0.0];
        let b = vec![1.0, 0.0];
        let c = vec![0.0, 1.0];
        let w = vec![1.0; 2];
        assert!((cosine_similarity(&a, &b, &w) - 1.0).abs() < 1e-12);
        assert!(cosine_similarity(&a, &c, &w).abs() < 1e-12);
        assert_eq!(cosine_similarity(&a, &[0.0, 0.0], &w), 0.0);
    }

    #[test]
    fn test_predict_majority_label_wins() {
        let protos = vec![
            synthetic_prototype("alpha", "alpha_1", &[(0, 1.0)]),
            synthetic_prototype("alpha", "alpha_2", &[(0, 0.8), (1, 0.2)]),
            synthetic_prototype("beta", "beta_1", &[(8, 1.0)]),
        ];
        let classifier = classifier_without_scaler(protos, 3);

        let predictions = classifier.predict(&basis_vector(&[(0, 1.0)])).unwrap();
        assert!(!predictions.is_empty());
        assert_eq!(predictions[0].label, "alpha");
        assert_eq!(predictions[0].support, 2);
        assert!(predictions[0].confidence > 0.5);
    }

    #[test]
    fn test_predict_responds_to_feature_shift() {
        let protos = vec![
            synthetic_prototype("alpha", "alpha_1", &[(0, 1.0)]),
            synthetic_prototype("alpha", "alpha_2", &[(0, 0.8), (1, 0.2)]),
            synthetic_prototype("beta", "beta_1", &[(10, 1.0)]),
        ];
        let classifier = classifier_without_scaler(protos, 3);

        let predictions = classifier.predict(&basis_vector(&[(10, 1.0)])).unwrap();
        assert_eq!(predictions[0].label, "beta");
        assert!(
            predictions[0].confidence >= 0.9,
            "confidence {}",
            predictions[0].confidence
        );
    }

    #[test]
    fn test_predict_empty_store() {
        let classifier =
            Classifier::new(Arc::new(PrototypeStore::from_prototypes(vec![], 3).unwrap()));
        let predictions = classifier.predict(&[0.1, 0.2, 0.3]).unwrap();
        assert!(predictions.is_empty());
        assert!(!is_drone_likely(&predictions, 0.55, 0.0));
    }

    #[test]
    fn test_predict_rejects_empty_query() {
        let classifier =
            Classifier::new(Arc::new(PrototypeStore::from_prototypes(vec![], 3).unwrap()));
        assert!(classifier.predict(&[]).is_err());
    }

    #[test]
    fn test_predict_rejects_dimension_mismatch() {
        let protos = vec![synthetic_prototype("alpha", "alpha_1", &[(0, 1.0)])];
        let classifier = classifier_without_scaler(protos, 1);
        let err = classifier.predict(&[0.1, 0.2]).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
    }

    #[test]
    fn test_confidences_sum_to_one() {
        let protos = vec![
            synthetic_prototype("alpha", "a1", &[(0, 1.0)]),
            synthetic_prototype("beta", "b1", &[(3, 1.0)]),
            synthetic_prototype("gamma", "c1", &[(7, 1.0)]),
        ];
        let classifier = classifier_without_scaler(protos, 3);

        let predictions = classifier.predict(&basis_vector(&[(0, 0.7), (3, 0.3)])).unwrap();
        let total: f64 = predictions.iter().map(|p| p.confidence).sum();
        assert!((total - 1.0).abs() < 1e-6, "total confidence {}", total);
    }

    #[test]
    fn test_predictions_sorted() {
        let protos = vec![
            synthetic_prototype("alpha", "a1", &[(0, 1.0)]),
            synthetic_prototype("beta", "b1", &[(3, 1.0)]),
            synthetic_prototype("gamma", "c1", &[(7, 1.0)]),
        ];
        let classifier = classifier_without_scaler(protos, 3);

        let predictions = classifier.predict(&basis_vector(&[(0, 0.9), (3, 0.4)])).unwrap();
        for pair in predictions.windows(2) {
            assert!(
                pair[0].confidence >= pair[1].confidence - 1e-9,
                "predictions out of order"
            );
        }
    }

    #[test]
    fn test_single_prototype_exact_match() {
        let protos = vec![synthetic_prototype("alpha", "a1", &[(0, 1.0), (5, 0.5)])];
        let classifier = classifier_without_scaler(protos, 5);

        let predictions = classifier
            .predict(&basis_vector(&[(0, 1.0), (5, 0.5)]))
            .unwrap();
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0].confidence, 1.0);
        assert!(predictions[0].average_distance.abs() < 1e-9);
    }

    #[test]
    fn test_is_drone_likely_noise_top() {
        let mut predictions = vec![
            build_prediction("hum", "noise".into(), None, 0.6, 0.1, 1, vec![]),
            build_prediction("quad", "drone".into(), None, 0.3, 0.2, 1, vec![]),
        ];
        sort_predictions(&mut predictions);
        assert!(!is_drone_likely(&predictions, 0.55, 0.0));
    }

    #[test]
    fn test_is_drone_likely_snr_adjusted() {
        let predictions = vec![build_prediction(
            "quad",
            "drone".into(),
            None,
            0.64,
            0.1,
            2,
            vec![],
        )];
        // 5 dB SNR pushes the threshold to 0.70
        assert!(!is_drone_likely(&predictions, 0.55, 5.0));
        // 35 dB leaves the base threshold
        assert!(is_drone_likely(&predictions, 0.55, 35.0));
    }

    #[test]
    fn test_derive_prediction_kind_fallbacks() {
        let mut meta = HashMap::new();
        assert_eq!(derive_prediction_kind("x", "drone", &meta), "x (drone)");
        assert_eq!(derive_prediction_kind("x", "", &meta), "x");

        meta.insert("type".into(), "quadcopter".into());
        assert_eq!(derive_prediction_kind("x", "drone", &meta), "quadcopter");

        meta.insert("model".into(), "DJI Mavic".into());
        assert_eq!(derive_prediction_kind("x", "drone", &meta), "DJI Mavic");
    }

    #[test]
    fn test_threat_assessment_attached_for_drone_metadata() {
        let protos = vec![{
            let mut proto = synthetic_prototype("quad", "q1", &[(0, 1.0)]);
            proto
                .metadata
                .insert("threat_level".into(), "high".into());
            proto
                .metadata
                .insert("max_speed_ms".into(), "25.0".into());
            proto
        }];
        let classifier = classifier_without_scaler(protos, 1);

        let predictions = classifier.predict(&basis_vector(&[(0, 1.0)])).unwrap();
        let assessment = predictions[0].threat_assessment.as_ref().unwrap();
        assert_eq!(assessment.threat_level.as_deref(), Some("high"));
        assert_eq!(assessment.max_speed_ms, Some(25.0));
    }
}
