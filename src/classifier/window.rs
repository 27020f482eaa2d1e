//! Sliding-window analysis
//!
//! Long captures are classified window by window and the per-window
//! predictions aggregated per label, weighted by window confidence. Windows
//! are processed sequentially so aggregation stays deterministic.

use super::{sort_predictions, Classifier, Prediction, PrototypeScore, TOP_PROTOTYPE_LIMIT};
use crate::features::extract_feature_vector;
use crate::{Error, Result};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Predictions for one temporal window
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowPrediction {
    pub index: usize,
    /// Window start in seconds
    pub start: f64,
    /// Window end in seconds
    pub end: f64,
    /// Sorted by confidence
    pub predictions: Vec<Prediction>,
}

struct LabelAggregate {
    weight_sum: f64,
    dist_weighted_sum: f64,
    support: usize,
    category: String,
    metadata: Option<HashMap<String, String>>,
    top_prototypes: Vec<PrototypeScore>,
}

impl Classifier {
    /// Analyse raw samples with overlapping windows and consolidate the
    /// per-window predictions into one ranked list.
    ///
    /// Returns the aggregated predictions plus the per-window breakdown. An
    /// empty window list (input shorter than one usable window) signals the
    /// caller to fall back to single-pass classification.
    pub fn predict_with_sliding_windows(
        &self,
        samples: &[f64],
        sample_rate: u32,
        window_seconds: f64,
        overlap_seconds: f64,
    ) -> Result<(Vec<Prediction>, Vec<WindowPrediction>)> {
        if samples.is_empty() {
            return Err(Error::InvalidInput("audio sample is empty".into()));
        }
        if sample_rate == 0 {
            return Err(Error::InvalidInput("invalid sample rate".into()));
        }

        let window_seconds = if window_seconds <= 0.0 { 3.0 } else { window_seconds };
        let overlap_seconds = overlap_seconds.max(0.0);

        const MIN_WINDOW_SIZE: usize = 1024;
        let mut window_size = (window_seconds * sample_rate as f64) as usize;
        if window_size == 0 {
            window_size = sample_rate as usize * 3;
        }
        window_size = window_size.max(MIN_WINDOW_SIZE).min(samples.len());

        let overlap_samples = (overlap_seconds * sample_rate as f64) as usize;
        let mut hop_size = window_size.saturating_sub(overlap_samples);
        if hop_size == 0 {
            hop_size = (window_size / 2).max(1);
        }
        hop_size = hop_size.min(window_size);

        let mut aggregates: HashMap<String, LabelAggregate> = HashMap::new();
        let mut windows: Vec<WindowPrediction> = Vec::new();
        let mut total_weight = 0.0;

        let mut start = 0usize;
        while start < samples.len() {
            let end = (start + window_size).min(samples.len());
            let window_samples = &samples[start..end];
            if window_samples.len() < 256 {
                break;
            }

            let features = extract_feature_vector(window_samples, sample_rate)?;
            let window_preds = self.predict(&features)?;

            windows.push(WindowPrediction {
                index: windows.len(),
                start: start as f64 / sample_rate as f64,
                end: end as f64 / sample_rate as f64,
                predictions: window_preds.clone(),
            });

            for pred in &window_preds {
                if pred.confidence <= 0.0 {
                    continue;
                }

                let stats = aggregates
                    .entry(pred.label.clone())
                    .or_insert_with(|| LabelAggregate {
                        weight_sum: 0.0,
                        dist_weighted_sum: 0.0,
                        support: 0,
                        category: String::new(),
                        metadata: None,
                        top_prototypes: Vec::new(),
                    });

                stats.weight_sum += pred.confidence;
                stats.dist_weighted_sum += pred.average_distance * pred.confidence;
                stats.support += pred.support;
                if stats.category.is_empty() {
                    stats.category = pred.category.clone();
                }
                if stats.metadata.is_none() && !pred.metadata.is_empty() {
                    stats.metadata = Some(pred.metadata.clone());
                }
                stats.top_prototypes = merge_prototype_scores(
                    std::mem::take(&mut stats.top_prototypes),
                    &pred.top_prototypes,
                    TOP_PROTOTYPE_LIMIT,
                );

                total_weight += pred.confidence;
            }

            if end == samples.len() {
                break;
            }
            start += hop_size;
        }

        if windows.is_empty() {
            return Ok((vec![], vec![]));
        }
        if aggregates.is_empty() || total_weight == 0.0 {
            return Ok((vec![], windows));
        }

        let mut predictions: Vec<Prediction> = aggregates
            .into_iter()
            .map(|(label, stats)| {
                let average_distance = if stats.weight_sum > 0.0 {
                    stats.dist_weighted_sum / stats.weight_sum
                } else {
                    0.0
                };
                super::build_prediction(
                    &label,
                    stats.category,
                    stats.metadata.as_ref(),
                    stats.weight_sum / total_weight,
                    average_distance,
                    stats.support,
                    stats.top_prototypes,
                )
            })
            .collect();

        sort_predictions(&mut predictions);
        Ok((predictions, windows))
    }
}

/// Merge two top-prototype lists by id, keeping the higher-weight entry per
/// id, ordered by descending weight then ascending distance
fn merge_prototype_scores(
    existing: Vec<PrototypeScore>,
    additional: &[PrototypeScore],
    limit: usize,
) -> Vec<PrototypeScore> {
    if existing.is_empty() && additional.is_empty() {
        return vec![];
    }

    let mut combined: HashMap<String, PrototypeScore> = HashMap::with_capacity(existing.len());
    for score in existing {
        combined.insert(score.id.clone(), score);
    }
    for score in additional {
        let replace = match combined.get(&score.id) {
            Some(current) => {
                score.weight > current.weight
                    || ((score.weight - current.weight).abs() < 1e-9
                        && score.distance < current.distance)
            }
            None => true,
        };
        if replace {
            combined.insert(score.id.clone(), score.clone());
        }
    }

    let mut result: Vec<PrototypeScore> = combined.into_values().collect();
    result.sort_by(|a, b| {
        if (a.weight - b.weight).abs() > 1e-9 {
            return b.weight.partial_cmp(&a.weight).unwrap_or(Ordering::Equal);
        }
        match a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal) {
            Ordering::Equal => a.id.cmp(&b.id),
            other => other,
        }
    });

    if limit > 0 && result.len() > limit {
        result.truncate(limit);
    }
    result
}
