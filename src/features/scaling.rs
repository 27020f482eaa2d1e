//! Per-dimension feature scaling
//!
//! The 19 descriptors span very different dynamic ranges even after their
//! individual normalisation, and whichever dimension carries the largest
//! magnitude dominates the vector once it is L2-normalised for cosine
//! similarity. The scaler standardises every dimension against the prototype
//! population before normalisation so that all of them contribute to the
//! distance metric. It is fitted on the raw (pre-L2) prototype vectors and
//! must be applied identically to queries.

use crate::store::Prototype;
use crate::{Error, Result};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

/// Z-score standardiser: per-dimension mean and standard deviation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureScaler {
    /// Per-dimension mean over the fitted prototype set
    pub mean: Vec<f64>,
    /// Per-dimension standard deviation; constant dimensions hold 1.0
    pub stddev: Vec<f64>,
}

impl FeatureScaler {
    /// Fit scaling parameters from a prototype set.
    ///
    /// Dimensions whose standard deviation falls below 1e-10 are assigned a
    /// stddev of 1.0 so constant features pass through unchanged.
    pub fn fit(prototypes: &[Prototype]) -> Result<Self> {
        if prototypes.is_empty() {
            return Err(Error::InvalidInput("no prototypes provided".into()));
        }
        let dim = prototypes[0].features.len();
        if dim == 0 {
            return Err(Error::InvalidInput("prototypes have no features".into()));
        }

        let mut matrix = Array2::<f64>::zeros((prototypes.len(), dim));
        for (row, proto) in prototypes.iter().enumerate() {
            if proto.features.len() != dim {
                return Err(Error::DimensionMismatch {
                    expected: dim,
                    actual: proto.features.len(),
                });
            }
            for (col, &value) in proto.features.iter().enumerate() {
                matrix[[row, col]] = value;
            }
        }

        let mean = matrix
            .mean_axis(Axis(0))
            .ok_or_else(|| Error::InvalidInput("no prototypes provided".into()))?;
        let stddev = matrix
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s < 1e-10 { 1.0 } else { s });

        Ok(Self {
            mean: mean.to_vec(),
            stddev: stddev.to_vec(),
        })
    }

    /// Number of dimensions the scaler was fitted on
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Apply z-score standardisation to a feature vector.
    ///
    /// A vector of mismatched dimensionality is returned unchanged; the
    /// mismatch is logged rather than treated as fatal so a live predict path
    /// keeps working against a store that was swapped underneath it.
    pub fn transform(&self, features: &[f64]) -> Vec<f64> {
        if features.len() != self.mean.len() {
            log::warn!(
                "scaler fitted on {} dims given {}-dim vector; bypassing scaling",
                self.mean.len(),
                features.len()
            );
            return features.to_vec();
        }

        features
            .iter()
            .enumerate()
            .map(|(i, &v)| (v - self.mean[i]) / self.stddev[i])
            .collect()
    }
}

/// Per-dimension distribution summary over a prototype set
#[derive(Debug, Clone, Serialize)]
pub struct FeatureScaleReport {
    pub names: Vec<String>,
    pub min: Vec<f64>,
    pub max: Vec<f64>,
    pub mean: Vec<f64>,
    pub stddev: Vec<f64>,
}

impl FeatureScaleReport {
    /// Summarise the scale of every feature dimension across prototypes
    pub fn analyze(prototypes: &[Prototype]) -> Self {
        if prototypes.is_empty() {
            return Self {
                names: vec![],
                min: vec![],
                max: vec![],
                mean: vec![],
                stddev: vec![],
            };
        }

        let dim = prototypes[0].features.len();
        let mut min = vec![f64::MAX; dim];
        let mut max = vec![f64::MIN; dim];
        let mut mean = vec![0.0; dim];

        for proto in prototypes {
            for (i, &v) in proto.features.iter().take(dim).enumerate() {
                min[i] = min[i].min(v);
                max[i] = max[i].max(v);
                mean[i] += v;
            }
        }
        for m in mean.iter_mut() {
            *m /= prototypes.len() as f64;
        }

        let mut stddev = vec![0.0; dim];
        for proto in prototypes {
            for (i, &v) in proto.features.iter().take(dim).enumerate() {
                let diff = v - mean[i];
                stddev[i] += diff * diff;
            }
        }
        for s in stddev.iter_mut() {
            *s = (*s / prototypes.len() as f64).sqrt();
        }

        let names = (0..dim)
            .map(|i| {
                crate::features::FEATURE_NAMES
                    .get(i)
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| format!("dim_{}", i))
            })
            .collect();

        Self {
            names,
            min,
            max,
            mean,
            stddev,
        }
    }

    /// Flag dimensions likely to distort the L2-normalised vector
    pub fn issues(&self) -> Vec<String> {
        let mut issues = Vec::new();

        // High coefficient of variation marks unstable dimensions
        for (i, name) in self.names.iter().enumerate() {
            if self.mean[i].abs() > 1e-9 {
                let coeff_var = self.stddev[i] / self.mean[i].abs();
                if coeff_var > 2.0 {
                    issues.push(format!(
                        "feature '{}' has high coefficient of variation ({:.2})",
                        name, coeff_var
                    ));
                }
            }
        }

        // Dimensions with outsized squared-mean contribution dominate the
        // normalised vector
        let total_squared_mean: f64 = self.mean.iter().map(|m| m * m).sum();
        if total_squared_mean > 0.0 {
            for (i, name) in self.names.iter().enumerate() {
                let contribution = self.mean[i] * self.mean[i] / total_squared_mean;
                if contribution > 0.2 {
                    issues.push(format!(
                        "feature '{}' contributes {:.1}% of normalised vector magnitude",
                        name,
                        contribution * 100.0
                    ));
                }
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Prototype;

    fn proto(label: &str, features: Vec<f64>) -> Prototype {
        Prototype {
            id: format!("proto_{}", label),
            label: label.into(),
            category: "drone".into(),
            description: None,
            source: None,
            features,
            metadata: Default::default(),
        }
    }

    #[test]
    fn test_fit_mean_and_stddev() {
        let protos = vec![
            proto("a", vec![1.0, 10.0]),
            proto("b", vec![3.0, 10.0]),
        ];
        let scaler = FeatureScaler::fit(&protos).unwrap();
        assert_eq!(scaler.mean, vec![2.0, 10.0]);
        assert_eq!(scaler.stddev[0], 1.0);
        // Constant second dimension gets the neutral stddev
        assert_eq!(scaler.stddev[1], 1.0);
    }

    #[test]
    fn test_fit_rejects_empty() {
        assert!(FeatureScaler::fit(&[]).is_err());
    }

    #[test]
    fn test_fit_rejects_ragged_dims() {
        let protos = vec![proto("a", vec![1.0, 2.0]), proto("b", vec![1.0])];
        assert!(FeatureScaler::fit(&protos).is_err());
    }

    #[test]
    fn test_transform_standardises() {
        let protos = vec![
            proto("a", vec![0.0, 4.0]),
            proto("b", vec![2.0, 8.0]),
        ];
        let scaler = FeatureScaler::fit(&protos).unwrap();
        let scaled = scaler.transform(&[0.0, 4.0]);
        assert!((scaled[0] + 1.0).abs() < 1e-12);
        assert!((scaled[1] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_transform_mismatch_passthrough() {
        let protos = vec![proto("a", vec![1.0, 2.0]), proto("b", vec![3.0, 4.0])];
        let scaler = FeatureScaler::fit(&protos).unwrap();
        let input = vec![1.0, 2.0, 3.0];
        assert_eq!(scaler.transform(&input), input);
    }

    #[test]
    fn test_report_flags_dominant_dimension() {
        let protos = vec![
            proto("a", vec![100.0, 0.1, 0.1]),
            proto("b", vec![120.0, 0.2, 0.1]),
        ];
        let report = FeatureScaleReport::analyze(&protos);
        let issues = report.issues();
        assert!(
            issues.iter().any(|i| i.contains("Energy (RMS)")),
            "expected dominance warning, got: {:?}",
            issues
        );
    }
}
