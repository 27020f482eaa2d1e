//! Prototype store
//!
//! Holds the labelled reference vectors the classifier matches against.
//! Prototypes are loaded from a JSON file (with a `.example` sibling as a
//! read-only seed when the primary file is missing), validated for uniform
//! dimensionality, and kept resident in scaled + L2-normalised form next to
//! their raw features. The raw form is what gets persisted, so a save/load
//! cycle reproduces the store exactly.
//!
//! Readers and writers share one RwLock: predict paths hold the read lock
//! only while copying a snapshot, ingest holds the write lock only around
//! the append and label-map updates.

use crate::features::scaling::{FeatureScaleReport, FeatureScaler};
use crate::features::l2_normalize;
use crate::{Error, Result, EMBEDDING_DIM};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// A labelled reference feature vector with provenance metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prototype {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub features: Vec<f64>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

/// Resident (scaled + L2-normalised) view of one prototype
#[derive(Debug, Clone)]
pub struct ResidentPrototype {
    pub id: String,
    pub label: String,
    pub category: String,
    pub source: Option<String>,
    /// Scaled and unit-norm feature vector used for distance math
    pub features: Vec<f64>,
}

/// Summary metadata about the loaded prototype set
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelStats {
    pub prototype_count: usize,
    pub label_count: usize,
    pub labels: Vec<ModelLabelStat>,
    pub using_example: bool,
}

/// Prototype density per label
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelLabelStat {
    pub label: String,
    pub category: String,
    pub prototypes: usize,
}

/// Owned copy of the store state taken under the read lock
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    pub k: usize,
    pub prototypes: Vec<ResidentPrototype>,
    pub scaler: Option<FeatureScaler>,
    pub label_category: HashMap<String, String>,
    pub label_metadata: HashMap<String, HashMap<String, String>>,
    pub using_example: bool,
}

struct StoredRecord {
    raw: Prototype,
    resident: Vec<f64>,
}

struct StoreInner {
    records: Vec<StoredRecord>,
    scaler: Option<FeatureScaler>,
    expected_dim: usize,
    k: usize,
    using_example: bool,
    label_category: HashMap<String, String>,
    label_metadata: HashMap<String, HashMap<String, String>>,
}

/// Thread-safe collection of prototypes plus the scaler fitted on them
pub struct PrototypeStore {
    inner: RwLock<StoreInner>,
    model_path: PathBuf,
}

impl PrototypeStore {
    /// Load prototypes from `path`, falling back to the `.example` sibling.
    ///
    /// `requested_k` is adapted to the loaded set: capped at the prototype
    /// count, and reduced to 3 when fewer than 10 prototypes are available.
    /// A feature scaler is fitted unless the store holds 2048-dim embeddings.
    pub fn load<P: AsRef<Path>>(path: P, requested_k: usize) -> Result<Self> {
        if requested_k == 0 {
            return Err(Error::InvalidInput(format!(
                "invalid neighbour count: {}",
                requested_k
            )));
        }

        let primary = path.as_ref().to_path_buf();
        let (data, using_example) = match std::fs::read(&primary) {
            Ok(data) => (data, false),
            Err(_) => {
                let fallback = example_sibling(&primary);
                match std::fs::read(&fallback) {
                    Ok(data) => {
                        log::warn!(
                            "falling back to example prototypes: {}",
                            fallback.display()
                        );
                        (data, true)
                    }
                    Err(err) => {
                        return Err(Error::StoreUnavailable(format!(
                            "failed to load prototypes ({}): {}",
                            primary.display(),
                            err
                        )))
                    }
                }
            }
        };

        let prototypes: Vec<Prototype> = serde_json::from_slice(&data)
            .map_err(|e| Error::StoreCorrupt(format!("unable to parse prototypes: {}", e)))?;

        if prototypes.is_empty() {
            log::warn!(
                "no prototypes loaded; classifier will start empty: {}",
                primary.display()
            );
        }

        let expected_dim = prototypes.first().map(|p| p.features.len()).unwrap_or(0);
        for proto in &prototypes {
            if proto.features.is_empty() {
                return Err(Error::StoreCorrupt(format!(
                    "prototype {} has no features",
                    proto.id
                )));
            }
            if proto.label.is_empty() {
                return Err(Error::StoreCorrupt(format!(
                    "prototype {} missing label",
                    proto.id
                )));
            }
            if proto.features.len() != expected_dim {
                return Err(Error::StoreCorrupt(format!(
                    "prototype {} has {} features, expected {}",
                    proto.id,
                    proto.features.len(),
                    expected_dim
                )));
            }
        }

        // Adapt the neighbour count to the set we actually have
        let mut k = requested_k;
        if !prototypes.is_empty() && k > prototypes.len() {
            k = prototypes.len();
        }
        if !prototypes.is_empty() && prototypes.len() < 10 && k > 3 {
            k = 3;
        }

        // A single prototype gives no distribution to standardise against;
        // z-scoring it would collapse it to the zero vector
        let scaler = if expected_dim != 0 && expected_dim != EMBEDDING_DIM && prototypes.len() >= 2
        {
            let scaler = FeatureScaler::fit(&prototypes)
                .map_err(|e| Error::StoreCorrupt(format!("failed to fit scaler: {}", e)))?;
            log::info!(
                "feature scaler initialized ({} prototypes, {} dims)",
                prototypes.len(),
                expected_dim
            );
            Some(scaler)
        } else {
            if expected_dim == EMBEDDING_DIM {
                log::info!(
                    "detected {}-dim embeddings, skipping feature scaling",
                    EMBEDDING_DIM
                );
            }
            None
        };

        let mut label_category = HashMap::new();
        let mut label_metadata: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut records = Vec::with_capacity(prototypes.len());
        for proto in prototypes {
            update_label_maps(&mut label_category, &mut label_metadata, &proto);
            let resident = make_resident(&proto.features, scaler.as_ref());
            records.push(StoredRecord {
                raw: proto,
                resident,
            });
        }

        Ok(Self {
            inner: RwLock::new(StoreInner {
                records,
                scaler,
                expected_dim,
                k,
                using_example,
                label_category,
                label_metadata,
            }),
            model_path: primary,
        })
    }

    /// Build an in-memory store directly from prototypes whose features are
    /// already comparable (tests and tools). No scaler is fitted; residents
    /// are the L2-normalised inputs.
    pub fn from_prototypes(prototypes: Vec<Prototype>, k: usize) -> Result<Self> {
        let expected_dim = prototypes.first().map(|p| p.features.len()).unwrap_or(0);

        let mut label_category = HashMap::new();
        let mut label_metadata = HashMap::new();
        let mut records = Vec::with_capacity(prototypes.len());
        for proto in prototypes {
            if proto.features.len() != expected_dim {
                return Err(Error::DimensionMismatch {
                    expected: expected_dim,
                    actual: proto.features.len(),
                });
            }
            update_label_maps(&mut label_category, &mut label_metadata, &proto);
            let resident = make_resident(&proto.features, None);
            records.push(StoredRecord {
                raw: proto,
                resident,
            });
        }

        let mut k = k.max(1);
        if !records.is_empty() && k > records.len() {
            k = records.len();
        }

        Ok(Self {
            inner: RwLock::new(StoreInner {
                records,
                scaler: None,
                expected_dim,
                k,
                using_example: false,
                label_category,
                label_metadata,
            }),
            model_path: std::env::temp_dir().join("rotorsense-adhoc.json"),
        })
    }

    /// Add a prototype: scaler-transform, L2-normalise, append, update label
    /// maps. Clears the example flag.
    ///
    /// The raw feature vector is kept alongside the resident form so the
    /// prototype persists exactly as it was ingested.
    pub fn add(&self, mut proto: Prototype) -> Result<Prototype> {
        if proto.features.is_empty() {
            return Err(Error::InvalidInput("prototype has no features".into()));
        }
        if proto.label.is_empty() {
            return Err(Error::InvalidInput("prototype missing label".into()));
        }

        if let Some(desc) = proto.description.as_deref() {
            if !desc.is_empty() {
                proto
                    .metadata
                    .entry("description".into())
                    .or_insert_with(|| desc.to_string());
            }
        }

        let mut inner = self.inner.write().expect("store lock poisoned");

        if inner.expected_dim != 0 && proto.features.len() != inner.expected_dim {
            return Err(Error::DimensionMismatch {
                expected: inner.expected_dim,
                actual: proto.features.len(),
            });
        }
        if inner.expected_dim == 0 {
            inner.expected_dim = proto.features.len();
        }

        let resident = make_resident(&proto.features, inner.scaler.as_ref());
        let inner = &mut *inner;
        update_label_maps(&mut inner.label_category, &mut inner.label_metadata, &proto);
        inner.records.push(StoredRecord {
            raw: proto.clone(),
            resident,
        });
        inner.using_example = false;

        Ok(proto)
    }

    /// Persist all prototypes to the model file atomically.
    ///
    /// Raw features are serialized; a fresh load re-fits the scaler on the
    /// same data and reproduces the resident vectors exactly. The write goes
    /// to a temporary sibling first and is renamed over the target, so
    /// concurrent readers of the JSON file never observe a partial write.
    pub fn save(&self) -> Result<()> {
        let prototypes: Vec<Prototype> = {
            let inner = self.inner.read().expect("store lock poisoned");
            inner.records.iter().map(|r| r.raw.clone()).collect()
        };

        let dir = self
            .model_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&dir)
            .map_err(|e| Error::PersistFailed(format!("failed to create directory: {}", e)))?;

        let data = serde_json::to_vec_pretty(&prototypes)
            .map_err(|e| Error::PersistFailed(format!("failed to serialize prototypes: {}", e)))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| Error::PersistFailed(format!("failed to create temp file: {}", e)))?;
        tmp.write_all(&data)
            .map_err(|e| Error::PersistFailed(format!("failed to write prototypes: {}", e)))?;
        tmp.persist(&self.model_path)
            .map_err(|e| Error::PersistFailed(format!("failed to rename temp file: {}", e)))?;

        let mut inner = self.inner.write().expect("store lock poisoned");
        inner.using_example = false;

        Ok(())
    }

    /// Owned copy of the current prototypes and label maps.
    ///
    /// The read lock is held only for the duration of the copy; distance math
    /// happens entirely on the snapshot.
    pub fn snapshot(&self) -> StoreSnapshot {
        let inner = self.inner.read().expect("store lock poisoned");
        StoreSnapshot {
            k: inner.k,
            prototypes: inner
                .records
                .iter()
                .map(|r| ResidentPrototype {
                    id: r.raw.id.clone(),
                    label: r.raw.label.clone(),
                    category: r.raw.category.clone(),
                    source: r.raw.source.clone(),
                    features: r.resident.clone(),
                })
                .collect(),
            scaler: inner.scaler.clone(),
            label_category: inner.label_category.clone(),
            label_metadata: inner.label_metadata.clone(),
            using_example: inner.using_example,
        }
    }

    /// Summary counts and per-label histogram
    pub fn stats(&self) -> ModelStats {
        let inner = self.inner.read().expect("store lock poisoned");

        let mut buckets: HashMap<&str, ModelLabelStat> = HashMap::new();
        for record in &inner.records {
            let entry = buckets
                .entry(record.raw.label.as_str())
                .or_insert_with(|| ModelLabelStat {
                    label: record.raw.label.clone(),
                    category: record.raw.category.clone(),
                    prototypes: 0,
                });
            entry.prototypes += 1;
        }

        let mut labels: Vec<ModelLabelStat> = buckets.into_values().collect();
        labels.sort_by(|a, b| a.label.cmp(&b.label));

        ModelStats {
            prototype_count: inner.records.len(),
            label_count: labels.len(),
            labels,
            using_example: inner.using_example,
        }
    }

    /// Distribution summary of the raw feature dimensions
    pub fn scale_report(&self) -> FeatureScaleReport {
        let inner = self.inner.read().expect("store lock poisoned");
        let raw: Vec<Prototype> = inner.records.iter().map(|r| r.raw.clone()).collect();
        FeatureScaleReport::analyze(&raw)
    }

    /// Feature dimensionality the store expects (0 when empty)
    pub fn expected_dim(&self) -> usize {
        self.inner.read().expect("store lock poisoned").expected_dim
    }

    /// Number of resident prototypes
    pub fn len(&self) -> usize {
        self.inner.read().expect("store lock poisoned").records.len()
    }

    /// Check if the store holds no prototypes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Path the store persists to
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }
}

fn make_resident(raw: &[f64], scaler: Option<&FeatureScaler>) -> Vec<f64> {
    let scaled = match scaler {
        Some(scaler) => scaler.transform(raw),
        None => raw.to_vec(),
    };
    l2_normalize(&scaled)
}

fn update_label_maps(
    label_category: &mut HashMap<String, String>,
    label_metadata: &mut HashMap<String, HashMap<String, String>>,
    proto: &Prototype,
) {
    // First non-empty category wins; metadata merges key-by-key with the
    // latest writer taking precedence
    if !proto.category.is_empty() {
        label_category
            .entry(proto.label.clone())
            .or_insert_with(|| proto.category.clone());
    }
    let meta = label_metadata.entry(proto.label.clone()).or_default();
    for (key, value) in &proto.metadata {
        meta.insert(key.clone(), value.clone());
    }
}

fn example_sibling(path: &Path) -> PathBuf {
    // prototypes.json -> prototypes.example.json
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => path.with_extension(format!("example.{}", ext)),
        None => {
            let mut os = path.as_os_str().to_os_string();
            os.push(".example");
            PathBuf::from(os)
        }
    }
}
