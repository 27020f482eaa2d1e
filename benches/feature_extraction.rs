//! Benchmarks for feature extraction and prototype prediction

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rotorsense::classifier::Classifier;
use rotorsense::features::extract_feature_vector;
use rotorsense::store::{Prototype, PrototypeStore};
use std::collections::HashMap;
use std::sync::Arc;

fn rotor_tone(sample_rate: u32, seconds: f64) -> Vec<f64> {
    let n = (sample_rate as f64 * seconds) as usize;
    (0..n)
        .map(|i| {
            let t = i as f64 / sample_rate as f64;
            (1..=5)
                .map(|h| (2.0 * std::f64::consts::PI * 240.0 * h as f64 * t).sin() / h as f64)
                .sum::<f64>()
                * 0.25
        })
        .collect()
}

fn bench_extract(c: &mut Criterion) {
    let sample_rate = 44100;
    let signal_1s = rotor_tone(sample_rate, 1.0);
    let signal_10s = rotor_tone(sample_rate, 10.0);

    c.bench_function("extract_features_1s", |b| {
        b.iter(|| extract_feature_vector(black_box(&signal_1s), black_box(sample_rate)))
    });

    c.bench_function("extract_features_10s", |b| {
        b.iter(|| extract_feature_vector(black_box(&signal_10s), black_box(sample_rate)))
    });
}

fn bench_predict(c: &mut Criterion) {
    let sample_rate = 44100;
    let query = extract_feature_vector(&rotor_tone(sample_rate, 1.0), sample_rate).unwrap();

    // A store of the size a deployed model typically reaches
    let prototypes: Vec<Prototype> = (0..500)
        .map(|i| {
            let mut features = query.clone();
            features[i % features.len()] += 0.01 * (i as f64 % 7.0);
            Prototype {
                id: format!("p{}", i),
                label: format!("label_{}", i % 12),
                category: "drone".into(),
                description: None,
                source: None,
                features,
                metadata: HashMap::new(),
            }
        })
        .collect();

    let classifier = Classifier::new(Arc::new(
        PrototypeStore::from_prototypes(prototypes, 5).unwrap(),
    ));

    c.bench_function("predict_500_prototypes", |b| {
        b.iter(|| classifier.predict(black_box(&query)))
    });
}

criterion_group!(benches, bench_extract, bench_predict);
criterion_main!(benches);
