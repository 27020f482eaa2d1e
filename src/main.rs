//! Rotorsense CLI - acoustic drone classification
//!
//! Thin drivers over the library pipeline: classify a recording, ingest new
//! prototypes, inspect the model, evaluate against a labelled directory tree
//! and build template banks.
//!
//! # Quick Start
//! ```bash
//! # Classify a recording
//! rotorsense classify -a capture.wav
//!
//! # Add a prototype
//! rotorsense ingest -a quad.wav -l "dji_mavic" -c drone
//!
//! # Inspect the loaded model
//! rotorsense stats --scales
//! ```

use clap::{Parser, Subcommand};
use rotorsense::audio::load_wav_mono;
use rotorsense::classifier::template::{build_templates_from_dir, save_templates};
use rotorsense::pipeline::{ClassifyInput, DetectionPipeline, IngestRequest};
use rotorsense::{Result, RuntimeConfig};
use std::collections::HashMap;
use std::path::PathBuf;

// ============================================================================
// CLI Structure
// ============================================================================

#[derive(Parser)]
#[command(
    name = "rotorsense",
    about = "Acoustic drone classification over prototype k-NN",
    version,
    after_help = "Examples:\n  rotorsense classify -a capture.wav\n  rotorsense ingest -a quad.wav -l dji_mavic\n  rotorsense evaluate -d testdata/"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a WAV recording
    Classify {
        /// Audio file to classify
        #[arg(short, long)]
        audio: PathBuf,

        /// Emit the full summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Ingest an audio asset as a new prototype
    Ingest {
        /// Audio file to ingest
        #[arg(short, long)]
        audio: PathBuf,

        /// Label for the new prototype
        #[arg(short, long)]
        label: String,

        /// Category (drone, noise, unknown, ...)
        #[arg(short, long, default_value = "drone")]
        category: String,

        /// Free-form description
        #[arg(short, long)]
        description: Option<String>,

        /// Source attribution
        #[arg(short, long)]
        source: Option<String>,

        /// Metadata entries as key=value (repeatable)
        #[arg(short, long = "meta")]
        meta: Vec<String>,
    },

    /// Show model statistics
    Stats {
        /// Include the per-dimension feature scale report
        #[arg(long)]
        scales: bool,
    },

    /// Evaluate accuracy against a labelled directory tree (<dir>/<label>/*.wav)
    Evaluate {
        /// Root of the labelled tree
        #[arg(short, long)]
        dir: PathBuf,
    },

    /// Build a template bank from a directory of WAV files
    BuildTemplates {
        /// Directory of labelled WAV files (label = file stem)
        #[arg(short, long)]
        dir: PathBuf,

        /// Output template bank path
        #[arg(short, long, default_value = "drone/templates.json")]
        output: PathBuf,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Classify { audio, json } => cmd_classify(audio, json),
        Commands::Ingest {
            audio,
            label,
            category,
            description,
            source,
            meta,
        } => cmd_ingest(audio, label, category, description, source, meta),
        Commands::Stats { scales } => cmd_stats(scales),
        Commands::Evaluate { dir } => cmd_evaluate(dir),
        Commands::BuildTemplates { dir, output } => cmd_build_templates(dir, output),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

fn cmd_classify(audio: PathBuf, json: bool) -> Result<()> {
    let config = RuntimeConfig::from_env();
    let pipeline = DetectionPipeline::new(&config)?;

    let sample = load_wav_mono(&audio)?;
    let mut input = ClassifyInput::new(&sample.samples, sample.sample_rate);
    input.recording_path = Some(audio.display().to_string());

    let summary = pipeline.classify(input)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!(
        "is_drone: {}  (snr {:.1} dB, threshold {:.2}, {:.1} ms)",
        summary.is_drone, summary.snr_db, summary.adjusted_threshold, summary.latency_ms
    );
    if !summary.windows.is_empty() {
        println!("windows analysed: {}", summary.windows.len());
    }
    for (rank, pred) in summary.predictions.iter().take(5).enumerate() {
        println!(
            "  {}. {:<24} {:<10} conf {:.3}  dist {:.3}  support {}",
            rank + 1,
            pred.label,
            pred.category,
            pred.confidence,
            pred.average_distance,
            pred.support
        );
    }
    if summary.predictions.is_empty() {
        println!("  (no predictions - prototype store is empty?)");
    }

    Ok(())
}

fn cmd_ingest(
    audio: PathBuf,
    label: String,
    category: String,
    description: Option<String>,
    source: Option<String>,
    meta: Vec<String>,
) -> Result<()> {
    let config = RuntimeConfig::from_env();
    let pipeline = DetectionPipeline::new(&config)?;

    let mut metadata = HashMap::new();
    for entry in meta {
        if let Some((key, value)) = entry.split_once('=') {
            metadata.insert(key.to_string(), value.to_string());
        } else {
            log::warn!("ignoring malformed metadata entry (want key=value): {}", entry);
        }
    }

    let request = IngestRequest {
        label,
        category,
        description,
        source: source.or_else(|| {
            audio
                .file_name()
                .and_then(|n| n.to_str())
                .map(String::from)
        }),
        metadata,
    };

    let (proto, stats) = pipeline.ingest_file(&audio, &request)?;
    println!(
        "stored prototype {} (label {}, {} dims)",
        proto.id,
        proto.label,
        proto.features.len()
    );
    println!(
        "model now holds {} prototypes across {} labels",
        stats.prototype_count, stats.label_count
    );

    Ok(())
}

fn cmd_stats(scales: bool) -> Result<()> {
    let config = RuntimeConfig::from_env();
    let pipeline = DetectionPipeline::new(&config)?;
    let stats = pipeline.stats();

    println!(
        "prototypes: {}  labels: {}  using_example: {}",
        stats.prototype_count, stats.label_count, stats.using_example
    );
    for label in &stats.labels {
        println!(
            "  {:<24} {:<10} {} prototypes",
            label.label, label.category, label.prototypes
        );
    }

    if scales {
        let report = pipeline.store().scale_report();
        println!("\nfeature scales (raw, pre-normalisation):");
        println!(
            "{:<28} {:>12} {:>12} {:>12} {:>12}",
            "feature", "min", "max", "mean", "stddev"
        );
        for i in 0..report.names.len() {
            println!(
                "{:<28} {:>12.6} {:>12.6} {:>12.6} {:>12.6}",
                report.names[i], report.min[i], report.max[i], report.mean[i], report.stddev[i]
            );
        }
        for issue in report.issues() {
            println!("warning: {}", issue);
        }
    }

    Ok(())
}

fn cmd_evaluate(dir: PathBuf) -> Result<()> {
    let config = RuntimeConfig::from_env();
    let pipeline = DetectionPipeline::new(&config)?;

    let mut per_label: HashMap<String, (usize, usize)> = HashMap::new();
    let mut total = 0usize;
    let mut correct = 0usize;

    let mut label_dirs: Vec<PathBuf> = std::fs::read_dir(&dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    label_dirs.sort();

    for label_dir in label_dirs {
        let expected = label_dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        let mut files: Vec<PathBuf> = std::fs::read_dir(&label_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.extension()
                    .map(|ext| ext.eq_ignore_ascii_case("wav"))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        for file in files {
            let sample = match load_wav_mono(&file) {
                Ok(sample) => sample,
                Err(err) => {
                    log::warn!("skipping {}: {}", file.display(), err);
                    continue;
                }
            };

            let summary = pipeline.classify(ClassifyInput::new(&sample.samples, sample.sample_rate))?;
            let predicted = summary
                .predictions
                .first()
                .map(|p| p.label.clone())
                .unwrap_or_default();

            let entry = per_label.entry(expected.clone()).or_insert((0, 0));
            entry.1 += 1;
            total += 1;
            if predicted.eq_ignore_ascii_case(&expected) {
                entry.0 += 1;
                correct += 1;
            } else {
                log::info!(
                    "misclassified {}: expected {}, got {}",
                    file.display(),
                    expected,
                    predicted
                );
            }
        }
    }

    if total == 0 {
        println!("no WAV files found under {}", dir.display());
        return Ok(());
    }

    let mut labels: Vec<_> = per_label.into_iter().collect();
    labels.sort_by(|a, b| a.0.cmp(&b.0));
    for (label, (hits, count)) in labels {
        println!(
            "  {:<24} {:>3}/{:<3} ({:.1}%)",
            label,
            hits,
            count,
            100.0 * hits as f64 / count as f64
        );
    }
    println!(
        "overall accuracy: {}/{} ({:.1}%)",
        correct,
        total,
        100.0 * correct as f64 / total as f64
    );

    Ok(())
}

fn cmd_build_templates(dir: PathBuf, output: PathBuf) -> Result<()> {
    let templates = build_templates_from_dir(&dir)?;
    save_templates(&output, &templates)?;
    println!(
        "wrote {} templates to {}",
        templates.len(),
        output.display()
    );
    Ok(())
}
