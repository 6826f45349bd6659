//! Recycle Edge CLI
//!
//! Offline side (train, export) and operator side (inspect, classify,
//! benchmark, stats) of the recyclable-item classifier.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing::info;
use walkdir::WalkDir;

use recycle_edge::backend::{backend_name, default_device, TrainingBackend};
use recycle_edge::dataset::{is_image_file, ImageFolder};
use recycle_edge::export::{export_checkpoint, ExportConfig};
use recycle_edge::inference::{run_benchmark, BenchmarkConfig, InferenceService, TARGET_LATENCY_MS};
use recycle_edge::training::{run_training, TrainingConfig};
use recycle_edge::utils::logging::{init_logging, LogConfig};
use recycle_edge::utils::{format_bytes, format_duration, format_score_bar};
use recycle_edge::{ModelArtifact, Normalization};

/// Recycle Edge: quantized waste classification on edge hardware
#[derive(Parser, Debug)]
#[command(name = "recycle_edge")]
#[command(version)]
#[command(about = "Train, export and run the recyclable-item classifier", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum NormalizationArg {
    /// Scale pixels to [0, 1]
    ZeroOne,
    /// Scale pixels to [-1, 1]
    MinusOneOne,
    /// ImageNet mean/std
    Imagenet,
}

impl From<NormalizationArg> for Normalization {
    fn from(arg: NormalizationArg) -> Self {
        match arg {
            NormalizationArg::ZeroOne => Normalization::ZeroOne,
            NormalizationArg::MinusOneOne => Normalization::MinusOneOne,
            NormalizationArg::Imagenet => Normalization::imagenet(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train a classifier on an image folder (`<data_dir>/<label>/*.jpg`)
    Train {
        /// Path to the dataset directory
        #[arg(short, long, default_value = "data/trash")]
        data_dir: PathBuf,

        /// Output directory for the checkpoint and manifest
        #[arg(short, long, default_value = "output/training")]
        output_dir: PathBuf,

        /// Number of training epochs
        #[arg(short, long, default_value = "20")]
        epochs: usize,

        /// Batch size for training
        #[arg(short, long, default_value = "16")]
        batch_size: usize,

        /// Learning rate
        #[arg(short, long, default_value = "0.001")]
        learning_rate: f64,

        /// Fraction of each class held out for validation
        #[arg(long, default_value = "0.2")]
        validation_fraction: f64,

        /// Square input size
        #[arg(long, default_value = "224")]
        image_size: u32,

        /// Pixel normalization baked into the artifact
        #[arg(long, value_enum, default_value = "zero-one")]
        normalization: NormalizationArg,

        /// Random seed for the split and shuffling
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Quick test mode - use only 300 samples
        #[arg(long, default_value = "false")]
        quick: bool,
    },

    /// Quantize a training checkpoint into a deployable artifact
    Export {
        /// Directory written by `train`
        #[arg(short, long, default_value = "output/training")]
        training_dir: PathBuf,

        /// Artifact file to write
        #[arg(short, long, default_value = "models/recycle.rclf")]
        output: PathBuf,

        /// Model name stored in the artifact
        #[arg(long, default_value = "recycle-classifier")]
        name: String,

        /// Model version stored in the artifact
        #[arg(long)]
        model_version: Option<String>,
    },

    /// Print an artifact's header
    Inspect {
        /// Path to the artifact
        #[arg(short, long)]
        model: PathBuf,

        /// Print JSON instead of a table
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Classify a single image or every image in a directory
    Classify {
        /// Path to input image or directory
        #[arg(short, long)]
        input: PathBuf,

        /// Path to the artifact
        #[arg(short, long)]
        model: PathBuf,

        /// Number of ranked labels to show
        #[arg(short = 'k', long, default_value = "3")]
        top_k: usize,

        /// Print one JSON object per image
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Benchmark single-image latency
    Benchmark {
        /// Path to the artifact
        #[arg(short, long)]
        model: PathBuf,

        /// Number of timed iterations
        #[arg(short, long, default_value = "100")]
        iterations: usize,

        /// Number of warmup iterations
        #[arg(long, default_value = "10")]
        warmup: usize,

        /// Output JSON file for benchmark results
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show dataset statistics
    Stats {
        /// Path to the dataset directory
        #[arg(short, long, default_value = "data/trash")]
        data_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };

    let _ = init_logging(&log_config);

    print_banner();

    match cli.command {
        Commands::Train {
            data_dir,
            output_dir,
            epochs,
            batch_size,
            learning_rate,
            validation_fraction,
            image_size,
            normalization,
            seed,
            quick,
        } => {
            let max_samples = if quick {
                println!("{}", "Quick test mode: using only 300 samples".yellow().bold());
                Some(300usize)
            } else {
                None
            };

            let config = TrainingConfig {
                data_dir,
                output_dir,
                epochs,
                batch_size,
                learning_rate,
                validation_fraction,
                seed,
                image_size,
                normalization: normalization.into(),
                max_samples,
                ..TrainingConfig::default()
            };
            cmd_train(&config)?;
        }

        Commands::Export {
            training_dir,
            output,
            name,
            model_version,
        } => {
            let mut config = ExportConfig::new(training_dir, output);
            config.name = name;
            if let Some(version) = model_version {
                config.version = version;
            }
            cmd_export(&config)?;
        }

        Commands::Inspect { model, json } => {
            cmd_inspect(&model, json)?;
        }

        Commands::Classify {
            input,
            model,
            top_k,
            json,
        } => {
            cmd_classify(&input, &model, top_k, json)?;
        }

        Commands::Benchmark {
            model,
            iterations,
            warmup,
            output,
        } => {
            cmd_benchmark(&model, iterations, warmup, output)?;
        }

        Commands::Stats { data_dir } => {
            cmd_stats(&data_dir)?;
        }
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔══════════════════════════════════════════════════════════════╗
 ║   ♻  Recycle Edge                                            ║
 ║   Quantized waste classification with Burn + Rust            ║
 ╚══════════════════════════════════════════════════════════════╝
  "#
        .green()
    );
}

fn cmd_train(config: &TrainingConfig) -> Result<()> {
    info!("Training on {:?} with backend {}", config.data_dir, backend_name());

    let start = std::time::Instant::now();
    let device = default_device();
    let outcome = run_training::<TrainingBackend>(config, &device)?;

    println!();
    println!("{}", "Training complete".green().bold());
    println!("  Labels:          {}", outcome.manifest.labels.join(", "));
    println!(
        "  Best epoch:      {} ({:.2}% validation accuracy)",
        outcome.manifest.best_epoch,
        outcome.manifest.best_val_accuracy * 100.0
    );
    println!("  Checkpoint:      {:?}", outcome.checkpoint.with_extension("mpk"));
    println!("  Manifest:        {:?}", outcome.manifest_path);
    println!("  Time:            {}", format_duration(start.elapsed().as_secs_f64()));
    println!();
    println!("{}", "Next step:".yellow());
    println!(
        "  recycle_edge export --training-dir {}",
        config.output_dir.display()
    );
    Ok(())
}

fn cmd_export(config: &ExportConfig) -> Result<()> {
    let report = export_checkpoint(config)?;

    println!("{}", "Artifact written".green().bold());
    println!("  Path:            {:?}", report.artifact);
    println!("  Size:            {}", format_bytes(report.size_bytes as u64));
    println!("  Labels:          {}", report.labels.join(", "));
    println!("  Parameters:      {}", report.num_parameters);
    println!("  Max quant error: {:.6}", report.max_abs_error);
    println!("  SHA-256:         {}", report.payload_sha256);
    Ok(())
}

fn cmd_inspect(model: &Path, json: bool) -> Result<()> {
    let artifact = ModelArtifact::load(model)?;
    let info = artifact.info();

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("{}", "Artifact".cyan().bold());
    println!("  Name:            {} {}", info.name, info.version);
    println!("  Created:         {}", info.created_at.to_rfc3339());
    println!("  File:            {} ({})", info.origin, format_bytes(info.size_bytes));
    println!("  Input:           {}", info.input);
    println!("  Normalization:   {:?}", info.normalization);
    println!("  Resize:          {:?}", info.resize);
    println!(
        "  Architecture:    base {} filters, {} hidden units",
        info.architecture.base_filters, info.architecture.hidden_units
    );
    println!("  Parameters:      {}", info.num_parameters);
    println!("  SHA-256:         {}", info.payload_sha256);
    println!("{}", "Labels".cyan().bold());
    for (i, label) in info.labels.iter().enumerate() {
        println!("  {:>2}  {}", i, label);
    }
    Ok(())
}

/// The input itself, or every image file below it in path order
fn collect_inputs(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        bail!("input not found: {}", input.display());
    }

    let mut files: Vec<PathBuf> = WalkDir::new(input)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_image_file(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    Ok(files)
}

fn cmd_classify(input: &Path, model: &Path, top_k: usize, json: bool) -> Result<()> {
    let service = InferenceService::from_path(model)?;
    let files = collect_inputs(input)?;
    if files.is_empty() {
        bail!("no images found in {}", input.display());
    }
    info!("Classifying {} image(s) with {}", files.len(), model.display());

    let mut failures = 0usize;
    for path in &files {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;

        match service.classify(&bytes) {
            Ok(result) => {
                let result = result.truncate(top_k.max(1));
                if json {
                    let line = serde_json::json!({
                        "path": path,
                        "result": result,
                    });
                    println!("{}", line);
                } else {
                    println!("{}", path.display().to_string().bold());
                    for ranked in &result.ranked {
                        println!(
                            "  {:<12} {}",
                            ranked.label,
                            format_score_bar(ranked.score, 20)
                        );
                    }
                }
            }
            Err(e) => {
                failures += 1;
                if json {
                    let line = serde_json::json!({
                        "path": path,
                        "error": e.to_string(),
                    });
                    println!("{}", line);
                } else {
                    println!("{} {}: {}", "Error:".red(), path.display(), e);
                }
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} image(s) could not be classified", failures, files.len());
    }
    Ok(())
}

fn cmd_benchmark(
    model: &Path,
    iterations: usize,
    warmup: usize,
    output: Option<PathBuf>,
) -> Result<()> {
    let service = InferenceService::from_path(model)?;
    let config = BenchmarkConfig {
        warmup_iterations: warmup,
        iterations,
        verbose: false,
        output_path: output,
    };

    let result = run_benchmark(&service, config)?;
    println!("{}", result);

    if result.meets_latency_target(TARGET_LATENCY_MS) {
        println!(
            "{} p95 {:.2}ms is within the {:.0}ms target",
            "OK".green().bold(),
            result.latency.p95_ms,
            TARGET_LATENCY_MS
        );
    } else {
        println!(
            "{} p95 {:.2}ms exceeds the {:.0}ms target",
            "SLOW".yellow().bold(),
            result.latency.p95_ms,
            TARGET_LATENCY_MS
        );
    }
    Ok(())
}

fn cmd_stats(data_dir: &Path) -> Result<()> {
    info!("Computing dataset statistics for: {}", data_dir.display());

    if !data_dir.exists() {
        println!(
            "{} Dataset directory not found: {}",
            "Error:".red(),
            data_dir.display()
        );
        println!();
        println!("{}", "Expected structure:".yellow());
        println!("  {}/", data_dir.display());
        println!("  ├── cardboard/");
        println!("  ├── glass/");
        println!("  └── ...");
        return Ok(());
    }

    let folder = ImageFolder::new(data_dir)?;
    let total = folder.len().max(1);

    println!("{}", "Dataset".cyan().bold());
    println!("  Root:            {}", data_dir.display());
    println!("  Classes:         {}", folder.num_classes());
    println!("  Images:          {}", folder.len());
    println!();
    for (label, count) in folder.distribution() {
        let share = count as f32 / total as f32;
        println!("  {:<12} {:>6}  {}", label, count, format_score_bar(share, 20));
    }
    Ok(())
}
