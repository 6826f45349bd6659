//! Benchmark Module for Inference Latency Testing
//!
//! Measures end-to-end `classify` latency (decode, preprocess, forward pass)
//! on a synthetic image of the artifact's input size.
//!
//! ## Key Metrics
//!
//! - **Latency**: Time per classification (ms)
//! - **Throughput**: Images classified per second

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::service::InferenceService;
use crate::backend::backend_name;
use crate::utils::error::{EdgeError, Result};

/// Configuration for benchmarking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Number of warmup iterations (excluded from measurements)
    pub warmup_iterations: usize,

    /// Number of benchmark iterations
    pub iterations: usize,

    /// Whether to keep individual iteration times in the result
    pub verbose: bool,

    /// Output file for results (optional)
    pub output_path: Option<PathBuf>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            warmup_iterations: 10,
            iterations: 100,
            verbose: false,
            output_path: None,
        }
    }
}

/// Results from a benchmark run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub artifact: String,
    pub backend: String,
    pub latency: LatencyStats,
    /// Images per second
    pub throughput: f64,
    /// Individual iteration times (if verbose)
    pub iteration_times_ms: Vec<f64>,
    pub config: BenchmarkConfig,
    pub timestamp: String,
}

impl BenchmarkResult {
    pub fn from_timings(
        timings: &[Duration],
        config: BenchmarkConfig,
        artifact: String,
    ) -> Self {
        let latency = LatencyStats::from_durations(timings);
        let throughput = if latency.mean_ms > 0.0 {
            1000.0 / latency.mean_ms
        } else {
            0.0
        };

        let iteration_times_ms = if config.verbose {
            timings.iter().map(|d| d.as_secs_f64() * 1000.0).collect()
        } else {
            Vec::new()
        };

        Self {
            artifact,
            backend: backend_name().to_string(),
            latency,
            throughput,
            iteration_times_ms,
            config,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Save results to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, json)?;
        Ok(())
    }

    /// Check if p95 latency meets the target (in milliseconds)
    pub fn meets_latency_target(&self, target_ms: f64) -> bool {
        self.latency.p95_ms <= target_ms
    }

    pub fn summary(&self) -> String {
        format!(
            "Latency: {:.2}ms (mean), {:.2}ms (p95), {:.2}ms (p99) | Throughput: {:.1} img/s",
            self.latency.mean_ms, self.latency.p95_ms, self.latency.p99_ms, self.throughput
        )
    }
}

impl std::fmt::Display for BenchmarkResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "╔══════════════════════════════════════════════════════════════╗")?;
        writeln!(f, "║              Benchmark Results                               ║")?;
        writeln!(f, "╠══════════════════════════════════════════════════════════════╣")?;
        writeln!(f, "║ Artifact: {:52} ║", self.artifact)?;
        writeln!(f, "║ Backend:  {:52} ║", self.backend)?;
        writeln!(f, "╠══════════════════════════════════════════════════════════════╣")?;
        writeln!(f, "║ Latency Statistics                                           ║")?;
        writeln!(f, "║   Mean:     {:8.2} ms                                      ║", self.latency.mean_ms)?;
        writeln!(f, "║   Std Dev:  {:8.2} ms                                      ║", self.latency.std_ms)?;
        writeln!(f, "║   Min:      {:8.2} ms                                      ║", self.latency.min_ms)?;
        writeln!(f, "║   Max:      {:8.2} ms                                      ║", self.latency.max_ms)?;
        writeln!(f, "║   P50:      {:8.2} ms                                      ║", self.latency.p50_ms)?;
        writeln!(f, "║   P95:      {:8.2} ms                                      ║", self.latency.p95_ms)?;
        writeln!(f, "║   P99:      {:8.2} ms                                      ║", self.latency.p99_ms)?;
        writeln!(f, "╠══════════════════════════════════════════════════════════════╣")?;
        writeln!(f, "║ Throughput: {:8.1} images/second                          ║", self.throughput)?;
        writeln!(f, "║ Iterations: {:5} (+{} warmup)                               ", self.config.iterations, self.config.warmup_iterations)?;
        writeln!(f, "╚══════════════════════════════════════════════════════════════╝")?;
        Ok(())
    }
}

/// Latency statistics from benchmark
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatencyStats {
    pub mean_ms: f64,
    pub std_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    /// Median (50th percentile)
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

impl LatencyStats {
    /// Calculate statistics from a list of durations
    pub fn from_durations(durations: &[Duration]) -> Self {
        if durations.is_empty() {
            return Self::default();
        }

        let mut times_ms: Vec<f64> = durations.iter().map(|d| d.as_secs_f64() * 1000.0).collect();
        times_ms.sort_by(|a, b| a.total_cmp(b));

        let n = times_ms.len();
        let mean = times_ms.iter().sum::<f64>() / n as f64;
        let variance = times_ms.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / n as f64;

        Self {
            mean_ms: mean,
            std_ms: variance.sqrt(),
            min_ms: times_ms[0],
            max_ms: times_ms[n - 1],
            p50_ms: percentile(&times_ms, 50.0),
            p95_ms: percentile(&times_ms, 95.0),
            p99_ms: percentile(&times_ms, 99.0),
        }
    }
}

/// Calculate percentile from sorted data
fn percentile(sorted_data: &[f64], p: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let idx = (p / 100.0 * (sorted_data.len() - 1) as f64).round() as usize;
    sorted_data[idx.min(sorted_data.len() - 1)]
}

/// A PNG-encoded gradient image of the given size
pub fn synthetic_image(width: u32, height: u32) -> Result<Vec<u8>> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            128,
        ])
    });

    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| EdgeError::Preprocess(format!("failed to encode benchmark image: {}", e)))?;
    Ok(buffer.into_inner())
}

/// Time `iterations` classifications of a synthetic image
pub fn run_benchmark(service: &InferenceService, config: BenchmarkConfig) -> Result<BenchmarkResult> {
    if config.iterations == 0 {
        return Err(EdgeError::Config("iterations must be at least 1".to_string()));
    }

    let shape = service.artifact().input_shape();
    let image = synthetic_image(shape.width, shape.height)?;

    info!(
        "Benchmarking {} ({} warmup, {} timed iterations)",
        service.artifact().origin(),
        config.warmup_iterations,
        config.iterations
    );

    for _ in 0..config.warmup_iterations {
        service.classify(&image)?;
    }

    let mut timings = Vec::with_capacity(config.iterations);
    for i in 0..config.iterations {
        let start = Instant::now();
        service.classify(&image)?;
        let elapsed = start.elapsed();
        if config.verbose {
            debug!("Iteration {}: {:.2}ms", i + 1, elapsed.as_secs_f64() * 1000.0);
        }
        timings.push(elapsed);
    }

    let result = BenchmarkResult::from_timings(
        &timings,
        config.clone(),
        service.artifact().origin().to_string(),
    );
    info!("{}", result.summary());

    if let Some(path) = &config.output_path {
        result.save(path)?;
        info!("Benchmark results saved to {:?}", path);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ModelArtifact;
    use crate::testing::small_artifact_bytes;
    use std::sync::Arc;

    #[test]
    fn test_latency_stats() {
        let durations: Vec<Duration> = (1..=10).map(Duration::from_millis).collect();
        let stats = LatencyStats::from_durations(&durations);

        assert!((stats.mean_ms - 5.5).abs() < 0.01);
        assert!((stats.min_ms - 1.0).abs() < 0.01);
        assert!((stats.max_ms - 10.0).abs() < 0.01);
        assert!(stats.p50_ms >= 5.0 && stats.p50_ms <= 6.0);
    }

    #[test]
    fn test_percentile() {
        let data: Vec<f64> = (0..=100).map(|x| x as f64).collect();
        assert_eq!(percentile(&data, 50.0), 50.0);
        assert_eq!(percentile(&data, 95.0), 95.0);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn test_run_benchmark_writes_json() {
        let artifact =
            ModelArtifact::from_bytes(&small_artifact_bytes(&["a", "b"], 32), "memory").unwrap();
        let service = InferenceService::new(Arc::new(artifact));

        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("bench.json");
        let config = BenchmarkConfig {
            warmup_iterations: 2,
            iterations: 10,
            verbose: true,
            output_path: Some(output.clone()),
        };

        let result = run_benchmark(&service, config).unwrap();
        assert_eq!(result.iteration_times_ms.len(), 10);
        assert!(result.throughput > 0.0);
        assert!(output.exists());
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let artifact =
            ModelArtifact::from_bytes(&small_artifact_bytes(&["a", "b"], 32), "memory").unwrap();
        let service = InferenceService::new(Arc::new(artifact));
        let config = BenchmarkConfig {
            iterations: 0,
            ..BenchmarkConfig::default()
        };
        assert!(run_benchmark(&service, config).is_err());
    }
}
