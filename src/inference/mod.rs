//! Inference module for classification and benchmarking
//!
//! This module provides:
//! - `InferenceService`: shared-artifact classification (single, batch, bounded-time)
//! - `InferenceResult`: top-1 label, score and ranked list
//! - Latency benchmarking for deployment

pub mod benchmark;
pub mod result;
pub mod service;

// Re-export main types for convenience
pub use benchmark::{run_benchmark, BenchmarkConfig, BenchmarkResult, LatencyStats};
pub use result::{InferenceResult, RankedLabel};
pub use service::{classify, load, InferenceService};

/// Target p95 latency for a single classification on an edge CPU (milliseconds)
pub const TARGET_LATENCY_MS: f64 = 200.0;

/// Default bound for `classify_with_timeout` (milliseconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 2_000;
