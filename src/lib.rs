//! # Recycle Edge
//!
//! An edge inference service that classifies photos of waste items into
//! recyclable categories using a small, int8-quantized CNN built with Burn.
//!
//! ## Modules
//!
//! - `artifact`: the deployable model file (format, quantization, loading)
//! - `preprocess`: decode → resize → normalize, shared by training and serving
//! - `inference`: `InferenceService`, results and latency benchmarking
//! - `model`: the Burn CNN and its frozen, inference-only form
//! - `dataset`, `training`, `export`: the offline checkpoint → artifact pipeline
//! - `utils`: errors, logging and formatting helpers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use recycle_edge::inference::InferenceService;
//!
//! let service = InferenceService::from_path("models/trash.rclf")?;
//! let result = service.classify(&std::fs::read("bottle.jpg")?)?;
//! println!("{} ({:.1}%)", result.label, result.score * 100.0);
//! ```

pub mod artifact;
pub mod backend;
pub mod dataset;
pub mod export;
pub mod inference;
pub mod model;
pub mod preprocess;
pub mod training;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used items for convenience
pub use artifact::{ArtifactInfo, ArtifactWriter, ModelArtifact};
pub use inference::{classify, load, InferenceResult, InferenceService, RankedLabel};
pub use preprocess::{ImageInput, InputShape, Normalization, Preprocessor, ResizePolicy};
pub use utils::error::{EdgeError, Result};

/// The six waste categories of the reference dataset, in label order
pub const DEFAULT_LABELS: [&str; 6] = ["cardboard", "glass", "metal", "paper", "plastic", "trash"];

/// Default square input size
pub const DEFAULT_IMAGE_SIZE: u32 = 224;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
