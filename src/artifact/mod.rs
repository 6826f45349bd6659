//! Model artifact module
//!
//! The artifact is the only thing the training side hands to the serving
//! side: int8-quantized weights, the label list, the expected input shape
//! and the preprocessing contract, protected by a SHA-256 digest.

pub mod format;
pub mod header;
pub mod model_artifact;
pub mod quantize;

pub use format::{decode, ArtifactWriter, EncodedArtifact};
pub use header::{ArtifactHeader, QuantizationScheme, TensorEntry};
pub use model_artifact::{ArtifactInfo, ModelArtifact};
pub use quantize::{QuantizationReport, TensorError};

/// File magic
pub const MAGIC: [u8; 4] = *b"RCLF";

/// Current binary layout version
pub const FORMAT_VERSION: u32 = 1;

/// Conventional file extension
pub const EXTENSION: &str = "rclf";
