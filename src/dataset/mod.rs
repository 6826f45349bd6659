//! Dataset module for the offline training job
//!
//! This module provides:
//! - `ImageFolder`: scanning `root/<label>/*` directories
//! - Stratified, seeded train/validation splits
//! - Burn `Dataset` and `Batcher` implementations

pub mod burn_dataset;
pub mod loader;
pub mod split;

pub use burn_dataset::{ClassifierBatch, ClassifierBatcher, ClassifierItem, ImageFolderDataset};
pub use loader::{is_image_file, ImageFolder, ImageSample, IMAGE_EXTENSIONS};
pub use split::{DatasetSplits, SplitConfig};
