//! Training module: the offline checkpoint producer
//!
//! Training runs on a workstation, never on the edge box. It writes a Burn
//! checkpoint plus a `training.json` manifest; `export` turns the pair into a
//! deployable artifact.

pub mod supervised;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{ClassifierLayout, RecycleClassifierConfig};
use crate::preprocess::{InputShape, Normalization, ResizePolicy};
use crate::utils::error::{EdgeError, Result};

pub use supervised::{run_training, TrainingOutcome};

/// Default number of training epochs
pub const DEFAULT_EPOCHS: usize = 20;

/// Default batch size
pub const DEFAULT_BATCH_SIZE: usize = 16;

/// Default learning rate
pub const DEFAULT_LEARNING_RATE: f64 = 1e-3;

/// Checkpoint file stem inside the output directory (Burn adds `.mpk`)
pub const CHECKPOINT_NAME: &str = "model";

/// Manifest file name inside the output directory
pub const MANIFEST_NAME: &str = "training.json";

/// Training configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Image folder (`root/<label>/*`)
    pub data_dir: PathBuf,
    /// Where the checkpoint and manifest are written
    pub output_dir: PathBuf,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub weight_decay: f32,
    pub validation_fraction: f64,
    /// Seed for the split and epoch shuffling
    pub seed: u64,
    /// Square input size
    pub image_size: u32,
    pub base_filters: usize,
    pub hidden_units: usize,
    pub dropout_rate: f64,
    pub normalization: Normalization,
    /// Cap on the number of images used (quick experiments)
    pub max_samples: Option<usize>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        let model = RecycleClassifierConfig::new();
        Self {
            data_dir: PathBuf::from("data/trash"),
            output_dir: PathBuf::from("output/training"),
            epochs: DEFAULT_EPOCHS,
            batch_size: DEFAULT_BATCH_SIZE,
            learning_rate: DEFAULT_LEARNING_RATE,
            weight_decay: 1e-4,
            validation_fraction: 0.2,
            seed: 42,
            image_size: crate::DEFAULT_IMAGE_SIZE,
            base_filters: model.base_filters,
            hidden_units: model.hidden_units,
            dropout_rate: model.dropout_rate,
            normalization: Normalization::default(),
            max_samples: None,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(EdgeError::Config("epochs must be at least 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(EdgeError::Config("batch size must be at least 1".to_string()));
        }
        if !(self.learning_rate > 0.0) {
            return Err(EdgeError::Config("learning rate must be positive".to_string()));
        }
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(EdgeError::Config("dropout must be in [0, 1)".to_string()));
        }
        self.input_shape().validate().map_err(EdgeError::Config)?;
        self.model_config(1)
            .layout()
            .validate()
            .map_err(EdgeError::Config)?;
        self.normalization.validate(3).map_err(EdgeError::Config)?;
        Ok(())
    }

    pub fn input_shape(&self) -> InputShape {
        InputShape::rgb(self.image_size, self.image_size)
    }

    /// Model configuration for `num_classes` labels
    pub fn model_config(&self, num_classes: usize) -> RecycleClassifierConfig {
        RecycleClassifierConfig::new()
            .with_num_classes(num_classes)
            .with_input_size(self.image_size as usize)
            .with_base_filters(self.base_filters)
            .with_hidden_units(self.hidden_units)
            .with_dropout_rate(self.dropout_rate)
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.output_dir.join(CHECKPOINT_NAME)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.output_dir.join(MANIFEST_NAME)
    }
}

/// Metrics of one epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub val_accuracy: f64,
}

/// Sidecar written next to the checkpoint
///
/// Carries everything export needs to rebuild the model and its
/// preprocessing contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingManifest {
    pub labels: Vec<String>,
    pub input: InputShape,
    pub normalization: Normalization,
    pub resize: ResizePolicy,
    pub layout: ClassifierLayout,
    pub config: TrainingConfig,
    pub history: Vec<EpochRecord>,
    pub best_epoch: usize,
    pub best_val_accuracy: f64,
    pub created_at: DateTime<Utc>,
}

impl TrainingManifest {
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Model configuration matching the checkpoint
    pub fn model_config(&self) -> RecycleClassifierConfig {
        self.config.model_config(self.labels.len())
    }
}
