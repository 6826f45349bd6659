//! Stratified train/validation split
//!
//! Every class is shuffled with a seeded ChaCha8 RNG and split
//! proportionally, so both sets keep the class balance of the full dataset
//! and the same seed always yields the same split.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::loader::ImageSample;
use crate::utils::error::{EdgeError, Result};

/// Configuration for dataset splitting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Fraction of each class held out for validation
    pub validation_fraction: f64,
    /// Random seed for reproducibility
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            validation_fraction: 0.2,
            seed: 42,
        }
    }
}

impl SplitConfig {
    pub fn new(validation_fraction: f64, seed: u64) -> Result<Self> {
        let config = Self {
            validation_fraction,
            seed,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.validation_fraction) {
            return Err(EdgeError::Config(
                "Validation fraction must be in [0.0, 1.0)".to_string(),
            ));
        }
        Ok(())
    }
}

/// Training and validation samples
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetSplits {
    pub train: Vec<ImageSample>,
    pub validation: Vec<ImageSample>,
}

impl DatasetSplits {
    /// Split samples per class
    ///
    /// A class with a single image goes entirely to training; otherwise at
    /// least one image of each class stays in training.
    pub fn stratified(samples: &[ImageSample], config: &SplitConfig) -> Result<Self> {
        config.validate()?;

        let mut by_class: BTreeMap<usize, Vec<&ImageSample>> = BTreeMap::new();
        for sample in samples {
            by_class.entry(sample.label).or_default().push(sample);
        }

        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let mut splits = Self::default();

        for class_samples in by_class.values_mut() {
            class_samples.shuffle(&mut rng);

            let n = class_samples.len();
            let n_val = ((n as f64 * config.validation_fraction).ceil() as usize).min(n - 1);

            let (validation, train) = class_samples.split_at(n_val);
            splits.validation.extend(validation.iter().map(|s| (*s).clone()));
            splits.train.extend(train.iter().map(|s| (*s).clone()));
        }

        // Interleave classes for training
        splits.train.shuffle(&mut rng);

        Ok(splits)
    }
}
