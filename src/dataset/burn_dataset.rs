//! Burn Dataset Integration
//!
//! Implements Burn's `Dataset` trait and `Batcher` for the training loop.
//! Images go through the same [`Preprocessor`] the inference service uses, so
//! a model is always trained on exactly the tensors it will later be served.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{info, warn};

use super::loader::ImageSample;
use crate::preprocess::{InputShape, Preprocessor};
use crate::utils::error::{EdgeError, Result};

/// A single preprocessed item ready for Burn
#[derive(Clone, Debug)]
pub struct ClassifierItem {
    /// Normalized CHW values
    pub image: Vec<f32>,
    pub label: usize,
    pub path: PathBuf,
}

impl ClassifierItem {
    /// Read and preprocess an image file
    pub fn from_path(path: &Path, label: usize, preprocessor: &Preprocessor) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let input = preprocessor.prepare(&bytes)?;

        Ok(Self {
            image: input.into_data(),
            label,
            path: path.to_path_buf(),
        })
    }
}

/// In-memory dataset of preprocessed images
#[derive(Debug, Clone, Default)]
pub struct ImageFolderDataset {
    items: Vec<ClassifierItem>,
}

impl ImageFolderDataset {
    pub fn from_items(items: Vec<ClassifierItem>) -> Self {
        Self { items }
    }

    /// Load and preprocess every sample in parallel
    ///
    /// Images that fail to decode or are too small are skipped with a warning.
    pub fn load(samples: &[ImageSample], preprocessor: &Preprocessor) -> Result<Self> {
        let total = samples.len();
        info!("Pre-loading {} images into memory", total);

        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
                .map(|style| style.progress_chars("#>-"))
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        let loaded = AtomicUsize::new(0);
        let items: Vec<ClassifierItem> = samples
            .par_iter()
            .filter_map(|sample| {
                let result = ClassifierItem::from_path(&sample.path, sample.label, preprocessor);
                let count = loaded.fetch_add(1, Ordering::Relaxed);
                if count % 50 == 0 {
                    pb.set_position(count as u64);
                }
                match result {
                    Ok(item) => Some(item),
                    Err(e) => {
                        warn!("Skipping {:?}: {}", sample.path, e);
                        None
                    }
                }
            })
            .collect();

        pb.finish_with_message(format!("Loaded {} images", items.len()));

        if items.is_empty() && total > 0 {
            return Err(EdgeError::Dataset(
                "none of the images could be loaded".to_string(),
            ));
        }
        if items.len() < total {
            warn!("Loaded {}/{} images", items.len(), total);
        }

        Ok(Self { items })
    }

    /// Samples per class
    pub fn class_distribution(&self, num_classes: usize) -> Vec<usize> {
        let mut counts = vec![0usize; num_classes];
        for item in &self.items {
            if item.label < num_classes {
                counts[item.label] += 1;
            }
        }
        counts
    }
}

impl Dataset<ClassifierItem> for ImageFolderDataset {
    fn get(&self, index: usize) -> Option<ClassifierItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// A batch of images for training
#[derive(Clone, Debug)]
pub struct ClassifierBatch<B: Backend> {
    /// Shape [batch_size, channels, height, width]
    pub images: Tensor<B, 4>,
    /// Shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Stacks preprocessed items into tensors
#[derive(Clone, Debug)]
pub struct ClassifierBatcher {
    shape: InputShape,
}

impl ClassifierBatcher {
    pub fn new(shape: InputShape) -> Self {
        Self { shape }
    }
}

impl<B: Backend> Batcher<B, ClassifierItem, ClassifierBatch<B>> for ClassifierBatcher {
    fn batch(&self, items: Vec<ClassifierItem>, device: &B::Device) -> ClassifierBatch<B> {
        let batch_size = items.len();
        let [channels, height, width] = self.shape.chw();

        let images_data: Vec<f32> = items.iter().flat_map(|item| item.image.clone()).collect();
        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, channels, height, width]),
            device,
        );

        let targets_data: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        ClassifierBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::{Normalization, ResizePolicy};
    use burn_ndarray::NdArray;
    use image::{DynamicImage, ImageFormat};

    type TestBackend = NdArray;

    fn preprocessor() -> Preprocessor {
        Preprocessor::new(
            InputShape::rgb(16, 16),
            Normalization::ZeroOne,
            ResizePolicy::default(),
        )
    }

    #[test]
    fn test_batcher_shapes() {
        let shape = InputShape::rgb(4, 4);
        let items = (0..3)
            .map(|label| ClassifierItem {
                image: vec![0.5; shape.num_values()],
                label,
                path: PathBuf::from("x.png"),
            })
            .collect();

        let device = Default::default();
        let batch: ClassifierBatch<TestBackend> = ClassifierBatcher::new(shape).batch(items, &device);

        assert_eq!(batch.images.dims(), [3, 3, 4, 4]);
        assert_eq!(batch.targets.dims(), [3]);
    }

    #[test]
    fn test_load_skips_unreadable_images() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        DynamicImage::new_rgb8(40, 40)
            .save_with_format(&good, ImageFormat::Png)
            .unwrap();
        let bad = dir.path().join("bad.png");
        std::fs::write(&bad, b"not a png").unwrap();

        let samples = vec![
            ImageSample { path: good, label: 0 },
            ImageSample { path: bad, label: 1 },
        ];
        let dataset = ImageFolderDataset::load(&samples, &preprocessor()).unwrap();

        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.get(0).unwrap().image.len(), 3 * 16 * 16);
        assert_eq!(dataset.class_distribution(2), vec![1, 0]);
    }

    #[test]
    fn test_load_fails_when_nothing_loads() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.jpg");
        std::fs::write(&bad, b"nope").unwrap();

        let samples = vec![ImageSample { path: bad, label: 0 }];
        assert!(ImageFolderDataset::load(&samples, &preprocessor()).is_err());
    }
}
