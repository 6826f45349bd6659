//! Supervised Training Implementation
//!
//! A custom Adam + cross-entropy loop rather than Burn's LearnerBuilder. The
//! best model by validation accuracy is kept as the checkpoint.

use std::path::PathBuf;

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    module::{AutodiffModule, Module},
    nn::loss::CrossEntropyLossConfig,
    optim::{decay::WeightDecayConfig, AdamConfig, GradientsParams, Optimizer},
    record::CompactRecorder,
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor,
    },
};
use chrono::Utc;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use super::{EpochRecord, TrainingConfig, TrainingManifest};
use crate::dataset::{
    ClassifierBatch, ClassifierBatcher, ClassifierItem, DatasetSplits, ImageFolder, ImageFolderDataset,
    SplitConfig,
};
use crate::model::RecycleClassifier;
use crate::preprocess::{Preprocessor, ResizePolicy};
use crate::utils::error::{EdgeError, Result};
use crate::utils::logging::TrainingLogger;

/// What a finished training run produced
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    /// Checkpoint path without the `.mpk` extension
    pub checkpoint: PathBuf,
    pub manifest_path: PathBuf,
    pub manifest: TrainingManifest,
}

/// Run training with the given configuration
///
/// # Type Parameters
/// * `B` - The autodiff backend to use (e.g., `Autodiff<NdArray>` or `Autodiff<Cuda>`)
pub fn run_training<B: AutodiffBackend>(
    config: &TrainingConfig,
    device: &B::Device,
) -> Result<TrainingOutcome> {
    config.validate()?;
    std::fs::create_dir_all(&config.output_dir)?;

    let folder = ImageFolder::new(&config.data_dir)?;
    if folder.num_classes() < 2 {
        return Err(EdgeError::Dataset(
            "at least two class directories are needed".to_string(),
        ));
    }

    let mut samples = folder.samples.clone();
    if let Some(max) = config.max_samples {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        samples.shuffle(&mut rng);
        samples.truncate(max);
    }

    let split_config = SplitConfig::new(config.validation_fraction, config.seed)?;
    let splits = DatasetSplits::stratified(&samples, &split_config)?;
    info!(
        "Stratified split: {} training / {} validation samples",
        splits.train.len(),
        splits.validation.len()
    );

    let preprocessor = Preprocessor::new(
        config.input_shape(),
        config.normalization.clone(),
        ResizePolicy::default(),
    );
    let train_dataset = ImageFolderDataset::load(&splits.train, &preprocessor)?;
    let val_dataset = ImageFolderDataset::load(&splits.validation, &preprocessor)?;

    let model_config = config.model_config(folder.num_classes());
    let mut model: RecycleClassifier<B> = model_config.init(device);
    let batcher = ClassifierBatcher::new(config.input_shape());

    let mut optimizer = AdamConfig::new()
        .with_weight_decay(Some(WeightDecayConfig::new(config.weight_decay)))
        .init();
    let loss_fn = CrossEntropyLossConfig::new().init(device);

    let recorder = CompactRecorder::new();
    let checkpoint = config.checkpoint_path();
    let mut logger = TrainingLogger::new(config.epochs);
    let mut epoch_rng = ChaCha8Rng::seed_from_u64(config.seed);

    let mut history = Vec::with_capacity(config.epochs);
    let mut best: Option<(usize, f64)> = None;

    for epoch in 0..config.epochs {
        logger.start_epoch(epoch);

        let mut indices: Vec<usize> = (0..train_dataset.len()).collect();
        indices.shuffle(&mut epoch_rng);

        let mut epoch_loss = 0.0f64;
        let mut correct = 0usize;
        let mut seen = 0usize;
        let mut num_batches = 0usize;

        for chunk in indices.chunks(config.batch_size) {
            let items: Vec<ClassifierItem> =
                chunk.iter().filter_map(|&i| train_dataset.get(i)).collect();
            if items.is_empty() {
                continue;
            }

            let batch: ClassifierBatch<B> = batcher.batch(items, device);
            let batch_size = batch.targets.dims()[0];

            let output = model.forward(batch.images);
            let loss = loss_fn.forward(output.clone(), batch.targets.clone());

            let loss_value: f64 = loss.clone().into_scalar().elem();
            epoch_loss += loss_value;
            correct += count_correct(output, batch.targets);
            seen += batch_size;
            num_batches += 1;

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optimizer.step(config.learning_rate, model, grads);

            debug!("  Batch {}: loss = {:.4}", num_batches, loss_value);
        }

        let train_loss = epoch_loss / num_batches.max(1) as f64;
        let train_accuracy = correct as f64 / seen.max(1) as f64;

        // Without a validation set the training accuracy stands in
        let val_accuracy = if val_dataset.is_empty() {
            train_accuracy
        } else {
            evaluate(&model.valid(), &val_dataset, &batcher, config.batch_size)
        };

        logger.end_epoch(train_loss, train_accuracy, val_accuracy);
        history.push(EpochRecord {
            epoch: epoch + 1,
            train_loss,
            train_accuracy,
            val_accuracy,
        });

        let improved = best.map_or(true, |(_, acc)| val_accuracy > acc);
        if improved {
            best = Some((epoch + 1, val_accuracy));
            logger.log_new_best(val_accuracy);
            model
                .clone()
                .save_file(checkpoint.clone(), &recorder)
                .map_err(|e| EdgeError::Training(format!("Failed to save model: {:?}", e)))?;
        }
    }

    let (best_epoch, best_val_accuracy) = best.unwrap_or((0, 0.0));
    logger.log_complete(best_val_accuracy);

    let manifest = TrainingManifest {
        labels: folder.labels.clone(),
        input: config.input_shape(),
        normalization: config.normalization.clone(),
        resize: ResizePolicy::default(),
        layout: model_config.layout(),
        config: config.clone(),
        history,
        best_epoch,
        best_val_accuracy,
        created_at: Utc::now(),
    };
    let manifest_path = config.manifest_path();
    manifest.save(&manifest_path)?;
    info!("Saved checkpoint {:?} and manifest {:?}", checkpoint, manifest_path);

    Ok(TrainingOutcome {
        checkpoint,
        manifest_path,
        manifest,
    })
}

/// Number of rows whose argmax equals the target
fn count_correct<B: Backend>(output: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let [batch_size, _] = output.dims();
    let predictions = output.argmax(1).reshape([batch_size]);
    let correct: i64 = predictions.equal(targets).int().sum().into_scalar().elem();
    correct as usize
}

/// Accuracy of the model on a dataset, in [0, 1]
fn evaluate<B: Backend>(
    model: &RecycleClassifier<B>,
    dataset: &ImageFolderDataset,
    batcher: &ClassifierBatcher,
    batch_size: usize,
) -> f64 {
    let device = model.devices().into_iter().next().unwrap_or_default();
    let len = dataset.len();
    let mut correct = 0usize;
    let mut total = 0usize;

    for start in (0..len).step_by(batch_size) {
        let end = (start + batch_size).min(len);
        let items: Vec<_> = (start..end).filter_map(|i| dataset.get(i)).collect();
        if items.is_empty() {
            continue;
        }

        let batch: ClassifierBatch<B> = batcher.batch(items, &device);
        total += batch.targets.dims()[0];
        correct += count_correct(model.forward(batch.images), batch.targets);
    }

    if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64
    }
}
