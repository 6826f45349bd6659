//! Export batch job: checkpoint + manifest → quantized artifact

use std::path::PathBuf;

use burn::{module::Module, record::CompactRecorder};
use serde::Serialize;
use tracing::{debug, info};

use crate::artifact::{ArtifactWriter, QuantizationReport, EXTENSION};
use crate::backend::{default_device, InferenceBackend};
use crate::model::{FrozenClassifier, RecycleClassifier};
use crate::training::{TrainingManifest, CHECKPOINT_NAME, MANIFEST_NAME};
use crate::utils::error::{EdgeError, Result};

/// Export configuration
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Directory written by `train` (holds `model.mpk` and `training.json`)
    pub training_dir: PathBuf,
    /// Artifact file to create; `.rclf` is appended when it has no extension
    pub output: PathBuf,
    pub name: String,
    pub version: String,
}

impl ExportConfig {
    pub fn new(training_dir: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        let mut output = output.into();
        if output.extension().is_none() {
            output.set_extension(EXTENSION);
        }
        Self {
            training_dir: training_dir.into(),
            output,
            name: "recycle-classifier".to_string(),
            version: crate::VERSION.to_string(),
        }
    }
}

/// Summary of a finished export
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub artifact: PathBuf,
    pub size_bytes: usize,
    pub labels: Vec<String>,
    pub num_parameters: usize,
    pub payload_sha256: String,
    pub max_abs_error: f32,
    pub quantization: QuantizationReport,
}

/// Load a training checkpoint, freeze it, quantize it and write the artifact
pub fn export_checkpoint(config: &ExportConfig) -> Result<ExportReport> {
    let manifest_path = config.training_dir.join(MANIFEST_NAME);
    let checkpoint = config.training_dir.join(CHECKPOINT_NAME);

    let manifest = TrainingManifest::load(&manifest_path).map_err(|e| {
        EdgeError::Export(format!("cannot read manifest {:?}: {}", manifest_path, e))
    })?;
    info!(
        "Exporting checkpoint {:?} ({} labels, best epoch {})",
        checkpoint,
        manifest.labels.len(),
        manifest.best_epoch
    );

    let device = default_device();
    let model_config = manifest.model_config();
    let model: RecycleClassifier<InferenceBackend> = model_config
        .init(&device)
        .load_file(checkpoint.clone(), &CompactRecorder::new(), &device)
        .map_err(|e| EdgeError::Export(format!("cannot load checkpoint {:?}: {:?}", checkpoint, e)))?;

    let frozen = FrozenClassifier::from_model(&model, model_config.layout())?;

    let encoded = ArtifactWriter::new(manifest.labels.clone(), manifest.input)
        .with_name(config.name.clone())
        .with_version(config.version.clone())
        .with_normalization(manifest.normalization.clone())
        .with_resize(manifest.resize)
        .write(&config.output, &frozen)?;

    for tensor in &encoded.report.tensors {
        debug!(
            "  {:<12} {:>7} values  scale {:.6}  max err {:.6}",
            tensor.name, tensor.num_values, tensor.scale, tensor.max_abs_error
        );
    }

    Ok(ExportReport {
        artifact: config.output.clone(),
        size_bytes: encoded.bytes.len(),
        labels: encoded.header.labels.clone(),
        num_parameters: encoded.report.num_parameters(),
        payload_sha256: encoded.header.payload_sha256.clone(),
        max_abs_error: encoded.report.max_abs_error(),
        quantization: encoded.report,
    })
}
