//! A loaded, verified, immutable model artifact

use std::fmt::Display;
use std::fs;
use std::path::Path;

use burn::tensor::{Tensor, TensorData};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use super::format::decode;
use super::header::ArtifactHeader;
use crate::backend::{backend_name, default_device, InferenceBackend, InferenceDevice};
use crate::model::frozen::tensor_values;
use crate::model::{ClassifierLayout, FrozenClassifier};
use crate::preprocess::{ImageInput, InputShape, Normalization, Preprocessor, ResizePolicy};
use crate::utils::error::{EdgeError, Result};

/// Model weights plus everything needed to use them
///
/// Never mutated after construction; share it behind an `Arc`.
#[derive(Debug)]
pub struct ModelArtifact {
    origin: String,
    size_bytes: u64,
    header: ArtifactHeader,
    model: FrozenClassifier,
    preprocessor: Preprocessor,
    device: InferenceDevice,
}

impl ModelArtifact {
    /// Read and verify an artifact file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let origin = path.display().to_string();

        let bytes = fs::read(path).map_err(|e| EdgeError::artifact(&origin, e.to_string()))?;
        let artifact = Self::from_bytes(&bytes, &origin)?;

        info!(
            "Loaded artifact '{}' v{} from {} ({} classes, input {}, backend {})",
            artifact.header.name,
            artifact.header.version,
            origin,
            artifact.num_classes(),
            artifact.input_shape(),
            backend_name()
        );
        Ok(artifact)
    }

    /// Verify and load an artifact held in memory
    pub fn from_bytes(bytes: &[u8], origin: impl Display) -> Result<Self> {
        let origin = origin.to_string();
        let (header, model) = decode(bytes, &origin)?;

        let preprocessor = Preprocessor::new(
            header.input,
            header.normalization.clone(),
            header.resize,
        );

        Ok(Self {
            origin,
            size_bytes: bytes.len() as u64,
            header,
            model,
            preprocessor,
            device: default_device(),
        })
    }

    pub fn header(&self) -> &ArtifactHeader {
        &self.header
    }

    pub fn labels(&self) -> &[String] {
        &self.header.labels
    }

    pub fn num_classes(&self) -> usize {
        self.header.labels.len()
    }

    pub fn input_shape(&self) -> InputShape {
        self.header.input
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Class probabilities for each input, one row per input
    pub fn forward(&self, inputs: &[ImageInput]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let shape = self.input_shape();
        let mut data = Vec::with_capacity(inputs.len() * shape.num_values());
        for input in inputs {
            input.ensure_shape(&shape)?;
            data.extend_from_slice(input.data());
        }

        let [c, h, w] = shape.chw();
        let batch = Tensor::<InferenceBackend, 4>::from_data(
            TensorData::new(data, [inputs.len(), c, h, w]),
            &self.device,
        );

        let probs = tensor_values(self.model.forward(batch))?;
        Ok(probs
            .chunks(self.num_classes())
            .map(|row| row.to_vec())
            .collect())
    }

    /// Summary for `inspect` and `GET /model`
    pub fn info(&self) -> ArtifactInfo {
        ArtifactInfo {
            name: self.header.name.clone(),
            version: self.header.version.clone(),
            created_at: self.header.created_at,
            origin: self.origin.clone(),
            size_bytes: self.size_bytes,
            labels: self.header.labels.clone(),
            input: self.header.input,
            normalization: self.header.normalization.clone(),
            resize: self.header.resize,
            architecture: self.header.architecture,
            num_parameters: self.header.architecture.num_parameters(),
            payload_sha256: self.header.payload_sha256.clone(),
            backend: backend_name().to_string(),
        }
    }
}

/// Serializable description of a loaded artifact
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactInfo {
    pub name: String,
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub origin: String,
    pub size_bytes: u64,
    pub labels: Vec<String>,
    pub input: InputShape,
    pub normalization: Normalization,
    pub resize: ResizePolicy,
    pub architecture: ClassifierLayout,
    pub num_parameters: usize,
    pub payload_sha256: String,
    pub backend: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::small_artifact_bytes;

    fn artifact() -> ModelArtifact {
        ModelArtifact::from_bytes(&small_artifact_bytes(&["a", "b", "c"], 32), "memory").unwrap()
    }

    #[test]
    fn test_missing_file_is_artifact_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModelArtifact::load(dir.path().join("nope.rclf")).unwrap_err();
        assert!(matches!(err, EdgeError::ArtifactLoad { .. }));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.rclf");
        fs::write(&path, small_artifact_bytes(&["a", "b"], 32)).unwrap();

        let artifact = ModelArtifact::load(&path).unwrap();
        assert_eq!(artifact.labels(), &["a".to_string(), "b".to_string()]);
        assert_eq!(artifact.origin(), path.display().to_string());
    }

    #[test]
    fn test_forward_rows_are_distributions() {
        let artifact = artifact();
        let inputs = vec![
            ImageInput::filled(artifact.input_shape(), 0.0),
            ImageInput::filled(artifact.input_shape(), 1.0),
        ];

        let rows = artifact.forward(&inputs).unwrap();
        assert_eq!(rows.len(), 2);
        for row in rows {
            assert_eq!(row.len(), 3);
            assert!((row.iter().sum::<f32>() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_forward_rejects_wrong_shape() {
        let artifact = artifact();
        let input = ImageInput::filled(InputShape::rgb(10, 10), 0.0);
        assert!(matches!(
            artifact.forward(&[input]),
            Err(EdgeError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_info_reports_header() {
        let info = artifact().info();
        assert_eq!(info.labels.len(), 3);
        assert_eq!(info.input, InputShape::rgb(32, 32));
        assert_eq!(info.num_parameters, info.architecture.num_parameters());
        assert!(info.size_bytes > 0);
    }
}
