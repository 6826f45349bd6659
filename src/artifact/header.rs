//! JSON header of a model artifact

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{checked_product, ClassifierLayout};
use crate::preprocess::{InputShape, Normalization, ResizePolicy};

/// How tensor values are stored in the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantizationScheme {
    /// Per-tensor symmetric int8: `w = q * scale`
    Int8Symmetric,
}

/// Location and scale of one tensor in the payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorEntry {
    pub name: String,
    pub shape: Vec<usize>,
    pub scale: f32,
}

impl TensorEntry {
    /// Number of values in the tensor, `None` if the shape overflows
    pub fn num_values(&self) -> Option<usize> {
        checked_product(&self.shape)
    }
}

/// Everything an artifact declares besides the raw weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactHeader {
    pub name: String,
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub input: InputShape,
    pub normalization: Normalization,
    pub resize: ResizePolicy,
    /// Index i of the model output corresponds to `labels[i]`
    pub labels: Vec<String>,
    pub architecture: ClassifierLayout,
    pub quantization: QuantizationScheme,
    pub tensors: Vec<TensorEntry>,
    /// Lowercase hex SHA-256 of the payload bytes
    pub payload_sha256: String,
}

impl ArtifactHeader {
    /// Number of payload bytes the tensor table describes
    pub fn payload_len(&self) -> Option<usize> {
        self.tensors
            .iter()
            .try_fold(0usize, |total, entry| total.checked_add(entry.num_values()?))
    }

    /// Check internal consistency; does not look at the payload
    pub fn validate(&self) -> Result<(), String> {
        self.input.validate()?;
        self.normalization.validate(self.input.channels)?;
        self.resize.validate()?;
        self.architecture.validate()?;
        self.validate_labels()?;

        if self.architecture.in_channels != self.input.channels as usize {
            return Err(format!(
                "architecture expects {} input channels but input shape is {}",
                self.architecture.in_channels, self.input
            ));
        }

        let expected = self.architecture.tensor_shapes();
        if expected.len() != self.tensors.len() {
            return Err(format!(
                "header lists {} tensors, architecture needs {}",
                self.tensors.len(),
                expected.len()
            ));
        }
        for (entry, (name, shape)) in self.tensors.iter().zip(&expected) {
            if &entry.name != name || &entry.shape != shape {
                return Err(format!(
                    "tensor entry {} {:?} does not match architecture ({} {:?})",
                    entry.name, entry.shape, name, shape
                ));
            }
            if !entry.scale.is_finite() || entry.scale <= 0.0 {
                return Err(format!("tensor {} has invalid scale {}", entry.name, entry.scale));
            }
        }

        Ok(())
    }

    fn validate_labels(&self) -> Result<(), String> {
        if self.labels.is_empty() {
            return Err("label list is empty".to_string());
        }
        if self.labels.len() != self.architecture.num_classes {
            return Err(format!(
                "{} labels for a model with {} classes",
                self.labels.len(),
                self.architecture.num_classes
            ));
        }

        let mut seen = HashSet::new();
        for label in &self.labels {
            if label.trim().is_empty() {
                return Err("labels must not be blank".to_string());
            }
            if !seen.insert(label.as_str()) {
                return Err(format!("duplicate label '{}'", label));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(labels: &[&str]) -> ArtifactHeader {
        let architecture = ClassifierLayout {
            in_channels: 3,
            base_filters: 2,
            hidden_units: 4,
            num_classes: labels.len(),
        };
        let tensors = architecture
            .tensor_shapes()
            .into_iter()
            .map(|(name, shape)| TensorEntry {
                name,
                shape,
                scale: 0.01,
            })
            .collect();

        ArtifactHeader {
            name: "test".to_string(),
            version: "1.0.0".to_string(),
            created_at: Utc::now(),
            input: InputShape::rgb(32, 32),
            normalization: Normalization::ZeroOne,
            resize: ResizePolicy::default(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            architecture,
            quantization: QuantizationScheme::Int8Symmetric,
            tensors,
            payload_sha256: String::new(),
        }
    }

    #[test]
    fn test_valid_header() {
        let header = header(&["glass", "metal"]);
        assert!(header.validate().is_ok());
        assert_eq!(header.payload_len(), Some(header.architecture.num_parameters()));
    }

    #[test]
    fn test_label_count_must_match_classes() {
        let mut header = header(&["glass", "metal"]);
        header.labels.push("paper".to_string());
        assert!(header.validate().unwrap_err().contains("3 labels"));
    }

    #[test]
    fn test_duplicate_and_blank_labels_rejected() {
        assert!(header(&["glass", "glass"]).validate().is_err());
        assert!(header(&["glass", " "]).validate().is_err());
    }

    #[test]
    fn test_channel_disagreement_rejected() {
        let mut header = header(&["glass", "metal"]);
        header.input = InputShape::new(32, 32, 1);
        assert!(header.validate().is_err());
    }

    #[test]
    fn test_unpoolable_input_rejected() {
        let mut header = header(&["glass", "metal"]);
        header.input = InputShape::rgb(4, 4);
        assert!(header.validate().unwrap_err().contains("4x4x3"));
    }

    #[test]
    fn test_overflowing_shapes_do_not_panic() {
        let mut header = header(&["glass", "metal"]);
        header.tensors[0].shape = vec![usize::MAX, usize::MAX, 3, 3];
        assert_eq!(header.payload_len(), None);
        assert!(header.validate().is_err());

        let mut header = self::header(&["glass", "metal"]);
        header.architecture.base_filters = usize::MAX / 2;
        assert!(header.validate().unwrap_err().contains("base_filters"));
    }

    #[test]
    fn test_header_json_uses_snake_case_tags() {
        let json = serde_json::to_string(&header(&["glass"])).unwrap();
        assert!(json.contains("\"int8_symmetric\""));
        assert!(json.contains("\"kind\":\"zero_one\""));
        assert!(json.contains("\"kind\":\"bilinear\""));
    }
}
