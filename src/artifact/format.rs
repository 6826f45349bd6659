//! Binary artifact codec
//!
//! ```text
//! offset 0    magic  b"RCLF"
//! offset 4    u32 LE format version
//! offset 8    u32 LE header length N
//! offset 12   N bytes of JSON header
//! offset 12+N int8 payload, tensors concatenated in header order
//! ```

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::header::{ArtifactHeader, QuantizationScheme};
use super::quantize::{quantize, QuantizationReport, QuantizedTensor};
use super::{FORMAT_VERSION, MAGIC};
use crate::model::{FrozenClassifier, NamedTensor};
use crate::preprocess::{InputShape, Normalization, ResizePolicy};
use crate::utils::error::{EdgeError, Result};

const PREAMBLE_LEN: usize = 12;

/// Hex SHA-256 of a byte slice
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Result of encoding a model
#[derive(Debug, Clone)]
pub struct EncodedArtifact {
    pub header: ArtifactHeader,
    pub bytes: Vec<u8>,
    pub report: QuantizationReport,
}

/// Quantizes frozen weights and serializes them together with their metadata
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    name: String,
    version: String,
    labels: Vec<String>,
    input: InputShape,
    normalization: Normalization,
    resize: ResizePolicy,
    created_at: Option<DateTime<Utc>>,
}

impl ArtifactWriter {
    pub fn new(labels: Vec<String>, input: InputShape) -> Self {
        Self {
            name: "recycle-classifier".to_string(),
            version: crate::VERSION.to_string(),
            labels,
            input,
            normalization: Normalization::default(),
            resize: ResizePolicy::default(),
            created_at: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }

    pub fn with_resize(mut self, resize: ResizePolicy) -> Self {
        self.resize = resize;
        self
    }

    /// Fix the creation timestamp (reproducible builds); defaults to now
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Quantize and serialize `model`
    pub fn encode(&self, model: &FrozenClassifier) -> Result<EncodedArtifact> {
        let mut report = QuantizationReport::default();
        let mut quantized: Vec<QuantizedTensor> = Vec::new();

        for tensor in model.to_tensors() {
            let q = quantize(&tensor)?;
            report.record(&tensor, &q);
            quantized.push(q);
        }

        let payload: Vec<u8> = quantized
            .iter()
            .flat_map(|q| q.values.iter().map(|&v| v as u8))
            .collect();

        let header = ArtifactHeader {
            name: self.name.clone(),
            version: self.version.clone(),
            created_at: self.created_at.unwrap_or_else(Utc::now),
            input: self.input,
            normalization: self.normalization.clone(),
            resize: self.resize,
            labels: self.labels.clone(),
            architecture: model.layout(),
            quantization: QuantizationScheme::Int8Symmetric,
            tensors: quantized.iter().map(QuantizedTensor::entry).collect(),
            payload_sha256: sha256_hex(&payload),
        };
        header.validate().map_err(EdgeError::Export)?;

        let header_json = serde_json::to_vec(&header)?;
        let header_len = u32::try_from(header_json.len())
            .map_err(|_| EdgeError::Export("header too large".to_string()))?;

        let mut bytes = Vec::with_capacity(PREAMBLE_LEN + header_json.len() + payload.len());
        bytes.extend_from_slice(&MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&header_len.to_le_bytes());
        bytes.extend_from_slice(&header_json);
        bytes.extend_from_slice(&payload);

        debug!(
            "Encoded artifact '{}': {} tensors, {} payload bytes",
            header.name,
            header.tensors.len(),
            payload.len()
        );

        Ok(EncodedArtifact {
            header,
            bytes,
            report,
        })
    }

    pub fn to_bytes(&self, model: &FrozenClassifier) -> Result<Vec<u8>> {
        Ok(self.encode(model)?.bytes)
    }

    /// Encode `model` and write it to `path`, creating parent directories
    pub fn write(&self, path: impl AsRef<Path>, model: &FrozenClassifier) -> Result<EncodedArtifact> {
        let path = path.as_ref();
        let encoded = self.encode(model)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, &encoded.bytes)?;

        info!(
            "Wrote artifact {:?} ({} bytes, max quantization error {:.6})",
            path,
            encoded.bytes.len(),
            encoded.report.max_abs_error()
        );
        Ok(encoded)
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

/// Parse and verify artifact bytes
///
/// Every failure is reported as `ArtifactLoad` naming `origin`.
pub fn decode(bytes: &[u8], origin: &str) -> Result<(ArtifactHeader, FrozenClassifier)> {
    let fail = |reason: String| EdgeError::artifact(origin, reason);

    if bytes.len() < PREAMBLE_LEN {
        return Err(fail(format!("file is only {} bytes long", bytes.len())));
    }
    if bytes[0..4] != MAGIC {
        return Err(fail("not a classifier artifact (bad magic)".to_string()));
    }

    let version = read_u32(bytes, 4);
    if version != FORMAT_VERSION {
        return Err(fail(format!(
            "unsupported format version {} (expected {})",
            version, FORMAT_VERSION
        )));
    }

    let header_len = read_u32(bytes, 8) as usize;
    let header_end = PREAMBLE_LEN
        .checked_add(header_len)
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| fail("truncated header".to_string()))?;

    let header: ArtifactHeader = serde_json::from_slice(&bytes[PREAMBLE_LEN..header_end])
        .map_err(|e| fail(format!("malformed header: {}", e)))?;
    header.validate().map_err(|e| fail(format!("invalid header: {}", e)))?;

    let payload = &bytes[header_end..];
    let expected_len = header
        .payload_len()
        .ok_or_else(|| fail("tensor table overflows".to_string()))?;
    if payload.len() != expected_len {
        return Err(fail(format!(
            "payload is {} bytes, header describes {}",
            payload.len(),
            expected_len
        )));
    }

    let digest = sha256_hex(payload);
    if digest != header.payload_sha256 {
        return Err(fail("payload checksum mismatch".to_string()));
    }

    let mut offset = 0;
    let mut tensors: Vec<NamedTensor> = Vec::with_capacity(header.tensors.len());
    for entry in &header.tensors {
        let len = entry
            .num_values()
            .ok_or_else(|| fail(format!("tensor {} overflows", entry.name)))?;
        let quantized = QuantizedTensor {
            name: entry.name.clone(),
            shape: entry.shape.clone(),
            scale: entry.scale,
            values: payload[offset..offset + len].iter().map(|&b| b as i8).collect(),
        };
        tensors.push(quantized.dequantize());
        offset += len;
    }

    let model = FrozenClassifier::from_tensors(header.architecture, tensors).map_err(fail)?;
    Ok((header, model))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::small_model;

    fn writer() -> ArtifactWriter {
        ArtifactWriter::new(
            vec!["glass".to_string(), "metal".to_string(), "paper".to_string()],
            InputShape::rgb(32, 32),
        )
        .with_name("unit")
    }

    fn encoded() -> Vec<u8> {
        writer().to_bytes(&small_model(3, 3)).unwrap()
    }

    fn reason(err: EdgeError) -> String {
        match err {
            EdgeError::ArtifactLoad { reason, .. } => reason,
            other => panic!("expected ArtifactLoad, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_restores_header_and_weights() {
        let model = small_model(3, 3);
        let encoded = writer().encode(&model).unwrap();
        let (header, decoded) = decode(&encoded.bytes, "memory").unwrap();

        assert_eq!(header, encoded.header);
        assert_eq!(header.labels.len(), 3);
        assert_eq!(decoded.layout(), model.layout());

        // Weights come back within half a quantization step
        for ((original, restored), entry) in model
            .to_tensors()
            .iter()
            .zip(decoded.to_tensors())
            .zip(&header.tensors)
        {
            for (a, b) in original.values.iter().zip(&restored.values) {
                assert!((a - b).abs() <= entry.scale / 2.0 + 1e-6);
            }
        }
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = encoded();
        bytes[0] = b'X';
        assert!(reason(decode(&bytes, "m").unwrap_err()).contains("magic"));
    }

    #[test]
    fn test_unknown_version() {
        let mut bytes = encoded();
        bytes[4..8].copy_from_slice(&99u32.to_le_bytes());
        assert!(reason(decode(&bytes, "m").unwrap_err()).contains("version 99"));
    }

    #[test]
    fn test_truncated_payload() {
        let bytes = encoded();
        let err = decode(&bytes[..bytes.len() - 5], "m").unwrap_err();
        assert!(reason(err).contains("payload"));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = encoded();
        bytes.push(0);
        assert!(decode(&bytes, "m").is_err());
    }

    #[test]
    fn test_corrupted_payload_fails_checksum() {
        let mut bytes = encoded();
        let last = bytes.len() - 1;
        bytes[last] = bytes[last].wrapping_add(1);
        assert!(reason(decode(&bytes, "m").unwrap_err()).contains("checksum"));
    }

    #[test]
    fn test_header_length_past_end() {
        let mut bytes = encoded();
        bytes[8..12].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(reason(decode(&bytes, "m").unwrap_err()).contains("truncated"));
    }

    #[test]
    fn test_tiny_input() {
        assert!(decode(b"RCLF", "m").is_err());
        assert!(decode(b"", "m").is_err());
    }

    #[test]
    fn test_writer_rejects_label_count_mismatch() {
        let err = writer().encode(&small_model(3, 4)).unwrap_err();
        assert!(matches!(err, EdgeError::Export(_)));
    }

    #[test]
    fn test_write_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("model.rclf");

        let encoded = writer().write(&path, &small_model(3, 3)).unwrap();
        assert_eq!(fs::read(&path).unwrap(), encoded.bytes);
    }
}
