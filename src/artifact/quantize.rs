//! Symmetric per-tensor int8 quantization

use serde::Serialize;

use super::header::TensorEntry;
use crate::model::NamedTensor;
use crate::utils::error::{EdgeError, Result};

/// Largest magnitude a quantized value may take
pub const QMAX: f32 = 127.0;

/// An int8 tensor plus the scale that maps it back to f32
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedTensor {
    pub name: String,
    pub shape: Vec<usize>,
    pub scale: f32,
    pub values: Vec<i8>,
}

impl QuantizedTensor {
    /// Back to f32: `w = q * scale`
    pub fn dequantize(&self) -> NamedTensor {
        let values = self.values.iter().map(|&q| q as f32 * self.scale).collect();
        NamedTensor::new(self.name.clone(), self.shape.clone(), values)
    }

    pub fn entry(&self) -> TensorEntry {
        TensorEntry {
            name: self.name.clone(),
            shape: self.shape.clone(),
            scale: self.scale,
        }
    }
}

/// Quantize a tensor with `scale = max|w| / 127`
///
/// All-zero tensors get `scale = 1` so that dequantization stays well defined.
pub fn quantize(tensor: &NamedTensor) -> Result<QuantizedTensor> {
    if let Some(bad) = tensor.values.iter().find(|v| !v.is_finite()) {
        return Err(EdgeError::Export(format!(
            "tensor '{}' contains non-finite value {}",
            tensor.name, bad
        )));
    }

    let max_abs = tensor.values.iter().fold(0.0f32, |acc, v| acc.max(v.abs()));
    let scale = if max_abs > 0.0 { max_abs / QMAX } else { 1.0 };

    let values = tensor
        .values
        .iter()
        .map(|&w| (w / scale).round().clamp(-QMAX, QMAX) as i8)
        .collect();

    Ok(QuantizedTensor {
        name: tensor.name.clone(),
        shape: tensor.shape.clone(),
        scale,
        values,
    })
}

/// Reconstruction error of one tensor
#[derive(Debug, Clone, Serialize)]
pub struct TensorError {
    pub name: String,
    pub num_values: usize,
    pub scale: f32,
    pub max_abs_error: f32,
    pub mean_abs_error: f32,
}

/// Per-tensor quantization error for a whole model
#[derive(Debug, Clone, Default, Serialize)]
pub struct QuantizationReport {
    pub tensors: Vec<TensorError>,
}

impl QuantizationReport {
    pub fn record(&mut self, original: &NamedTensor, quantized: &QuantizedTensor) {
        let restored = quantized.dequantize();
        let mut max_abs_error = 0.0f32;
        let mut total = 0.0f64;

        for (a, b) in original.values.iter().zip(&restored.values) {
            let err = (a - b).abs();
            max_abs_error = max_abs_error.max(err);
            total += err as f64;
        }

        let n = original.values.len().max(1);
        self.tensors.push(TensorError {
            name: original.name.clone(),
            num_values: original.values.len(),
            scale: quantized.scale,
            max_abs_error,
            mean_abs_error: (total / n as f64) as f32,
        });
    }

    pub fn num_parameters(&self) -> usize {
        self.tensors.iter().map(|t| t.num_values).sum()
    }

    /// Worst absolute error over all tensors
    pub fn max_abs_error(&self) -> f32 {
        self.tensors
            .iter()
            .map(|t| t.max_abs_error)
            .fold(0.0, f32::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_and_extremes() {
        let tensor = NamedTensor::new("w", vec![4], vec![-2.54, 0.0, 1.0, 2.54]);
        let q = quantize(&tensor).unwrap();

        assert!((q.scale - 0.02).abs() < 1e-6);
        assert_eq!(q.values, vec![-127, 0, 50, 127]);
    }

    #[test]
    fn test_error_bounded_by_half_scale() {
        let values: Vec<f32> = (0..200).map(|i| ((i as f32) * 0.731).sin() * 0.4).collect();
        let tensor = NamedTensor::new("w", vec![10, 20], values);
        let q = quantize(&tensor).unwrap();

        let mut report = QuantizationReport::default();
        report.record(&tensor, &q);

        assert_eq!(report.num_parameters(), 200);
        assert!(report.max_abs_error() <= q.scale / 2.0 + 1e-6);
    }

    #[test]
    fn test_all_zero_tensor() {
        let tensor = NamedTensor::new("b", vec![3], vec![0.0; 3]);
        let q = quantize(&tensor).unwrap();

        assert_eq!(q.scale, 1.0);
        assert_eq!(q.dequantize().values, vec![0.0; 3]);
    }

    #[test]
    fn test_non_finite_rejected() {
        let tensor = NamedTensor::new("w", vec![2], vec![1.0, f32::NAN]);
        assert!(matches!(quantize(&tensor), Err(EdgeError::Export(_))));
    }
}
