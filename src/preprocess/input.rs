//! Input tensors accepted by the classifier

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::utils::error::{EdgeError, Result};

/// Smallest accepted input side; the classifier halves each side three times
pub const MIN_INPUT_SIDE: u32 = 1 << 3;

/// Largest accepted input side
pub const MAX_INPUT_SIDE: u32 = 4096;

/// Spatial and channel shape of a classifier input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputShape {
    pub width: u32,
    pub height: u32,
    /// 1 (grayscale) or 3 (RGB)
    pub channels: u32,
}

impl InputShape {
    pub fn new(width: u32, height: u32, channels: u32) -> Self {
        Self {
            width,
            height,
            channels,
        }
    }

    /// RGB shape of the given size
    pub fn rgb(width: u32, height: u32) -> Self {
        Self::new(width, height, 3)
    }

    /// Number of f32 values in a CHW tensor of this shape
    pub fn num_values(&self) -> usize {
        self.channels as usize * self.height as usize * self.width as usize
    }

    /// Dimensions in CHW order
    pub fn chw(&self) -> [usize; 3] {
        [
            self.channels as usize,
            self.height as usize,
            self.width as usize,
        ]
    }

    /// Check that the shape is usable as a model input
    pub fn validate(&self) -> std::result::Result<(), String> {
        let side = MIN_INPUT_SIDE..=MAX_INPUT_SIDE;
        if !side.contains(&self.width) || !side.contains(&self.height) {
            return Err(format!(
                "input shape {} must be between {} and {} pixels per side",
                self, MIN_INPUT_SIDE, MAX_INPUT_SIDE
            ));
        }
        if self.channels != 1 && self.channels != 3 {
            return Err(format!(
                "input shape {} must have 1 or 3 channels",
                self
            ));
        }
        Ok(())
    }
}

impl fmt::Display for InputShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.channels)
    }
}

/// A preprocessed image: normalized float values in CHW layout
///
/// An `ImageInput` always holds exactly `shape.num_values()` values; whether
/// that shape matches a particular artifact is checked with [`ImageInput::ensure_shape`].
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInput {
    shape: InputShape,
    data: Vec<f32>,
}

impl ImageInput {
    /// Wrap an already normalized CHW buffer
    pub fn from_raw(shape: InputShape, data: Vec<f32>) -> Result<Self> {
        if data.len() != shape.num_values() {
            return Err(EdgeError::Preprocess(format!(
                "buffer holds {} values but shape {} needs {}",
                data.len(),
                shape,
                shape.num_values()
            )));
        }
        Ok(Self { shape, data })
    }

    /// An input filled with a constant value (benchmarks, warmup)
    pub fn filled(shape: InputShape, value: f32) -> Self {
        Self {
            shape,
            data: vec![value; shape.num_values()],
        }
    }

    pub fn shape(&self) -> InputShape {
        self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Reject inputs whose shape differs from `expected`
    pub fn ensure_shape(&self, expected: &InputShape) -> Result<()> {
        if &self.shape != expected {
            return Err(EdgeError::ShapeMismatch {
                expected: *expected,
                actual: self.shape,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_values_and_display() {
        let shape = InputShape::rgb(224, 224);
        assert_eq!(shape.num_values(), 3 * 224 * 224);
        assert_eq!(shape.chw(), [3, 224, 224]);
        assert_eq!(shape.to_string(), "224x224x3");
    }

    #[test]
    fn test_shape_validation() {
        assert!(InputShape::rgb(32, 32).validate().is_ok());
        assert!(InputShape::new(32, 32, 1).validate().is_ok());
        assert!(InputShape::new(32, 32, 4).validate().is_err());
        assert!(InputShape::rgb(0, 32).validate().is_err());
        assert!(InputShape::rgb(8, 8).validate().is_ok());
        assert!(InputShape::rgb(4, 4).validate().is_err());
        assert!(InputShape::rgb(32, 7).validate().is_err());
        assert!(InputShape::rgb(4096, 4096).validate().is_ok());
        assert!(InputShape::rgb(4097, 32).validate().is_err());
    }

    #[test]
    fn test_from_raw_checks_length() {
        let shape = InputShape::rgb(2, 2);
        assert!(ImageInput::from_raw(shape, vec![0.0; 12]).is_ok());

        let err = ImageInput::from_raw(shape, vec![0.0; 11]).unwrap_err();
        assert!(matches!(err, EdgeError::Preprocess(_)));
    }

    #[test]
    fn test_ensure_shape_reports_both_shapes() {
        let input = ImageInput::filled(InputShape::rgb(10, 10), 0.0);
        let err = input.ensure_shape(&InputShape::rgb(224, 224)).unwrap_err();

        match err {
            EdgeError::ShapeMismatch { expected, actual } => {
                assert_eq!(expected, InputShape::rgb(224, 224));
                assert_eq!(actual, InputShape::rgb(10, 10));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
