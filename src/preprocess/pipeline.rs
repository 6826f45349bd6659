//! Deterministic image preprocessing
//!
//! decode → convert to the artifact's channel count → resize → normalize.
//! Both the training batcher and the inference service go through
//! [`Preprocessor`], so the artifact producer and consumer always agree on
//! pixel range and interpolation.

use std::io::Cursor;

use image::{imageops::FilterType, DynamicImage, GenericImageView, ImageReader};
use serde::{Deserialize, Serialize};

use super::input::{ImageInput, InputShape};
use crate::utils::error::{EdgeError, Result};

/// ImageNet normalization mean values (RGB)
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet normalization std values (RGB)
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Smallest source side the bilinear policy will upscale from
pub const DEFAULT_MIN_SOURCE_SIDE: u32 = 32;

/// Numeric range the classifier expects its inputs in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Normalization {
    /// `v / 255`, range [0, 1]
    ZeroOne,
    /// `v / 127.5 - 1`, range [-1, 1]
    MinusOneOne,
    /// `(v / 255 - mean[c]) / std[c]`
    MeanStd { mean: Vec<f32>, std: Vec<f32> },
}

impl Default for Normalization {
    fn default() -> Self {
        Normalization::ZeroOne
    }
}

impl Normalization {
    /// ImageNet statistics, as used by most pretrained backbones
    pub fn imagenet() -> Self {
        Normalization::MeanStd {
            mean: IMAGENET_MEAN.to_vec(),
            std: IMAGENET_STD.to_vec(),
        }
    }

    /// Check the statistics line up with the channel count
    pub fn validate(&self, channels: u32) -> std::result::Result<(), String> {
        if let Normalization::MeanStd { mean, std } = self {
            if mean.len() != channels as usize || std.len() != channels as usize {
                return Err(format!(
                    "mean/std have {}/{} entries for {} channels",
                    mean.len(),
                    std.len(),
                    channels
                ));
            }
            if std.iter().any(|s| !s.is_finite() || *s <= 0.0) {
                return Err("std entries must be positive".to_string());
            }
            if mean.iter().any(|m| !m.is_finite()) {
                return Err("mean entries must be finite".to_string());
            }
        }
        Ok(())
    }

    /// Normalize one 8-bit channel value
    #[inline]
    pub fn apply(&self, value: u8, channel: usize) -> f32 {
        match self {
            Normalization::ZeroOne => value as f32 / 255.0,
            Normalization::MinusOneOne => value as f32 / 127.5 - 1.0,
            Normalization::MeanStd { mean, std } => {
                (value as f32 / 255.0 - mean[channel]) / std[channel]
            }
        }
    }
}

/// How decoded images are brought to the artifact's spatial size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResizePolicy {
    /// No resizing: decoded width/height must equal the input shape
    Exact,
    /// Triangle-filter resize, refusing sources whose shorter side is
    /// below `min_source_side`
    Bilinear { min_source_side: u32 },
}

impl Default for ResizePolicy {
    fn default() -> Self {
        ResizePolicy::Bilinear {
            min_source_side: DEFAULT_MIN_SOURCE_SIDE,
        }
    }
}

impl ResizePolicy {
    pub fn validate(&self) -> std::result::Result<(), String> {
        match self {
            ResizePolicy::Bilinear { min_source_side: 0 } => {
                Err("min_source_side must be at least 1".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// Decode raw bytes (JPEG/PNG/BMP, sniffed from content) into an image
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(EdgeError::Preprocess("empty input".to_string()));
    }

    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| EdgeError::Preprocess(format!("could not read input: {}", e)))?
        .decode()
        .map_err(|e| EdgeError::Preprocess(format!("not a decodable image: {}", e)))
}

/// Turns image bytes into [`ImageInput`]s for one artifact's input contract
#[derive(Debug, Clone, PartialEq)]
pub struct Preprocessor {
    shape: InputShape,
    normalization: Normalization,
    resize: ResizePolicy,
}

impl Preprocessor {
    pub fn new(shape: InputShape, normalization: Normalization, resize: ResizePolicy) -> Self {
        Self {
            shape,
            normalization,
            resize,
        }
    }

    pub fn shape(&self) -> InputShape {
        self.shape
    }

    pub fn normalization(&self) -> &Normalization {
        &self.normalization
    }

    pub fn resize_policy(&self) -> ResizePolicy {
        self.resize
    }

    /// Decode and preprocess raw image bytes
    pub fn prepare(&self, bytes: &[u8]) -> Result<ImageInput> {
        let image = decode_image(bytes)?;
        self.prepare_image(image)
    }

    /// Preprocess an already decoded image
    pub fn prepare_image(&self, image: DynamicImage) -> Result<ImageInput> {
        let (width, height) = image.dimensions();
        let source = InputShape::new(width, height, image.color().channel_count() as u32);

        let image = self.convert_channels(image);
        let image = self.resize(image, source)?;

        let shape = InputShape::new(image.width(), image.height(), self.shape.channels);
        let input = ImageInput::from_raw(shape, self.to_chw(&image))?;
        input.ensure_shape(&self.shape)?;

        Ok(input)
    }

    fn convert_channels(&self, image: DynamicImage) -> DynamicImage {
        match self.shape.channels {
            1 => DynamicImage::ImageLuma8(image.to_luma8()),
            _ => DynamicImage::ImageRgb8(image.to_rgb8()),
        }
    }

    fn resize(&self, image: DynamicImage, source: InputShape) -> Result<DynamicImage> {
        let (width, height) = (self.shape.width, self.shape.height);
        if image.width() == width && image.height() == height {
            return Ok(image);
        }

        let mismatch = || EdgeError::ShapeMismatch {
            expected: self.shape,
            actual: source,
        };

        match self.resize {
            ResizePolicy::Exact => Err(mismatch()),
            ResizePolicy::Bilinear { min_source_side } => {
                if image.width().min(image.height()) < min_source_side {
                    return Err(mismatch());
                }
                Ok(image.resize_exact(width, height, FilterType::Triangle))
            }
        }
    }

    /// Interleaved 8-bit pixels to normalized CHW floats
    fn to_chw(&self, image: &DynamicImage) -> Vec<f32> {
        let channels = self.shape.channels as usize;
        let plane = image.width() as usize * image.height() as usize;
        let mut data = vec![0.0f32; channels * plane];

        for (i, pixel) in image.as_bytes().chunks_exact(channels).enumerate() {
            for (c, &value) in pixel.iter().enumerate() {
                data[c * plane + i] = self.normalization.apply(value, c);
            }
        }

        data
    }
}
