//! Preprocessing module: from uploaded bytes to classifier inputs
//!
//! This module provides:
//! - `InputShape` and `ImageInput`, the typed input contract of an artifact
//! - `Normalization` and `ResizePolicy`, recorded in every artifact header
//! - `Preprocessor`, the single decode → resize → normalize pipeline shared by
//!   training and inference

pub mod input;
pub mod pipeline;

pub use input::{ImageInput, InputShape, MAX_INPUT_SIDE, MIN_INPUT_SIDE};
pub use pipeline::{
    decode_image, Normalization, Preprocessor, ResizePolicy, DEFAULT_MIN_SOURCE_SIDE,
};
