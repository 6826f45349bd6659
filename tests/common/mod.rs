//! Helpers shared by the integration tests

#![allow(dead_code)]

use std::io::Cursor;
use std::path::{Path, PathBuf};

use burn_ndarray::NdArray;
use image::{DynamicImage, ImageFormat};

use recycle_edge::model::{FrozenClassifier, RecycleClassifierConfig};
use recycle_edge::{ArtifactWriter, InputShape, DEFAULT_LABELS};

pub fn waste_labels() -> Vec<String> {
    DEFAULT_LABELS.iter().map(|l| l.to_string()).collect()
}

/// Tiny randomly initialized RGB classifier
pub fn tiny_model(num_classes: usize) -> FrozenClassifier {
    let config = RecycleClassifierConfig::new()
        .with_num_classes(num_classes)
        .with_base_filters(2)
        .with_hidden_units(4);
    let model = config.init::<NdArray>(&Default::default());
    FrozenClassifier::from_model(&model, config.layout()).unwrap()
}

pub fn writer(labels: Vec<String>, size: u32) -> ArtifactWriter {
    ArtifactWriter::new(labels, InputShape::rgb(size, size)).with_name("integration")
}

/// Write a 6-label artifact with a `size`x`size`x3 input into `dir`
pub fn write_waste_artifact(dir: &Path, size: u32) -> PathBuf {
    let path = dir.join("waste.rclf");
    writer(waste_labels(), size)
        .write(&path, &tiny_model(DEFAULT_LABELS.len()))
        .unwrap();
    path
}

pub fn png_bytes(image: &DynamicImage) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png).unwrap();
    buffer.into_inner()
}

pub fn zero_image(width: u32, height: u32) -> Vec<u8> {
    png_bytes(&DynamicImage::new_rgb8(width, height))
}
