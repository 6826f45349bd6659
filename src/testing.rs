//! Fixtures shared by unit tests

use std::io::Cursor;
use std::path::Path;

use burn_ndarray::NdArray;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

use crate::artifact::ArtifactWriter;
use crate::model::{FrozenClassifier, RecycleClassifierConfig};
use crate::preprocess::InputShape;

/// Randomly initialized tiny classifier
pub fn small_model(in_channels: usize, num_classes: usize) -> FrozenClassifier {
    let config = RecycleClassifierConfig::new()
        .with_in_channels(in_channels)
        .with_num_classes(num_classes)
        .with_base_filters(2)
        .with_hidden_units(4);
    let model = config.init::<NdArray>(&Default::default());
    FrozenClassifier::from_model(&model, config.layout()).unwrap()
}

/// Encoded artifact for a tiny RGB classifier with a square input
pub fn small_artifact_bytes(labels: &[&str], size: u32) -> Vec<u8> {
    ArtifactWriter::new(
        labels.iter().map(|l| l.to_string()).collect(),
        InputShape::rgb(size, size),
    )
    .with_name("test")
    .to_bytes(&small_model(3, labels.len()))
    .unwrap()
}

pub fn encode_png(image: &DynamicImage) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png).unwrap();
    buffer.into_inner()
}

/// `root/<label>/<i>.png`, 40x40 images with a per-class color
pub fn write_image_folder(root: &Path, labels: &[&str], per_class: usize) {
    for (c, label) in labels.iter().enumerate() {
        let dir = root.join(label);
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..per_class {
            let color = Rgb([(c * 80) as u8, (i * 30) as u8, 255 - (c * 60) as u8]);
            RgbImage::from_pixel(40, 40, color)
                .save_with_format(dir.join(format!("{i}.png")), ImageFormat::Png)
                .unwrap();
        }
    }
}
