//! End-to-end behavior of loading an artifact and classifying uploads

mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use image::{DynamicImage, Rgb, RgbImage};

use recycle_edge::inference::{classify, load, InferenceService};
use recycle_edge::{EdgeError, InputShape, DEFAULT_LABELS};

use common::{png_bytes, write_waste_artifact, zero_image};

#[test]
fn zero_image_with_waste_labels_is_classified() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = load(write_waste_artifact(dir.path(), 224)).unwrap();

    let result = classify(&artifact, &zero_image(224, 224)).unwrap();

    assert!(DEFAULT_LABELS.contains(&result.label.as_str()));
    assert!((0.0..=1.0).contains(&result.score));
    assert_eq!(result.ranked.len(), 6);
    assert_eq!(result.ranked[0].label, result.label);
    assert_eq!(result.ranked[0].score, result.score);
    for pair in result.ranked.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    let total: f32 = result.ranked.iter().map(|r| r.score).sum();
    assert!((total - 1.0).abs() < 1e-3);
}

#[test]
fn tiny_image_is_a_shape_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = load(write_waste_artifact(dir.path(), 224)).unwrap();

    let err = classify(&artifact, &zero_image(10, 10)).unwrap_err();
    match err {
        EdgeError::ShapeMismatch { expected, actual } => {
            assert_eq!(expected, InputShape::rgb(224, 224));
            assert_eq!(actual, InputShape::rgb(10, 10));
        }
        other => panic!("expected ShapeMismatch, got {other:?}"),
    }
}

#[test]
fn garbage_bytes_are_a_preprocess_error() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = load(write_waste_artifact(dir.path(), 64)).unwrap();

    assert!(matches!(
        classify(&artifact, b"definitely not an image"),
        Err(EdgeError::Preprocess(_))
    ));
    assert!(matches!(classify(&artifact, &[]), Err(EdgeError::Preprocess(_))));
}

#[test]
fn missing_artifact_fails_to_load() {
    let dir = tempfile::tempdir().unwrap();
    let err = InferenceService::from_path(dir.path().join("absent.rclf")).unwrap_err();
    assert!(matches!(err, EdgeError::ArtifactLoad { .. }));
}

#[test]
fn classification_is_deterministic_across_loads() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_waste_artifact(dir.path(), 64);
    let image = png_bytes(&DynamicImage::ImageRgb8(RgbImage::from_fn(80, 60, |x, y| {
        Rgb([(x * 3) as u8, (y * 4) as u8, 90])
    })));

    let first = InferenceService::from_path(&path).unwrap();
    let second = InferenceService::from_path(&path).unwrap();

    let expected = first.classify(&image).unwrap();
    assert_eq!(first.classify(&image).unwrap(), expected);
    assert_eq!(second.classify(&image).unwrap(), expected);
}

#[test]
fn concurrent_callers_share_one_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let service = InferenceService::from_path(write_waste_artifact(dir.path(), 64)).unwrap();
    let image = Arc::new(zero_image(64, 64));
    let expected = service.classify(&image).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let service = service.clone();
            let image = Arc::clone(&image);
            thread::spawn(move || service.classify(&image).unwrap())
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn bounded_classification_matches_direct_call() {
    let dir = tempfile::tempdir().unwrap();
    let service = InferenceService::from_path(write_waste_artifact(dir.path(), 64)).unwrap();
    let image = zero_image(64, 64);

    let bounded = service
        .classify_with_timeout(image.clone(), Duration::from_secs(30))
        .await
        .unwrap();
    assert_eq!(bounded, service.classify(&image).unwrap());
}
