//! Artifact files on disk: writing, inspecting and rejecting corrupt ones

mod common;

use recycle_edge::artifact::{ArtifactHeader, MAGIC};
use recycle_edge::{EdgeError, ModelArtifact, Normalization, ResizePolicy};

use common::{tiny_model, waste_labels, write_waste_artifact, writer};

fn load_err(bytes: &[u8]) -> String {
    match ModelArtifact::from_bytes(bytes, "corrupt.rclf") {
        Err(EdgeError::ArtifactLoad { reason, .. }) => reason,
        Err(other) => panic!("expected ArtifactLoad, got {other:?}"),
        Ok(_) => panic!("corrupt artifact loaded"),
    }
}

/// Re-encode `bytes` with an edited JSON header; the payload is untouched
fn rewrite_header(bytes: &[u8], edit: impl FnOnce(&mut serde_json::Value)) -> Vec<u8> {
    let header_len = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;
    let mut header: serde_json::Value = serde_json::from_slice(&bytes[12..12 + header_len]).unwrap();
    edit(&mut header);

    let json = serde_json::to_vec(&header).unwrap();
    let mut out = bytes[..8].to_vec();
    out.extend_from_slice(&(json.len() as u32).to_le_bytes());
    out.extend_from_slice(&json);
    out.extend_from_slice(&bytes[12 + header_len..]);
    out
}

#[test]
fn written_artifact_describes_itself() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_waste_artifact(dir.path(), 96);

    let artifact = ModelArtifact::load(&path).unwrap();
    let info = artifact.info();

    assert_eq!(info.labels, waste_labels());
    assert_eq!(info.input.width, 96);
    assert_eq!(info.normalization, Normalization::ZeroOne);
    assert_eq!(info.resize, ResizePolicy::default());
    assert_eq!(info.size_bytes, std::fs::metadata(&path).unwrap().len());
    assert_eq!(info.payload_sha256.len(), 64);
}

#[test]
fn header_options_survive_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/dir/model.rclf");

    writer(vec!["can".into(), "bottle".into()], 48)
        .with_version("2.1.0")
        .with_normalization(Normalization::imagenet())
        .with_resize(ResizePolicy::Exact)
        .write(&path, &tiny_model(2))
        .unwrap();

    let artifact = ModelArtifact::load(&path).unwrap();
    let header: &ArtifactHeader = artifact.header();
    assert_eq!(header.version, "2.1.0");
    assert_eq!(header.normalization, Normalization::imagenet());
    assert_eq!(header.resize, ResizePolicy::Exact);
    assert_eq!(artifact.labels(), ["can", "bottle"]);
}

#[test]
fn corrupt_files_are_rejected() {
    let bytes = writer(waste_labels(), 32).to_bytes(&tiny_model(6)).unwrap();

    assert!(load_err(&[]).contains("bytes long"));

    let mut bad_magic = bytes.clone();
    bad_magic[0] = b'X';
    assert!(load_err(&bad_magic).contains("magic"));

    let mut bad_version = bytes.clone();
    bad_version[4] = 9;
    assert!(load_err(&bad_version).contains("version 9"));

    let mut flipped = bytes.clone();
    let last = flipped.len() - 1;
    flipped[last] ^= 0x55;
    assert!(load_err(&flipped).contains("checksum"));

    assert!(load_err(&bytes[..bytes.len() - 3]).contains("payload"));
    assert_eq!(&bytes[..4], &MAGIC);

    let oversized = rewrite_header(&bytes, |h| {
        h["architecture"]["base_filters"] = serde_json::json!(u64::MAX / 2);
    });
    assert!(load_err(&oversized).contains("base_filters"));

    let overflowing = rewrite_header(&bytes, |h| {
        h["tensors"][0]["shape"] = serde_json::json!([u64::MAX, u64::MAX, 3, 3]);
    });
    assert!(load_err(&overflowing).contains("invalid header"));

    // The unmodified header still loads after re-encoding
    assert!(ModelArtifact::from_bytes(&rewrite_header(&bytes, |_| {}), "same.rclf").is_ok());
}

#[test]
fn unusable_input_size_is_rejected_at_load() {
    let bytes = writer(waste_labels(), 32).to_bytes(&tiny_model(6)).unwrap();

    let tiny = rewrite_header(&bytes, |h| {
        h["input"]["width"] = serde_json::json!(4);
        h["input"]["height"] = serde_json::json!(4);
    });
    assert!(load_err(&tiny).contains("4x4x3"));

    let huge = rewrite_header(&bytes, |h| h["input"]["width"] = serde_json::json!(100_000));
    assert!(load_err(&huge).contains("pixels per side"));
}

#[test]
fn writer_refuses_inputs_the_network_cannot_pool() {
    let err = writer(waste_labels(), 4)
        .with_resize(ResizePolicy::Exact)
        .to_bytes(&tiny_model(6))
        .unwrap_err();
    assert!(matches!(err, EdgeError::Export(_)), "{err:?}");
}

#[test]
fn label_count_must_match_model_outputs() {
    let err = writer(waste_labels(), 32).to_bytes(&tiny_model(4));
    assert!(err.is_err());
}
