//! Image-folder dataset loader
//!
//! Labels are the sorted names of the class directories under the root, so
//! the label order (and therefore the model output order) is reproducible.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::utils::error::{EdgeError, Result};

/// File extensions treated as images
pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// A single image sample with its label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSample {
    pub path: PathBuf,
    /// Index into the dataset's label list
    pub label: usize,
}

/// Check whether a path has an image extension
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Dataset laid out as `root/<label>/*.{jpg,jpeg,png,bmp}`
#[derive(Debug, Clone)]
pub struct ImageFolder {
    pub root_dir: PathBuf,
    pub labels: Vec<String>,
    pub samples: Vec<ImageSample>,
}

impl ImageFolder {
    /// Scan a dataset directory
    ///
    /// The directory should be structured as:
    /// ```text
    /// root_dir/
    /// ├── cardboard/
    /// │   ├── image1.jpg
    /// │   └── image2.jpg
    /// ├── glass/
    /// │   └── ...
    /// └── ...
    /// ```
    pub fn new(root_dir: impl AsRef<Path>) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        info!("Loading image folder dataset from: {:?}", root_dir);

        if !root_dir.is_dir() {
            return Err(EdgeError::Dataset(format!(
                "dataset directory does not exist: {:?}",
                root_dir
            )));
        }

        let mut labels: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(&root_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                match entry.file_name().to_str() {
                    Some(name) if !name.starts_with('.') => labels.push(name.to_string()),
                    Some(_) => {}
                    None => warn!("Skipping non UTF-8 class directory {:?}", entry.path()),
                }
            }
        }
        labels.sort();

        if labels.is_empty() {
            return Err(EdgeError::Dataset(format!(
                "no class directories found in {:?}",
                root_dir
            )));
        }

        let mut samples = Vec::new();
        for (label, name) in labels.iter().enumerate() {
            let mut paths: Vec<PathBuf> = WalkDir::new(root_dir.join(name))
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .map(|e| e.into_path())
                .filter(|p| p.is_file() && is_image_file(p))
                .collect();
            paths.sort();

            debug!("Class '{}' (label {}): {} images", name, label, paths.len());
            samples.extend(paths.into_iter().map(|path| ImageSample { path, label }));
        }

        info!(
            "Found {} classes, {} images",
            labels.len(),
            samples.len()
        );

        Ok(Self {
            root_dir,
            labels,
            samples,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.labels.len()
    }

    /// Number of samples per label, in label order
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.labels.len()];
        for sample in &self.samples {
            counts[sample.label] += 1;
        }
        counts
    }

    /// Label name → sample count
    pub fn distribution(&self) -> BTreeMap<String, usize> {
        self.labels
            .iter()
            .cloned()
            .zip(self.class_counts())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_labels_are_sorted_directory_names() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("paper/a.jpg"));
        touch(&dir.path().join("glass/b.PNG"));
        touch(&dir.path().join("glass/c.png"));
        touch(&dir.path().join("glass/notes.txt"));
        touch(&dir.path().join("cardboard/d.bmp"));

        let folder = ImageFolder::new(dir.path()).unwrap();
        assert_eq!(folder.labels, vec!["cardboard", "glass", "paper"]);
        assert_eq!(folder.len(), 4);
        assert_eq!(folder.class_counts(), vec![1, 2, 1]);
        assert_eq!(folder.distribution()["glass"], 2);
    }

    #[test]
    fn test_missing_or_empty_root() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ImageFolder::new(dir.path().join("missing")).is_err());
        assert!(ImageFolder::new(dir.path()).is_err());
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("x/y.JPEG")));
        assert!(!is_image_file(Path::new("x/y.gif")));
        assert!(!is_image_file(Path::new("x/y")));
    }
}
