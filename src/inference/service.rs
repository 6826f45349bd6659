//! Inference service: bytes in, ranked labels out

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{debug, warn};

use super::result::InferenceResult;
use crate::artifact::ModelArtifact;
use crate::preprocess::{ImageInput, Preprocessor};
use crate::utils::error::{EdgeError, Result};

/// Load an artifact for sharing between callers
pub fn load(path: impl AsRef<Path>) -> Result<Arc<ModelArtifact>> {
    ModelArtifact::load(path).map(Arc::new)
}

/// Classify image bytes with `artifact`
pub fn classify(artifact: &ModelArtifact, bytes: &[u8]) -> Result<InferenceResult> {
    let input = artifact.preprocessor().prepare(bytes)?;
    classify_prepared(artifact, &input)
}

fn classify_prepared(artifact: &ModelArtifact, input: &ImageInput) -> Result<InferenceResult> {
    let probabilities = artifact.forward(std::slice::from_ref(input))?;
    let row = probabilities
        .first()
        .ok_or_else(|| EdgeError::Inference("model returned no output".to_string()))?;
    InferenceResult::from_probabilities(artifact.labels(), row)
}

/// Cheaply clonable handle around one loaded artifact
///
/// All clones share the same read-only artifact; no call mutates it, so
/// any number of threads may classify concurrently.
#[derive(Debug, Clone)]
pub struct InferenceService {
    artifact: Arc<ModelArtifact>,
    preprocessor: Preprocessor,
}

impl InferenceService {
    pub fn new(artifact: Arc<ModelArtifact>) -> Self {
        let preprocessor = artifact.preprocessor().clone();
        Self {
            artifact,
            preprocessor,
        }
    }

    /// Load an artifact from disk and wrap it in a service
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(load(path)?))
    }

    pub fn artifact(&self) -> &Arc<ModelArtifact> {
        &self.artifact
    }

    /// Decode, preprocess and classify raw image bytes
    pub fn classify(&self, bytes: &[u8]) -> Result<InferenceResult> {
        let start = Instant::now();
        let input = self.preprocessor.prepare(bytes)?;
        let result = classify_prepared(&self.artifact, &input)?;

        debug!(
            "Classified {} bytes as '{}' ({:.3}) in {:.2}ms",
            bytes.len(),
            result.label,
            result.score,
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(result)
    }

    /// Classify an already preprocessed input
    pub fn classify_input(&self, input: &ImageInput) -> Result<InferenceResult> {
        classify_prepared(&self.artifact, input)
    }

    /// Classify several images in parallel; results keep the input order
    pub fn classify_batch(&self, images: &[Vec<u8>]) -> Vec<Result<InferenceResult>> {
        images
            .par_iter()
            .map(|bytes| self.classify(bytes))
            .collect()
    }

    /// Classify on the blocking thread pool, giving up after `limit`
    ///
    /// A timed-out computation is not interrupted; it runs to completion on
    /// its worker thread and its result is dropped.
    pub async fn classify_with_timeout(
        &self,
        bytes: Vec<u8>,
        limit: Duration,
    ) -> Result<InferenceResult> {
        let service = self.clone();
        let task = tokio::task::spawn_blocking(move || service.classify(&bytes));

        match tokio::time::timeout(limit, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(EdgeError::Inference(format!(
                "classification task failed: {}",
                join_error
            ))),
            Err(_) => {
                warn!("Classification exceeded {:?}", limit);
                Err(EdgeError::Timeout(limit))
            }
        }
    }
}
