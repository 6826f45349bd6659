//! Classification results

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::utils::error::{EdgeError, Result};

/// One entry of a ranked prediction list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedLabel {
    pub label: String,
    /// Position of the label in the artifact's label list
    pub index: usize,
    pub score: f32,
}

/// Outcome of classifying one image
///
/// Carries no timing information, so two results for the same artifact and
/// input compare equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResult {
    /// Top-1 label
    pub label: String,
    /// Index of the top-1 label
    pub class_index: usize,
    /// Probability of the top-1 label, in [0, 1]
    pub score: f32,
    /// Every label, by descending score; ties keep label order
    pub ranked: Vec<RankedLabel>,
}

impl InferenceResult {
    /// Build a result from a probability row
    ///
    /// Fails if the row length differs from the label count or any score is
    /// not finite.
    pub fn from_probabilities(labels: &[String], probabilities: &[f32]) -> Result<Self> {
        if labels.is_empty() || probabilities.len() != labels.len() {
            return Err(EdgeError::Inference(format!(
                "model produced {} scores for {} labels",
                probabilities.len(),
                labels.len()
            )));
        }
        if probabilities.iter().any(|p| !p.is_finite()) {
            return Err(EdgeError::Inference(
                "model produced a non-finite score".to_string(),
            ));
        }

        let mut ranked: Vec<RankedLabel> = labels
            .iter()
            .zip(probabilities)
            .enumerate()
            .map(|(index, (label, &score))| RankedLabel {
                label: label.clone(),
                index,
                score: score.clamp(0.0, 1.0),
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.index.cmp(&b.index))
        });

        let top = &ranked[0];
        Ok(Self {
            label: top.label.clone(),
            class_index: top.index,
            score: top.score,
            ranked,
        })
    }

    /// The `k` best labels
    pub fn top_k(&self, k: usize) -> &[RankedLabel] {
        &self.ranked[..k.min(self.ranked.len())]
    }

    /// Keep only the `k` best labels in the ranked list
    pub fn truncate(mut self, k: usize) -> Self {
        self.ranked.truncate(k.max(1));
        self
    }

    /// Check if the top-1 score reaches `threshold`
    pub fn is_confident(&self, threshold: f32) -> bool {
        self.score >= threshold
    }

    /// Shannon entropy of the score distribution (nats)
    pub fn entropy(&self) -> f32 {
        self.ranked
            .iter()
            .filter(|r| r.score > 0.0)
            .map(|r| -r.score * r.score.ln())
            .sum()
    }

    /// Gap between the best and second best score
    pub fn margin(&self) -> f32 {
        match self.ranked.as_slice() {
            [first, second, ..] => first.score - second.score,
            [first] => first.score,
            [] => 0.0,
        }
    }
}
