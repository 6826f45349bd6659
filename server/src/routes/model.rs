use axum::{extract::State, Json};
use recycle_edge::ArtifactInfo;

use crate::state::AppState;

/// Header of the served artifact
pub async fn model_info(State(state): State<AppState>) -> Json<ArtifactInfo> {
    Json(state.service.artifact().info())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_state;

    #[tokio::test]
    async fn test_model_info_lists_labels() {
        let dir = tempfile::tempdir().unwrap();
        let Json(info) = model_info(State(test_state(dir.path()))).await;
        assert_eq!(info.labels.len(), 6);
        assert_eq!(info.labels[0], "cardboard");
        assert_eq!(info.input.width, 32);
    }
}
