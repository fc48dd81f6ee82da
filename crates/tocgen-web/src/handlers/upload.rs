use axum::Json;
use axum::extract::{Multipart, State};
use std::sync::Arc;

use tocgen_core::{SubmitOutcome, TextWindow, window};

use crate::error::ApiError;
use crate::models::{StatusJson, UploadResponse};
use crate::state::AppState;
use crate::upload;

/// Submit a document. The same file name again is a no-op; anything else
/// replaces the session.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let file = upload::parse_multipart(multipart).await?;
    let identity = file.filename.clone();

    {
        let store = state.store()?;
        if store.is_current(&identity) {
            return Ok(Json(UploadResponse {
                outcome: "unchanged",
                status: StatusJson::from(&*store),
            }));
        }
    }

    tracing::info!(
        document = %identity,
        kind = ?file.kind,
        bytes = file.data.len(),
        "document uploaded"
    );

    let windowing = state.windowing.clone();
    let loaded = tokio::task::spawn_blocking(move || -> Result<Vec<TextWindow>, ApiError> {
        let document = tocgen_ingest::load_bytes(&file.filename, &file.data)?;
        Ok(window(
            &document,
            &windowing.strategy,
            windowing.page_marker.as_deref(),
        )?)
    })
    .await
    .map_err(|e| ApiError::internal(format!("Extraction task failed: {e}")))?;

    let mut store = state.store()?;
    let outcome = store.submit(&identity, &state.settings.separator, || loaded)?;
    Ok(Json(UploadResponse {
        outcome: match outcome {
            SubmitOutcome::Unchanged => "unchanged",
            SubmitOutcome::Loaded { .. } => "loaded",
        },
        status: StatusJson::from(&*store),
    }))
}
