//! Voice note transcription endpoint.
//!
//! Accepts a multipart audio upload and hands it to the transcriber; the
//! audio itself is never decoded here.

use axum::{
    extract::{Multipart, State},
    Json,
};
use std::sync::Arc;

use crate::app::AppState;
use crate::error::ApiError;
use crate::services::transcribe::Transcription;

/// POST /transcribe
pub async fn transcribe(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Transcription>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {}", e)))?
    {
        if !matches!(field.name(), Some("audio") | Some("file")) {
            continue;
        }

        let filename = field
            .file_name()
            .unwrap_or("audio.webm")
            .to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("failed to read audio field: {}", e)))?;

        if data.is_empty() {
            return Err(ApiError::bad_request("audio upload is empty"));
        }

        let transcription = state
            .transcriber
            .transcribe(data.to_vec(), filename, content_type)
            .await;

        return Ok(Json(transcription));
    }

    Err(ApiError::bad_request("missing audio field"))
}
