use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, State};
use axum::Json;
use chrono::Utc;
use tokio::io::AsyncWriteExt;

use crate::api::handlers::connection::AppState;
use crate::api::middleware::AppError;
use crate::storage::upload_filename;

/// Form field carrying the file.
const UPLOAD_FIELD: &str = "file";

/// Media types accepted for delimited uploads.
const ACCEPTED_TYPES: [&str; 2] = ["text/csv", "text/plain"];

fn multipart_error(error: MultipartError) -> AppError {
    AppError::Validation(format!("Invalid upload: {}", error.body_text()))
}

/// Store an uploaded delimited file under a unique name for later preview and import
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, AppError> {
    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let original_name = field.file_name().unwrap_or_default().to_string();
        let media_type = field
            .content_type()
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase())
            .unwrap_or_default();
        if !ACCEPTED_TYPES.contains(&media_type.as_str()) {
            return Err(AppError::Validation("Only CSV files are allowed".to_string()));
        }

        let filename = upload_filename(&original_name, Utc::now());
        let mut artifact = state.files.create_artifact(&filename).await?;
        let mut bytes = 0u64;
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            artifact.writer().write_all(&chunk).await?;
            bytes += chunk.len() as u64;
        }
        artifact.commit().await?;
        tracing::info!("Stored upload {} as {} ({} bytes)", original_name, filename, bytes);

        return Ok(Json(serde_json::json!({
            "success": true,
            "filename": filename,
            "originalname": original_name,
        })));
    }

    Err(AppError::Validation("No file uploaded".to_string()))
}
