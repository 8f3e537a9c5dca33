use axum::{extract::State, http::StatusCode, Json};

use crate::api::handlers::connection::AppState;
use crate::api::middleware::AppError;
use crate::models::{FilePreviewRequest, InsertRequest, TransferRequest};
use crate::services::{parse_delimiter, ExportService};

/// Preview a few rows of the selected table or join
pub async fn preview(
    State(state): State<AppState>,
    Json(payload): Json<TransferRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let store = state.connector.connect(&payload.connection)?;
    let service = ExportService::new(state.planner, &state.files);
    let data = service.preview(store.as_ref(), &payload.spec).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "data": data
    })))
}

/// Preview the first records of an uploaded file, projected onto the chosen columns
pub async fn preview_file(
    State(state): State<AppState>,
    Json(payload): Json<FilePreviewRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let delimiter = parse_delimiter(payload.delimiter.as_deref())?;
    let path = state.files.resolve(&payload.filename).await?;
    let limit = payload
        .limit
        .unwrap_or(state.planner.preview_limit() as usize)
        .min(1000);

    let data = state
        .importer
        .preview_file(&path, &payload.columns, delimiter, limit)
        .await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "data": data
    })))
}

/// Export the selected table or join to a CSV artifact
pub async fn download(
    State(state): State<AppState>,
    Json(payload): Json<TransferRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let store = state.connector.connect(&payload.connection)?;
    let service = ExportService::new(state.planner, &state.files);
    let artifact = service.export(store.as_ref(), &payload.spec).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Export complete",
        "filename": artifact.filename,
        "count": artifact.row_count,
        "bytes": artifact.bytes_written,
    })))
}

/// Import an uploaded file into a table
///
/// The import runs on its own task so a dropped client connection never
/// abandons an insert mid-flight.
pub async fn insert(
    State(state): State<AppState>,
    Json(payload): Json<InsertRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let delimiter = parse_delimiter(payload.delimiter.as_deref())?;
    if payload.spec.columns.is_empty() {
        return Err(AppError::Validation("At least one column must be selected".to_string()));
    }
    let store = state.connector.connect(&payload.connection)?;
    let path = state.files.resolve(&payload.filename).await?;
    tracing::info!("Import requested for uploaded file {}", path.display());

    let importer = state.importer.clone();
    let cancel = state.shutdown.child_token();
    let spec = payload.spec;
    let report = tokio::spawn(async move {
        importer
            .import(store.as_ref(), &path, &spec, delimiter, cancel)
            .await
    })
    .await
    .map_err(|e| AppError::Internal(format!("Import task failed: {}", e)))??;

    match &report.first_error {
        None => Ok((
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "message": "Data imported successfully",
                "count": report.rows_processed,
                "committed": report.rows_committed,
                "table": report.table,
            })),
        )),
        Some(error) => Ok((
            error.status_code(),
            Json(serde_json::json!({
                "success": false,
                "message": format!(
                    "Import incomplete: {} rows read, {} rows committed",
                    report.rows_processed, report.rows_committed
                ),
                "count": report.rows_processed,
                "committed": report.rows_committed,
                "batches_failed": report.batches_failed,
                "cancelled": report.cancelled,
                "table": report.table,
                "error": error.detail(),
            })),
        )),
    }
}
