use axum::{extract::State, Json};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::api::middleware::AppError;
use crate::models::{database_or_default, ColumnsRequest, ConnectRequest};
use crate::services::database::StoreConnector;
use crate::services::{ImportService, MetadataService, QueryPlanner};
use crate::storage::FileStore;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub connector: Arc<dyn StoreConnector>,
    pub files: FileStore,
    pub planner: QueryPlanner,
    pub importer: Arc<ImportService>,
    /// Body limit for `/upload`, in bytes.
    pub upload_limit: usize,
    /// Cancelled on shutdown; every import runs under a child token.
    pub shutdown: CancellationToken,
}

/// Test the connection parameters with a trivial query
pub async fn connect(
    State(state): State<AppState>,
    Json(payload): Json<ConnectRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let store = state.connector.connect(&payload.connection)?;
    tracing::info!(
        "Testing connection to {} as {}",
        payload.connection.host.trim(),
        payload.connection.effective_username()
    );

    store.ping().await?;

    Ok(Json(serde_json::json!({
        "success": true
    })))
}

/// List tables in a database
pub async fn list_tables(
    State(state): State<AppState>,
    Json(payload): Json<ConnectRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let store = state.connector.connect(&payload.connection)?;
    let database = database_or_default(&payload.database);

    let tables = MetadataService::list_tables(store.as_ref(), database).await?;
    tracing::info!("Found {} tables in {}", tables.len(), database);

    Ok(Json(serde_json::json!({
        "success": true,
        "tables": tables
    })))
}

/// List columns of a table
pub async fn list_columns(
    State(state): State<AppState>,
    Json(payload): Json<ColumnsRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let table = payload.table.trim();
    if table.is_empty() {
        return Err(AppError::Validation("Table name is required".to_string()));
    }

    let store = state.connector.connect(&payload.connection)?;
    let database = database_or_default(&payload.database);
    let columns = MetadataService::list_columns(store.as_ref(), database, table).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "columns": columns
    })))
}
