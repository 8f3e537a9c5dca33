use serde::Deserialize;

use super::connection::ConnectionSpec;
use super::transfer::TransferSpec;

/// Body of `/connect` and `/tables`.
#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    #[serde(flatten)]
    pub connection: ConnectionSpec,
    #[serde(default)]
    pub database: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ColumnsRequest {
    #[serde(flatten)]
    pub connection: ConnectionSpec,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub table: String,
}

/// Body of `/preview` and `/download`.
#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    #[serde(flatten)]
    pub connection: ConnectionSpec,
    #[serde(flatten)]
    pub spec: TransferSpec,
}

/// Body of `/insert`: a previously uploaded file plus the target spec.
#[derive(Debug, Deserialize)]
pub struct InsertRequest {
    #[serde(flatten)]
    pub connection: ConnectionSpec,
    #[serde(flatten)]
    pub spec: TransferSpec,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub delimiter: Option<String>,
}

/// Body of `/file-preview`; reads only the local upload.
#[derive(Debug, Deserialize)]
pub struct FilePreviewRequest {
    pub filename: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub delimiter: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Resolve the database name the way [`TransferSpec::database`] does.
pub fn database_or_default(database: &Option<String>) -> &str {
    database
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or(super::transfer::DEFAULT_DATABASE)
}
