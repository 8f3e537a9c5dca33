use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::api::middleware::AppError;

pub const DEFAULT_DATABASE: &str = "default";

/// A header-keyed delimited record. Values stay text; the store coerces types.
pub type Record = BTreeMap<String, String>;

/// Records awaiting one bulk insert; handed to the flusher by value.
pub type Batch = Vec<Record>;

/// What to move: table or two-table join, and the ordered column projection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferSpec {
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub join_tables: Option<Vec<String>>,
    #[serde(default)]
    pub join_condition: Option<String>,
}

/// A validated two-table join, present only when both tables and a predicate were given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinSpec<'a> {
    pub left: &'a str,
    pub right: &'a str,
    pub condition: &'a str,
}

impl TransferSpec {
    pub fn for_table(table: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            table: Some(table.into()),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_join(mut self, left: &str, right: &str, condition: &str) -> Self {
        self.join_tables = Some(vec![left.to_string(), right.to_string()]);
        self.join_condition = Some(condition.to_string());
        self
    }

    pub fn database(&self) -> &str {
        self.database
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(DEFAULT_DATABASE)
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    /// Join mode needs exactly two tables and a non-blank predicate; anything
    /// less degrades to single-table mode.
    pub fn join(&self) -> Option<JoinSpec<'_>> {
        let tables = self.join_tables.as_ref()?;
        let condition = self.join_condition.as_deref()?.trim();
        if tables.len() != 2 || condition.is_empty() {
            return None;
        }
        Some(JoinSpec {
            left: tables[0].trim(),
            right: tables[1].trim(),
            condition,
        })
    }
}

/// Which statement the planner should build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    Preview,
    Export,
    Count,
}

/// A finished export: the artifact on disk plus the independently counted rows.
///
/// `row_count` comes from a separate count query and matches the file only
/// when nothing wrote to the source between the two queries.
#[derive(Debug, Clone, Serialize)]
pub struct ExportArtifact {
    pub filename: String,
    #[serde(skip)]
    pub path: std::path::PathBuf,
    pub row_count: u64,
    pub bytes_written: u64,
}

/// Outcome of one import call.
///
/// `rows_processed` counts rows read and enqueued, `rows_committed` only rows
/// whose batch insert succeeded. The two differ whenever a flush failed.
#[derive(Debug, Clone)]
pub struct ImportReport {
    pub table: String,
    pub rows_processed: u64,
    pub rows_committed: u64,
    pub batches_flushed: usize,
    pub batches_failed: usize,
    pub cancelled: bool,
    pub first_error: Option<AppError>,
}

impl ImportReport {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            rows_processed: 0,
            rows_committed: 0,
            batches_flushed: 0,
            batches_failed: 0,
            cancelled: false,
            first_error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.first_error.is_none() && !self.cancelled
    }

    /// Keep only the first error; later ones are logged by the caller.
    pub fn record_error(&mut self, error: AppError) {
        if self.first_error.is_none() {
            self.first_error = Some(error);
        }
    }
}
