use std::time::Instant;

use chrono::Utc;
use serde_json::Value;

use crate::api::middleware::AppError;
use crate::models::{ExportArtifact, QueryMode, TransferSpec};
use crate::services::database::{AnalyticsStore, OutputFormat};
use crate::services::query_planner::QueryPlanner;
use crate::storage::{export_filename, FileStore};

/// Read direction: preview samples and full CSV exports.
pub struct ExportService<'a> {
    planner: QueryPlanner,
    files: &'a FileStore,
}

impl<'a> ExportService<'a> {
    pub fn new(planner: QueryPlanner, files: &'a FileStore) -> Self {
        Self { planner, files }
    }

    /// Fetch a bounded sample of rows for the spec.
    pub async fn preview(
        &self,
        store: &dyn AnalyticsStore,
        spec: &TransferSpec,
    ) -> Result<Vec<Value>, AppError> {
        let sql = self.planner.plan(spec, QueryMode::Preview)?;
        let result = store.query_rows(&sql).await?;
        tracing::info!(
            "Preview returned {} rows in {}ms",
            result.row_count,
            result.execution_time_ms
        );
        Ok(result.rows)
    }

    /// Count the rows, then stream the store's own CSV serialization into a
    /// new artifact.
    ///
    /// The count and the file come from two separate queries; they agree only
    /// if nothing writes to the source in between.
    pub async fn export(
        &self,
        store: &dyn AnalyticsStore,
        spec: &TransferSpec,
    ) -> Result<ExportArtifact, AppError> {
        let start_time = Instant::now();

        // Plan both statements up front so plan errors never touch the store.
        let count_sql = self.planner.plan(spec, QueryMode::Count)?;
        let export_sql = self.planner.plan(spec, QueryMode::Export)?;

        let row_count = store.query_count(&count_sql).await?;
        tracing::info!("Export source holds {} rows", row_count);

        let filename = export_filename(&Self::artifact_base(spec), Utc::now());
        let mut artifact = self.files.create_artifact(&filename).await?;

        let bytes_written = store
            .query_to_writer(&export_sql, OutputFormat::CsvWithNames, artifact.writer())
            .await
            .map_err(|e| {
                tracing::error!("Export of {} aborted: {}", filename, e);
                e
            })?;
        let path = artifact.commit().await?;

        tracing::info!(
            "Exported {} ({} bytes, {} rows counted) in {}ms",
            filename,
            bytes_written,
            row_count,
            start_time.elapsed().as_millis()
        );

        Ok(ExportArtifact {
            filename,
            path,
            row_count,
            bytes_written,
        })
    }

    fn artifact_base(spec: &TransferSpec) -> String {
        match (spec.table(), spec.join()) {
            (Some(table), _) => table.to_string(),
            (None, Some(join)) => format!("{}_{}", join.left, join.right),
            (None, None) => "data".to_string(),
        }
    }
}
