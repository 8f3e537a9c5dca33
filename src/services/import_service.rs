use std::fs::File;
use std::path::Path;
use std::time::{Duration, Instant};

use csv::{ReaderBuilder, StringRecord};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::api::middleware::AppError;
use crate::models::{Batch, ImportReport, Record, TransferSpec};
use crate::services::database::AnalyticsStore;
use crate::services::row_projector::RowProjector;
use crate::validation::SqlValidator;

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_IMPORT_TABLE: &str = "default_table";

#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Rows per insert request.
    pub batch_size: usize,
    /// Upper bound for a single insert; a timed-out flush counts as failed.
    pub flush_timeout: Duration,
    /// Target table when the request names none.
    pub default_table: String,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            flush_timeout: Duration::from_secs(120),
            default_table: DEFAULT_IMPORT_TABLE.to_string(),
        }
    }
}

/// Messages from the file reader to the flusher.
enum ReaderEvent {
    Batch(FlushJob),
    /// Reading stopped on an error; nothing further will be sent.
    Failed(AppError),
}

struct FlushJob {
    batch: Batch,
    /// Rows read before this batch.
    offset: u64,
    /// Resolved once the flush of this batch is over, successful or not.
    done: oneshot::Sender<()>,
}

struct ReadSummary {
    rows_read: u64,
    cancelled: bool,
}

/// Parse a one-character delimiter; blank means comma.
pub fn parse_delimiter(delimiter: Option<&str>) -> Result<u8, AppError> {
    let delimiter = delimiter.unwrap_or("");
    match delimiter {
        "" => Ok(b','),
        "\\t" | "\t" => Ok(b'\t'),
        d if d.len() == 1 => {
            let byte = d.as_bytes()[0];
            if byte == b'"' || byte == b'\n' || byte == b'\r' {
                Err(AppError::Validation(format!("Unsupported delimiter: {:?}", d)))
            } else {
                Ok(byte)
            }
        }
        d => Err(AppError::Validation(format!(
            "Delimiter must be a single character, got {:?}",
            d
        ))),
    }
}

/// Write direction: delimited file into the store as batched inserts.
///
/// Reading and flushing run as a two-stage pipeline. The reader keeps
/// filling the next batch while one insert is in flight, and blocks once
/// that batch is full until the outstanding insert resolves, so at most one
/// insert is ever in flight and batches reach the store in file order.
pub struct ImportService {
    options: ImportOptions,
}

impl ImportService {
    pub fn new(options: ImportOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    fn target_table(&self, spec: &TransferSpec) -> Result<(String, String), AppError> {
        let table = spec
            .table()
            .map(str::to_string)
            .unwrap_or_else(|| self.options.default_table.clone());
        SqlValidator::validate_identifier("table", &table)?;
        SqlValidator::validate_identifier("database", spec.database())?;
        let qualified = format!("{}.{}", spec.database(), table);
        Ok((table, qualified))
    }

    fn requested_columns(spec: &TransferSpec) -> Result<Vec<String>, AppError> {
        if spec.columns.is_empty() {
            return Err(AppError::Plan("At least one column must be selected".to_string()));
        }
        Ok(spec.columns.iter().map(|c| c.trim().to_string()).collect())
    }

    /// Stream `path` into the target table.
    ///
    /// Returns `Err` only when the transfer could not start. Once streaming
    /// begins, failures land in the report: `rows_processed` counts rows read,
    /// `rows_committed` rows whose insert succeeded, and `first_error` the
    /// earliest failure. Rows already inserted are never rolled back.
    pub async fn import(
        &self,
        store: &dyn AnalyticsStore,
        path: &Path,
        spec: &TransferSpec,
        delimiter: u8,
        cancel: CancellationToken,
    ) -> Result<ImportReport, AppError> {
        let start_time = Instant::now();
        let columns = Self::requested_columns(spec)?;
        let (table, qualified_table) = self.target_table(spec)?;
        let batch_size = self.options.batch_size.max(1);

        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| AppError::Io(format!("Failed to open {}: {}", path.display(), e)))?
            .into_std()
            .await;

        tracing::info!(
            "Importing {} into {} in batches of {}",
            path.display(),
            qualified_table,
            batch_size
        );

        let (tx, mut rx) = mpsc::channel::<ReaderEvent>(1);
        let reader_cancel = cancel.clone();
        let reader = tokio::task::spawn_blocking(move || {
            read_batches(file, delimiter, &columns, batch_size, tx, reader_cancel)
        });

        let mut report = ImportReport::new(table);
        while let Some(event) = rx.recv().await {
            match event {
                ReaderEvent::Batch(job) => {
                    self.flush(store, &qualified_table, &job, &cancel, &mut report).await;
                    // The reader may be waiting on this to hand over the next batch.
                    let _ = job.done.send(());
                }
                ReaderEvent::Failed(error) => {
                    tracing::error!("Import of {} aborted: {}", path.display(), error);
                    report.record_error(error);
                }
            }
        }

        let summary = reader
            .await
            .map_err(|e| AppError::Internal(format!("Import reader task failed: {}", e)))?;

        report.rows_processed = summary.rows_read;
        if summary.cancelled || cancel.is_cancelled() {
            report.cancelled = true;
            report.record_error(AppError::Cancelled(format!(
                "stopped after reading {} rows",
                summary.rows_read
            )));
        }

        if report.rows_committed != report.rows_processed {
            tracing::warn!(
                "Import into {} read {} rows but committed {}",
                qualified_table,
                report.rows_processed,
                report.rows_committed
            );
        }
        tracing::info!(
            "Import into {} finished in {}ms: {} rows read, {} committed, {} batches flushed, {} failed",
            qualified_table,
            start_time.elapsed().as_millis(),
            report.rows_processed,
            report.rows_committed,
            report.batches_flushed,
            report.batches_failed
        );

        Ok(report)
    }

    async fn flush(
        &self,
        store: &dyn AnalyticsStore,
        table: &str,
        job: &FlushJob,
        cancel: &CancellationToken,
        report: &mut ImportReport,
    ) {
        let rows = job.batch.len();
        if cancel.is_cancelled() {
            tracing::info!("Skipping batch at offset {} after cancellation", job.offset);
            return;
        }

        let outcome = tokio::time::timeout(self.options.flush_timeout, store.insert(table, &job.batch))
            .await
            .unwrap_or_else(|_| {
                Err(AppError::Query(format!(
                    "insert timed out after {} seconds",
                    self.options.flush_timeout.as_secs_f64()
                )))
            });

        match outcome {
            Ok(()) => {
                report.rows_committed += rows as u64;
                report.batches_flushed += 1;
                tracing::info!("Flushed {} rows at offset {} into {}", rows, job.offset, table);
            }
            Err(e) => {
                report.batches_failed += 1;
                tracing::warn!("Batch at offset {} ({} rows) failed: {}", job.offset, rows, e);
                report.record_error(AppError::Insert {
                    offset: job.offset,
                    rows,
                    message: e.to_string(),
                });
            }
        }
    }

    /// First `limit` projected records of a delimited file.
    pub async fn preview_file(
        &self,
        path: &Path,
        columns: &[String],
        delimiter: u8,
        limit: usize,
    ) -> Result<Vec<Record>, AppError> {
        let file = tokio::fs::File::open(path).await?.into_std().await;
        let columns = columns.to_vec();

        tokio::task::spawn_blocking(move || -> Result<Vec<Record>, AppError> {
            let mut reader = csv_reader(file, delimiter);
            let projector = RowProjector::from_headers(&reader.headers()?.clone(), &columns);
            let mut rows = Vec::with_capacity(limit);
            let mut record = StringRecord::new();
            while rows.len() < limit && reader.read_record(&mut record)? {
                rows.push(projector.project(&record));
            }
            Ok(rows)
        })
        .await
        .map_err(|e| AppError::Internal(format!("File preview task failed: {}", e)))?
    }
}

fn csv_reader(file: File, delimiter: u8) -> csv::Reader<File> {
    ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(file)
}

/// Reader stage; runs on a blocking thread.
fn read_batches(
    file: File,
    delimiter: u8,
    columns: &[String],
    batch_size: usize,
    tx: mpsc::Sender<ReaderEvent>,
    cancel: CancellationToken,
) -> ReadSummary {
    let mut summary = ReadSummary {
        rows_read: 0,
        cancelled: false,
    };

    let mut reader = csv_reader(file, delimiter);
    let headers = match reader.headers() {
        Ok(headers) => headers.clone(),
        Err(e) => {
            let _ = tx.blocking_send(ReaderEvent::Failed(e.into()));
            return summary;
        }
    };

    // An empty file has no header and no rows: nothing to import.
    if headers.is_empty() {
        tracing::info!("Input file is empty, nothing to import");
        return summary;
    }

    let projector = RowProjector::from_headers(&headers, columns);
    let missing = projector.missing(columns);
    if missing.len() == columns.len() {
        let _ = tx.blocking_send(ReaderEvent::Failed(AppError::Plan(format!(
            "None of the requested columns appear in the file header: {}",
            columns.join(", ")
        ))));
        return summary;
    }
    if !missing.is_empty() {
        tracing::warn!("Columns missing from file header will be omitted: {}", missing.join(", "));
    }

    let mut batch: Batch = Vec::with_capacity(batch_size);
    let mut outstanding: Option<oneshot::Receiver<()>> = None;
    let mut record = StringRecord::new();

    loop {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            return summary;
        }

        match reader.read_record(&mut record) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                let _ = tx.blocking_send(ReaderEvent::Failed(e.into()));
                return summary;
            }
        }

        batch.push(projector.project(&record));
        summary.rows_read += 1;

        if batch.len() >= batch_size {
            // Backpressure: one insert in flight at most.
            if let Some(done) = outstanding.take() {
                if done.blocking_recv().is_err() {
                    return summary;
                }
            }
            if cancel.is_cancelled() {
                summary.cancelled = true;
                return summary;
            }

            let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
            let offset = summary.rows_read - full.len() as u64;
            match hand_over(&tx, full, offset) {
                Some(done) => outstanding = Some(done),
                None => return summary,
            }
        }
    }

    // Drain the residual batch.
    if !batch.is_empty() {
        if let Some(done) = outstanding.take() {
            if done.blocking_recv().is_err() {
                return summary;
            }
        }
        let offset = summary.rows_read - batch.len() as u64;
        let _ = hand_over(&tx, batch, offset);
    }

    summary
}

fn hand_over(
    tx: &mpsc::Sender<ReaderEvent>,
    batch: Batch,
    offset: u64,
) -> Option<oneshot::Receiver<()>> {
    let (done_tx, done_rx) = oneshot::channel();
    let job = FlushJob {
        batch,
        offset,
        done: done_tx,
    };
    tx.blocking_send(ReaderEvent::Batch(job)).ok()?;
    Some(done_rx)
}
