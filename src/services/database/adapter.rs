// Store adapter trait for the analytical database
use crate::api::middleware::AppError;
use crate::models::Record;
use serde_json::Value;
use tokio::io::AsyncWrite;

/// Output formats requested from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// One JSON object per line, used for row-oriented results.
    JsonEachRow,
    /// Comma-separated text with a header row, serialized by the store itself.
    CsvWithNames,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::JsonEachRow => "JSONEachRow",
            OutputFormat::CsvWithNames => "CSVWithNames",
        }
    }
}

/// Query execution result
#[derive(Debug)]
pub struct QueryResult {
    pub rows: Vec<Value>,
    pub row_count: usize,
    pub execution_time_ms: u64,
}

/// Query and bulk-insert capability of the analytical store.
///
/// Handles are built per request and are not shared across transfers.
#[async_trait::async_trait]
pub trait AnalyticsStore: Send + Sync {
    /// Execute a query and return its rows as JSON objects.
    async fn query_rows(&self, sql: &str) -> Result<QueryResult, AppError>;

    /// Execute a query and stream its raw output in `format` into `sink`.
    /// Returns the number of bytes written.
    async fn query_to_writer(
        &self,
        sql: &str,
        format: OutputFormat,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, AppError>;

    /// Insert one batch of uniform records into `table` as a single request.
    async fn insert(&self, table: &str, rows: &[Record]) -> Result<(), AppError>;

    /// Run a trivial query to prove the credentials and endpoint work.
    async fn ping(&self) -> Result<(), AppError> {
        self.query_rows("SELECT 1").await.map(|_| ())
    }

    /// Run a count query and extract the `count` column of the first row.
    ///
    /// An empty result counts as zero. 64-bit integers may come back quoted.
    async fn query_count(&self, sql: &str) -> Result<u64, AppError> {
        let result = self.query_rows(sql).await?;
        let Some(value) = result.rows.first().and_then(|row| row.get("count")) else {
            return Ok(0);
        };

        match value {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse::<u64>().ok(),
            Value::Null => Some(0),
            _ => None,
        }
        .ok_or_else(|| AppError::Query(format!("Unexpected count value: {}", value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct CountOnly(Vec<Value>);

    #[async_trait::async_trait]
    impl AnalyticsStore for CountOnly {
        async fn query_rows(&self, _sql: &str) -> Result<QueryResult, AppError> {
            Ok(QueryResult {
                rows: self.0.clone(),
                row_count: self.0.len(),
                execution_time_ms: 0,
            })
        }

        async fn query_to_writer(
            &self,
            _sql: &str,
            _format: OutputFormat,
            _sink: &mut (dyn AsyncWrite + Send + Unpin),
        ) -> Result<u64, AppError> {
            Ok(0)
        }

        async fn insert(&self, _table: &str, _rows: &[Record]) -> Result<(), AppError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_count_extraction() {
        assert_eq!(CountOnly(vec![json!({"count": "2500"})]).query_count("q").await.unwrap(), 2500);
        assert_eq!(CountOnly(vec![json!({"count": 42})]).query_count("q").await.unwrap(), 42);
        assert_eq!(CountOnly(vec![]).query_count("q").await.unwrap(), 0);
        assert!(CountOnly(vec![json!({"count": "many"})]).query_count("q").await.is_err());
    }

    #[tokio::test]
    async fn test_ping_runs_trivial_query() {
        assert!(CountOnly(vec![json!({"1": 1})]).ping().await.is_ok());
    }

    #[test]
    fn test_format_names() {
        assert_eq!(OutputFormat::CsvWithNames.as_str(), "CSVWithNames");
        assert_eq!(OutputFormat::JsonEachRow.as_str(), "JSONEachRow");
    }
}
