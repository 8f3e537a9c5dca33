use serde_json::Value;

use crate::api::middleware::AppError;
use crate::services::database::AnalyticsStore;
use crate::validation::SqlValidator;

/// Table and column discovery for the selection screens.
pub struct MetadataService;

impl MetadataService {
    pub async fn list_tables(
        store: &dyn AnalyticsStore,
        database: &str,
    ) -> Result<Vec<String>, AppError> {
        SqlValidator::validate_identifier("database", database)?;
        let result = store.query_rows(&format!("SHOW TABLES FROM {}", database)).await?;

        // SHOW TABLES yields a single column whose name varies by server version.
        Ok(result
            .rows
            .iter()
            .filter_map(|row| row.as_object()?.values().next()?.as_str().map(String::from))
            .collect())
    }

    pub async fn list_columns(
        store: &dyn AnalyticsStore,
        database: &str,
        table: &str,
    ) -> Result<Vec<String>, AppError> {
        SqlValidator::validate_identifier("database", database)?;
        SqlValidator::validate_identifier("table", table)?;
        let result = store
            .query_rows(&format!("DESCRIBE TABLE {}.{}", database, table))
            .await?;

        Ok(result
            .rows
            .iter()
            .filter_map(|row| row.get("name").and_then(Value::as_str).map(String::from))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Record;
    use crate::services::database::{OutputFormat, QueryResult};
    use serde_json::json;
    use std::sync::Mutex;
    use tokio::io::AsyncWrite;

    struct CannedStore {
        rows: Vec<Value>,
        seen: Mutex<Option<String>>,
    }

    #[async_trait::async_trait]
    impl AnalyticsStore for CannedStore {
        async fn query_rows(&self, sql: &str) -> Result<QueryResult, AppError> {
            *self.seen.lock().unwrap() = Some(sql.to_string());
            Ok(QueryResult {
                rows: self.rows.clone(),
                row_count: self.rows.len(),
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
    async fn test_list_tables() {
        let store = CannedStore {
            rows: vec![json!({"name": "orders"}), json!({"name": "users"})],
            seen: Mutex::new(None),
        };
        let tables = MetadataService::list_tables(&store, "default").await.unwrap();
        assert_eq!(tables, vec!["orders", "users"]);
        assert_eq!(store.seen.lock().unwrap().as_deref(), Some("SHOW TABLES FROM default"));
    }

    #[tokio::test]
    async fn test_list_columns() {
        let store = CannedStore {
            rows: vec![
                json!({"name": "id", "type": "UInt64"}),
                json!({"name": "email", "type": "String"}),
            ],
            seen: Mutex::new(None),
        };
        let columns = MetadataService::list_columns(&store, "default", "users").await.unwrap();
        assert_eq!(columns, vec!["id", "email"]);

        let bad = MetadataService::list_columns(&store, "default", "users; DROP").await;
        assert!(matches!(bad, Err(AppError::Plan(_))));
    }

    #[test]
    fn test_list_tables_skips_rows_without_values() {
        let store = CannedStore {
            rows: vec![json!({}), json!({"name": "events"})],
            seen: Mutex::new(None),
        };
        let tables = tokio_test::block_on(MetadataService::list_tables(&store, "sales")).unwrap();
        assert_eq!(tables, vec!["events"]);
    }
}
