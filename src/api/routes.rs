use axum::{
    extract::{DefaultBodyLimit, Request},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::api::handlers::connection::{self, AppState};
use crate::api::handlers::{transfer, upload};

/// Create router with application state
pub fn create_router_with_state(state: AppState) -> Router {
    let ingest = Router::new()
        .route("/connect", post(connection::connect))
        .route("/tables", post(connection::list_tables))
        .route("/columns", post(connection::list_columns))
        .route("/preview", post(transfer::preview))
        .route("/file-preview", post(transfer::preview_file))
        .route("/download", post(transfer::download))
        .route("/insert", post(transfer::insert))
        .route(
            "/upload",
            post(upload::upload).layer(DefaultBodyLimit::max(state.upload_limit)),
        );

    let uploads = Router::new()
        .fallback_service(ServeDir::new(state.files.root()))
        .layer(middleware::from_fn(hide_partial_files));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/ingest", ingest)
        .nest("/uploads", uploads)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Refuse dot-prefixed names so in-progress `.part` files are never served.
async fn hide_partial_files(request: Request, next: Next) -> Response {
    let hidden = request.uri().path().split('/').any(|segment| {
        segment.starts_with('.') || segment.to_ascii_lowercase().starts_with("%2e")
    });
    if hidden {
        return StatusCode::NOT_FOUND.into_response();
    }
    next.run(request).await
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::middleware::AppError;
    use crate::models::{ConnectionSpec, Record};
    use crate::services::database::{
        build_handle, AnalyticsStore, OutputFormat, QueryResult, StoreConnector, StoreSettings,
    };
    use crate::services::{ImportOptions, ImportService, QueryPlanner};
    use crate::storage::FileStore;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};
    use tokio::io::{AsyncWrite, AsyncWriteExt};
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    /// Store fake: ten-row `users` table, insert fails on the configured call.
    struct FakeStore {
        inserts: Arc<AtomicUsize>,
        fail_insert: Option<usize>,
    }

    #[async_trait::async_trait]
    impl AnalyticsStore for FakeStore {
        async fn query_rows(&self, sql: &str) -> Result<QueryResult, AppError> {
            let rows = if sql.starts_with("SELECT count()") {
                vec![json!({"count": "10"})]
            } else if sql.starts_with("SHOW TABLES") {
                vec![json!({"name": "users"})]
            } else {
                vec![json!({"id": "1"})]
            };
            Ok(QueryResult { row_count: rows.len(), rows, execution_time_ms: 0 })
        }

        async fn query_to_writer(
            &self,
            _sql: &str,
            _format: OutputFormat,
            sink: &mut (dyn AsyncWrite + Send + Unpin),
        ) -> Result<u64, AppError> {
            let mut text = String::from("\"id\"\n");
            for i in 0..10 {
                text.push_str(&format!("{}\n", i));
            }
            sink.write_all(text.as_bytes()).await?;
            Ok(text.len() as u64)
        }

        async fn insert(&self, _table: &str, _rows: &[Record]) -> Result<(), AppError> {
            let call = self.inserts.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_insert == Some(call) {
                return Err(AppError::Query("Code: 60. Table default.users doesn't exist".into()));
            }
            Ok(())
        }
    }

    struct FakeConnector {
        inserts: Arc<AtomicUsize>,
        fail_insert: Option<usize>,
    }

    impl StoreConnector for FakeConnector {
        fn connect(&self, spec: &ConnectionSpec) -> Result<Box<dyn AnalyticsStore>, AppError> {
            build_handle(spec, &StoreSettings::default())?;
            Ok(Box::new(FakeStore {
                inserts: self.inserts.clone(),
                fail_insert: self.fail_insert,
            }))
        }
    }

    fn app(fail_insert: Option<usize>) -> (Router, TempDir, Arc<AtomicUsize>) {
        let dir = tempdir().unwrap();
        let inserts = Arc::new(AtomicUsize::new(0));
        let state = AppState {
            connector: Arc::new(FakeConnector {
                inserts: inserts.clone(),
                fail_insert,
            }),
            files: FileStore::new(dir.path()),
            planner: QueryPlanner::default(),
            importer: Arc::new(ImportService::new(ImportOptions {
                batch_size: 4,
                ..ImportOptions::default()
            })),
            upload_limit: 64 * 1024,
            shutdown: CancellationToken::new(),
        };
        (create_router_with_state(state), dir, inserts)
    }

    async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn connection() -> Value {
        json!({"host": "ch.local", "port": 8123, "password": "pw"})
    }

    fn with_connection(extra: Value) -> Value {
        let mut body = connection();
        body.as_object_mut()
            .unwrap()
            .extend(extra.as_object().unwrap().clone());
        body
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _dir, _) = app(None);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_connect_requires_password() {
        let (app, _dir, _) = app(None);
        let (status, body) =
            post_json(app, "/api/ingest/connect", json!({"host": "ch.local", "port": 8123})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "CONFIG_ERROR");
    }

    #[tokio::test]
    async fn test_tables() {
        let (app, _dir, _) = app(None);
        let (status, body) = post_json(app, "/api/ingest/tables", connection()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tables"], json!(["users"]));
    }

    #[tokio::test]
    async fn test_download_writes_artifact() {
        let (app, dir, _) = app(None);
        let (status, body) = post_json(
            app,
            "/api/ingest/download",
            with_connection(json!({"table": "users", "columns": ["id"]})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 10);
        let filename = body["filename"].as_str().unwrap();
        let content = std::fs::read_to_string(dir.path().join(filename)).unwrap();
        assert_eq!(content.lines().count(), 11);
    }

    #[tokio::test]
    async fn test_insert_success_and_partial_failure() {
        let (app_ok, dir, inserts) = app(None);
        let mut csv = String::from("id,name\n");
        for i in 0..10 {
            csv.push_str(&format!("{},n{}\n", i, i));
        }
        std::fs::write(dir.path().join("upload.csv"), &csv).unwrap();

        let request = with_connection(json!({
            "table": "users", "filename": "upload.csv", "columns": ["id", "name"]
        }));
        let (status, body) = post_json(app_ok, "/api/ingest/insert", request.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 10);
        assert_eq!(body["committed"], 10);
        assert_eq!(inserts.load(Ordering::SeqCst), 3);

        let (app_failing, dir, _) = app(Some(2));
        std::fs::write(dir.path().join("upload.csv"), &csv).unwrap();
        let (status, body) = post_json(app_failing, "/api/ingest/insert", request).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["success"], false);
        assert_eq!(body["count"], 10);
        assert_eq!(body["committed"], 6);
        assert_eq!(body["error"]["code"], "INSERT_ERROR");
    }

    #[tokio::test]
    async fn test_insert_missing_file() {
        let (app, _dir, _) = app(None);
        let (status, body) = post_json(
            app,
            "/api/ingest/insert",
            with_connection(json!({"filename": "absent.csv", "columns": ["id"]})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_file_preview() {
        let (app, dir, _) = app(None);
        std::fs::write(dir.path().join("people.csv"), "id;name\n1;ada\n2;grace\n").unwrap();
        let (status, body) = post_json(
            app,
            "/api/ingest/file-preview",
            json!({"filename": "people.csv", "columns": ["name"], "delimiter": ";"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!([{"name": "ada"}, {"name": "grace"}]));
    }

    #[tokio::test]
    async fn test_connect_rejects_negative_port_as_config_error() {
        let (app, _dir, _) = app(None);
        let (status, body) = post_json(
            app,
            "/api/ingest/connect",
            json!({"host": "ch.local", "port": -1, "password": "pw"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "CONFIG_ERROR");
    }

    fn multipart_upload(filename: &str, content_type: &str, content: &str) -> Request<Body> {
        let body = format!(
            "--XBOUNDARY\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n\
             Content-Type: {}\r\n\r\n\
             {}\r\n\
             --XBOUNDARY--\r\n",
            filename, content_type, content
        );
        Request::builder()
            .method("POST")
            .uri("/api/ingest/upload")
            .header("content-type", "multipart/form-data; boundary=XBOUNDARY")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_upload_then_preview() {
        let (app, dir, _) = app(None);
        let response = app
            .clone()
            .oneshot(multipart_upload("people.csv", "text/csv", "id,name\n1,ada\n2,grace\n"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(body["success"], true);
        assert_eq!(body["originalname"], "people.csv");
        let filename = body["filename"].as_str().unwrap();
        assert!(filename.starts_with("file-") && filename.ends_with(".csv"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join(filename)).unwrap(),
            "id,name\n1,ada\n2,grace\n"
        );

        let (status, preview) = post_json(
            app,
            "/api/ingest/file-preview",
            json!({"filename": filename, "columns": ["name"]}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(preview["data"], json!([{"name": "ada"}, {"name": "grace"}]));
    }

    #[tokio::test]
    async fn test_upload_rejects_non_csv() {
        let (app, dir, _) = app(None);
        let response = app
            .oneshot(multipart_upload("report.pdf", "application/pdf", "%PDF-1.4"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_uploads_hide_partial_artifacts() {
        let (app, dir, _) = app(None);
        std::fs::write(dir.path().join(".export_users_1.csv.abc.part"), "\"id\"\n1\n").unwrap();
        std::fs::write(dir.path().join("export_users_1.csv"), "\"id\"\n1\n").unwrap();

        for uri in [
            "/uploads/.export_users_1.csv.abc.part",
            "/uploads/%2Eexport_users_1.csv.abc.part",
        ] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
        }

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/uploads/export_users_1.csv")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
