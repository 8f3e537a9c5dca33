// ClickHouse adapter using the HTTP interface
// Queries go in the POST body, output format and settings ride on the URL.
use crate::api::middleware::AppError;
use crate::models::Record;
use crate::services::database::adapter::{AnalyticsStore, OutputFormat, QueryResult};
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use url::Url;

/// Application name sent as the user agent.
pub const APPLICATION_NAME: &str = "data-ingestion-tool";

/// Client-side settings shared by every handle.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub query_timeout: Duration,
    pub async_insert: bool,
    pub compression: bool,
    pub accept_invalid_certs: bool,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(300),
            async_insert: true,
            compression: true,
            accept_invalid_certs: false,
        }
    }
}

pub struct ClickHouseClient {
    base_url: Url,
    username: String,
    password: String,
    settings: StoreSettings,
    client: Client,
}

impl ClickHouseClient {
    /// Construct a handle. No network I/O happens until the first request.
    pub fn new(
        base_url: Url,
        username: String,
        password: String,
        settings: StoreSettings,
    ) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(APPLICATION_NAME)
            .danger_accept_invalid_certs(settings.accept_invalid_certs)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            username,
            password,
            settings,
            client,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    fn request(&self) -> RequestBuilder {
        let mut request = self
            .client
            .post(self.base_url.clone())
            .header("X-ClickHouse-User", &self.username)
            .header("X-ClickHouse-Key", &self.password);
        if self.settings.compression {
            request = request.query(&[("enable_http_compression", "1")]);
        }
        request
    }

    /// Run `operation` under the query deadline; the deadline covers the
    /// response head and the whole body.
    async fn with_deadline<T, F>(&self, what: &str, operation: F) -> Result<T, AppError>
    where
        F: std::future::Future<Output = Result<T, AppError>>,
    {
        tokio::time::timeout(self.settings.query_timeout, operation)
            .await
            .map_err(|_| {
                AppError::Query(format!(
                    "{} timed out after {} seconds",
                    what,
                    self.settings.query_timeout.as_secs_f64()
                ))
            })?
    }

    /// Send a request and reject non-2xx responses and exception headers.
    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response, AppError> {
        let response = request
            .send()
            .await
            .map_err(|e| AppError::Query(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Query(format!(
                "ClickHouse {} failed ({}): {}",
                what,
                status,
                error_body.trim()
            )));
        }

        if let Some(code) = response.headers().get("X-ClickHouse-Exception-Code") {
            return Err(AppError::Query(format!(
                "ClickHouse {} failed with exception code {}",
                what,
                code.to_str().unwrap_or("unknown")
            )));
        }

        Ok(response)
    }

    /// Encode a batch as JSONEachRow.
    fn encode_rows(rows: &[Record]) -> Result<Vec<u8>, AppError> {
        let mut body = Vec::with_capacity(rows.len() * 64);
        for row in rows {
            serde_json::to_writer(&mut body, row)
                .map_err(|e| AppError::Internal(format!("Failed to encode row: {}", e)))?;
            body.push(b'\n');
        }
        Ok(body)
    }
}

#[async_trait::async_trait]
impl AnalyticsStore for ClickHouseClient {
    async fn query_rows(&self, sql: &str) -> Result<QueryResult, AppError> {
        let start_time = Instant::now();

        let request = self
            .request()
            .query(&[("default_format", OutputFormat::JsonEachRow.as_str())])
            .body(sql.to_string());
        let body = self
            .with_deadline("query", async {
                self.send(request, "query")
                    .await?
                    .text()
                    .await
                    .map_err(|e| AppError::Query(format!("Failed to read ClickHouse response: {}", e)))
            })
            .await?;

        let rows = body
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str::<Value>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::Query(format!("Failed to parse ClickHouse response: {}", e)))?;

        let row_count = rows.len();
        Ok(QueryResult {
            rows,
            row_count,
            execution_time_ms: start_time.elapsed().as_millis() as u64,
        })
    }

    async fn query_to_writer(
        &self,
        sql: &str,
        format: OutputFormat,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, AppError> {
        // Buffer the result server-side so late failures surface as an error status.
        let request = self
            .request()
            .query(&[("default_format", format.as_str()), ("wait_end_of_query", "1")])
            .body(sql.to_string());

        self.with_deadline("export query", async {
            let response = self.send(request, "export query").await?;

            let mut written = 0u64;
            let mut tail: Vec<u8> = Vec::with_capacity(EXCEPTION_TAIL_BYTES * 2);
            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk
                    .map_err(|e| AppError::Query(format!("Result stream interrupted: {}", e)))?;
                sink.write_all(&chunk).await?;
                written += chunk.len() as u64;

                tail.extend_from_slice(&chunk);
                if tail.len() > EXCEPTION_TAIL_BYTES {
                    tail.drain(..tail.len() - EXCEPTION_TAIL_BYTES);
                }
            }
            sink.flush().await?;

            if let Some(message) = trailing_exception(&tail) {
                return Err(AppError::Query(format!(
                    "ClickHouse export query failed mid-stream: {}",
                    message
                )));
            }
            Ok(written)
        })
        .await
    }

    async fn insert(&self, table: &str, rows: &[Record]) -> Result<(), AppError> {
        if rows.is_empty() {
            return Ok(());
        }

        let statement = format!("INSERT INTO {} FORMAT {}", table, OutputFormat::JsonEachRow.as_str());
        let mut request = self.request().query(&[("query", statement.as_str())]);
        if self.settings.async_insert {
            request = request.query(&[("async_insert", "1"), ("wait_for_async_insert", "1")]);
        }
        let request = request.body(Self::encode_rows(rows)?);

        self.with_deadline("insert", self.send(request, "insert")).await?;
        Ok(())
    }
}

/// How much of the end of a streamed result is kept to look for an exception.
const EXCEPTION_TAIL_BYTES: usize = 4096;

/// Find an exception the server appended after the response head was sent.
///
/// ClickHouse writes `Code: <n>. DB::Exception: ...` into the body when a
/// query fails while its result is already streaming.
fn trailing_exception(tail: &[u8]) -> Option<String> {
    const MARKER: &[u8] = b"DB::Exception";
    const CODE: &[u8] = b"Code: ";

    let marker_at = tail.windows(MARKER.len()).rposition(|w| w == MARKER)?;
    let code_at = tail[..marker_at].windows(CODE.len()).rposition(|w| w == CODE)?;
    if marker_at - code_at > 16 {
        return None;
    }
    Some(String::from_utf8_lossy(&tail[code_at..]).trim().to_string())
}
