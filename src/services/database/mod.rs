// Store access layer: connection factory plus the ClickHouse HTTP adapter
pub mod adapter;
pub mod clickhouse;

pub use adapter::{AnalyticsStore, OutputFormat, QueryResult};
pub use clickhouse::{ClickHouseClient, StoreSettings};

use crate::api::middleware::AppError;
use crate::models::ConnectionSpec;
use url::Url;

/// Ports on which the store serves HTTPS (HTTP interface and native TLS).
pub const SECURE_PORTS: [u16; 2] = [8443, 9440];

/// Derive the base URL from host and port.
///
/// A host that already names `http://` or `https://` keeps its scheme;
/// otherwise the scheme follows the port.
pub fn base_url(host: &str, port: u16) -> Result<Url, AppError> {
    let raw = if host.starts_with("http://") || host.starts_with("https://") {
        format!("{}:{}", host.trim_end_matches('/'), port)
    } else {
        let scheme = if SECURE_PORTS.contains(&port) { "https" } else { "http" };
        format!("{}://{}:{}", scheme, host, port)
    };

    Url::parse(&raw).map_err(|e| AppError::Config(format!("Invalid host '{}': {}", host, e)))
}

/// Build a lazy store handle from raw connection parameters.
pub fn build_handle(
    spec: &ConnectionSpec,
    settings: &StoreSettings,
) -> Result<ClickHouseClient, AppError> {
    let host = spec.host.trim();
    let password = spec.password.trim();

    if host.is_empty() {
        return Err(AppError::Config("Host is required".to_string()));
    }
    if password.is_empty() {
        return Err(AppError::Config("Password is required".to_string()));
    }

    let port = spec.port.as_port().ok_or_else(|| {
        AppError::Config(format!("Invalid port: {:?}", spec.port))
    })?;

    let url = base_url(host, port)?;
    let username = spec.effective_username();
    tracing::debug!("Built store handle for {} as {}", url, username);

    ClickHouseClient::new(url, username, password.to_string(), settings.clone())
}

/// Turns request connection parameters into a store handle.
///
/// Handlers go through this seam so a fresh handle is built per request.
pub trait StoreConnector: Send + Sync {
    fn connect(&self, spec: &ConnectionSpec) -> Result<Box<dyn AnalyticsStore>, AppError>;
}

/// Production connector backed by the ClickHouse HTTP interface.
pub struct ClickHouseConnector {
    settings: StoreSettings,
}

impl ClickHouseConnector {
    pub fn new(settings: StoreSettings) -> Self {
        Self { settings }
    }
}

impl StoreConnector for ClickHouseConnector {
    fn connect(&self, spec: &ConnectionSpec) -> Result<Box<dyn AnalyticsStore>, AppError> {
        Ok(Box::new(build_handle(spec, &self.settings)?))
    }
}
