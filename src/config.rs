use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::services::database::StoreSettings;
use crate::services::ImportOptions;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub transfer: TransferConfig,
    pub clickhouse: ClickHouseConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Holds uploaded inputs and export artifacts.
    pub upload_dir: String,
    /// Largest accepted upload request body.
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferConfig {
    pub batch_size: usize,
    pub preview_limit: u64,
    pub query_timeout_secs: u64,
    pub insert_timeout_secs: u64,
    pub default_table: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClickHouseConfig {
    pub async_insert: bool,
    pub compression: bool,
    pub accept_invalid_certs: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Try to load from .env file
        let _ = dotenv::dotenv();

        let mut builder = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 4000)?
            .set_default("storage.upload_dir", "./uploads")?
            .set_default("storage.max_upload_bytes", 512 * 1024 * 1024)?
            .set_default("transfer.batch_size", 1000)?
            .set_default("transfer.preview_limit", 5)?
            .set_default("transfer.query_timeout_secs", 300)?
            .set_default("transfer.insert_timeout_secs", 120)?
            .set_default("transfer.default_table", "default_table")?
            .set_default("clickhouse.async_insert", true)?
            .set_default("clickhouse.compression", true)?
            .set_default("clickhouse.accept_invalid_certs", false)?
            .set_default("logging.level", "info")?;

        // Load from environment variables
        let overrides = [
            ("HOST", "server.host"),
            ("PORT", "server.port"),
            ("UPLOAD_DIR", "storage.upload_dir"),
            ("MAX_UPLOAD_BYTES", "storage.max_upload_bytes"),
            ("IMPORT_BATCH_SIZE", "transfer.batch_size"),
            ("PREVIEW_LIMIT", "transfer.preview_limit"),
            ("QUERY_TIMEOUT_SECS", "transfer.query_timeout_secs"),
            ("INSERT_TIMEOUT_SECS", "transfer.insert_timeout_secs"),
            ("DEFAULT_IMPORT_TABLE", "transfer.default_table"),
            ("CLICKHOUSE_ASYNC_INSERT", "clickhouse.async_insert"),
            ("CLICKHOUSE_COMPRESSION", "clickhouse.compression"),
            ("CLICKHOUSE_ACCEPT_INVALID_CERTS", "clickhouse.accept_invalid_certs"),
            ("RUST_LOG", "logging.level"),
        ];
        for (var, key) in overrides {
            if let Ok(value) = env::var(var) {
                builder = builder.set_override(key, value)?;
            }
        }

        builder.build()?.try_deserialize()
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            query_timeout: Duration::from_secs(self.transfer.query_timeout_secs),
            async_insert: self.clickhouse.async_insert,
            compression: self.clickhouse.compression,
            accept_invalid_certs: self.clickhouse.accept_invalid_certs,
        }
    }

    pub fn import_options(&self) -> ImportOptions {
        ImportOptions {
            batch_size: self.transfer.batch_size.max(1),
            flush_timeout: Duration::from_secs(self.transfer.insert_timeout_secs),
            default_table: self.transfer.default_table.clone(),
        }
    }
}
