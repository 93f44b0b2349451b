//! Configuration management

use serde::{Deserialize, Serialize};

use crate::sync::{DEFAULT_PAGE_SIZE, DEFAULT_QUEUE_CAPACITY};

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/catsync";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

// ============================================================================
// Sync Configuration Constants
// ============================================================================

/// Largest accepted product page size.
pub const MAX_PAGE_SIZE: usize = 5000;

/// Default wall-clock limit for one sync run (1 hour).
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 3600;

/// Default per-request timeout for ERP calls.
pub const DEFAULT_ERP_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// Sync worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Start the worker and accept triggers
    pub enabled: bool,
    /// Products per chunk, also the price batch size
    pub page_size: usize,
    pub job_timeout_secs: u64,
    pub queue_capacity: usize,
    pub erp: ErpConfig,
}

/// ERP connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErpConfig {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_token: Option<String>,
    pub request_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            server: ServerConfig {
                host: std::env::var("CATSYNC_HOST").unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
                port: env_or("CATSYNC_PORT", DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: env_or("CATSYNC_SHUTDOWN_TIMEOUT", DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", DEFAULT_DATABASE_MAX_CONNECTIONS),
                min_connections: env_or("DATABASE_MIN_CONNECTIONS", DEFAULT_DATABASE_MIN_CONNECTIONS),
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
                idle_timeout_secs: env_or("DATABASE_IDLE_TIMEOUT", DEFAULT_DATABASE_IDLE_TIMEOUT_SECS),
            },
            sync: SyncConfig {
                enabled: env_or("SYNC_ENABLED", true),
                page_size: env_or("SYNC_PAGE_SIZE", DEFAULT_PAGE_SIZE),
                job_timeout_secs: env_or("SYNC_JOB_TIMEOUT_SECS", DEFAULT_JOB_TIMEOUT_SECS),
                queue_capacity: env_or("SYNC_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY),
                erp: ErpConfig {
                    base_url: std::env::var("ERP_BASE_URL").unwrap_or_default(),
                    api_token: std::env::var("ERP_API_TOKEN").ok().filter(|t| !t.is_empty()),
                    request_timeout_secs: env_or(
                        "ERP_REQUEST_TIMEOUT_SECS",
                        DEFAULT_ERP_REQUEST_TIMEOUT_SECS,
                    ),
                },
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        // Validate port
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        // Validate database URL
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        // Validate connection pool settings
        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        // Validate sync settings
        if !(1..=MAX_PAGE_SIZE).contains(&self.sync.page_size) {
            anyhow::bail!(
                "Sync page size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE,
                self.sync.page_size
            );
        }

        if self.sync.job_timeout_secs == 0 {
            anyhow::bail!("Sync job timeout must be greater than 0");
        }

        if self.sync.queue_capacity == 0 {
            anyhow::bail!("Sync queue capacity must be greater than 0");
        }

        if self.sync.enabled && self.sync.erp.base_url.trim().is_empty() {
            anyhow::bail!("ERP_BASE_URL must be set when sync is enabled");
        }

        if self.sync.enabled && self.sync.erp.api_token.is_none() {
            tracing::warn!("No ERP_API_TOKEN configured - ERP requests will be unauthenticated");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
            },
            sync: SyncConfig {
                enabled: true,
                page_size: DEFAULT_PAGE_SIZE,
                job_timeout_secs: DEFAULT_JOB_TIMEOUT_SECS,
                queue_capacity: DEFAULT_QUEUE_CAPACITY,
                erp: ErpConfig {
                    base_url: String::new(),
                    api_token: None,
                    request_timeout_secs: DEFAULT_ERP_REQUEST_TIMEOUT_SECS,
                },
            },
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
