//! Application configuration
//!
//! Configuration is layered: built-in defaults, an optional `gridscope.toml`
//! file, then `GRIDSCOPE_*` environment variables (a `.env` file is loaded
//! first when present). Nested keys use `__` as separator, e.g.
//! `GRIDSCOPE_SERVER__PORT=8080`.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins; empty means no CORS headers are emitted.
    pub cors_origins: Vec<String>,
    pub max_request_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: Vec::new(),
            max_request_body_size: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    /// Database used by the full-stack test suite; those tests are skipped
    /// when unset.
    pub test_database_url: Option<String>,
    pub pool_min_size: u32,
    pub pool_max_size: u32,
    pub pool_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost:5432/gridscope".to_string(),
            test_database_url: None,
            pool_min_size: 1,
            pool_max_size: 20,
            pool_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for application data.
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl StorageConfig {
    /// Directory holding the network model files.
    pub fn networks_dir(&self) -> PathBuf {
        self.data_dir.join("networks")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// When disabled every caller is anonymous and sees all networks.
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Token handed to the map frontend; never validated server-side.
    pub mapbox_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    /// Run workers inside the server process in addition to any standalone
    /// worker binaries.
    pub enabled: bool,
    pub worker_count: usize,
    /// A `running` job older than this is considered abandoned by a dead
    /// worker and failed by the reaper.
    pub stale_job_timeout_seconds: u64,
    pub reap_interval_seconds: u64,
    pub reconnect_initial_seconds: u64,
    pub reconnect_max_seconds: u64,
    pub reconnect_jitter_ratio: f64,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            worker_count: 2,
            stale_job_timeout_seconds: 1800,
            reap_interval_seconds: 60,
            reconnect_initial_seconds: 1,
            reconnect_max_seconds: 30,
            reconnect_jitter_ratio: 0.2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    pub json: bool,
    /// When set, logs are also written to daily-rotated files in this
    /// directory.
    pub file_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "gridscope=info,sqlx=warn".to_string(),
            json: false,
            file_dir: None,
        }
    }
}

impl Config {
    /// Load configuration from defaults, optional `gridscope.toml`, and
    /// `GRIDSCOPE_*` environment variables.
    pub fn load() -> anyhow::Result<Self> {
        // Best effort; a missing .env file is not an error.
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::File::with_name("gridscope").required(false))
            .add_source(
                config::Environment::with_prefix("GRIDSCOPE")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins"),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Sanity-check values that would otherwise fail deep inside a worker or
    /// the connection pool.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.database.url.is_empty() {
            return Err("database.url must not be empty".to_string());
        }
        if self.database.pool_max_size == 0 {
            return Err("database.pool_max_size must be at least 1".to_string());
        }
        if self.database.pool_min_size > self.database.pool_max_size {
            return Err("database.pool_min_size must not exceed pool_max_size".to_string());
        }
        if self.workers.worker_count == 0 && self.workers.enabled {
            return Err("workers.worker_count must be at least 1 when workers are enabled".into());
        }
        if !(0.0..=1.0).contains(&self.workers.reconnect_jitter_ratio) {
            return Err("workers.reconnect_jitter_ratio must be within [0, 1]".to_string());
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.server.host, self.server.port);
        addr.parse()
            .map_err(|e| anyhow::anyhow!("invalid server address {addr}: {e}"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            storage: StorageConfig::default(),
            auth: AuthConfig::default(),
            map: MapConfig::default(),
            workers: WorkersConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
