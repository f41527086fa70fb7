//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.
//!
//! The credential table, the backend selection and the backend connection
//! parameters all live here and are handed to the gate and the store at
//! startup.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::storage::remote::RemoteOptions;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which storage backend the client uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Key/value files in `data_dir`
    Local,
    /// SQLite database at `database_path`
    Sqlite,
    /// Hosted API at `api_url`
    Remote,
}

impl BackendKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Some(BackendKind::Local),
            "sqlite" => Some(BackendKind::Sqlite),
            "remote" => Some(BackendKind::Remote),
            _ => None,
        }
    }
}

/// Storage backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: BackendKind,

    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default = "default_database_path")]
    pub database_path: String,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Key sent to the hosted API
    #[serde(default)]
    pub access_key: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_backend() -> BackendKind {
    BackendKind::Local
}

fn data_root() -> PathBuf {
    dirs::data_local_dir()
        .map(|p| p.join("keepsake"))
        .unwrap_or_else(|| PathBuf::from("./keepsake_data"))
}

fn default_data_dir() -> String {
    data_root().join("posts").to_string_lossy().to_string()
}

fn default_database_path() -> String {
    data_root().join("keepsake.db").to_string_lossy().to_string()
}

fn default_api_url() -> String {
    "http://localhost:8090".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            data_dir: default_data_dir(),
            database_path: default_database_path(),
            api_url: default_api_url(),
            access_key: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl StorageConfig {
    /// Connection options for the remote backend
    pub fn remote_options(&self) -> RemoteOptions {
        RemoteOptions {
            base_url: self.api_url.trim_end_matches('/').to_string(),
            access_key: self.access_key.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Key every `/api/v1` request must carry; `None` disables the check
    #[serde(default)]
    pub access_key: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_realtime_connections: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_max_connections() -> usize {
    256
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
            access_key: None,
            max_realtime_connections: default_max_connections(),
        }
    }
}

impl ApiConfig {
    /// Create config with custom host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Login credentials: display name → numeric code
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_users")]
    pub users: BTreeMap<String, String>,
}

fn default_users() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("귀연".to_string(), "951027".to_string()),
        ("소영".to_string(), "000521".to_string()),
    ])
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            users: default_users(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from an explicit path, or from default locations or environment
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_with_env(path),
            None => Ok(Self::load_default()),
        }
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("keepsake").join("config.toml")),
            Some(PathBuf::from("/etc/keepsake/config.toml")),
            Some(PathBuf::from("./keepsake.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        // Storage overrides
        if let Ok(backend) = std::env::var("KEEPSAKE_BACKEND") {
            match BackendKind::parse(&backend) {
                Some(kind) => self.storage.backend = kind,
                None => tracing::warn!(backend = %backend, "Unknown KEEPSAKE_BACKEND ignored"),
            }
        }
        if let Ok(data_dir) = std::env::var("KEEPSAKE_DATA_DIR") {
            self.storage.data_dir = data_dir;
        }
        if let Ok(database) = std::env::var("KEEPSAKE_DATABASE") {
            self.storage.database_path = database;
        }
        if let Ok(url) = std::env::var("KEEPSAKE_API_URL") {
            self.storage.api_url = url;
        }
        if let Ok(key) = std::env::var("KEEPSAKE_ACCESS_KEY") {
            // One key serves both ends of a deployment.
            self.storage.access_key = Some(key.clone());
            self.api.access_key = Some(key);
        }

        // API overrides
        if let Ok(host) = std::env::var("KEEPSAKE_API_HOST") {
            self.api.host = host;
        }
        if let Ok(port) = std::env::var("KEEPSAKE_API_PORT") {
            if let Ok(p) = port.parse() {
                self.api.port = p;
            }
        }

        // Logging overrides
        if let Ok(level) = std::env::var("KEEPSAKE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("KEEPSAKE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Keepsake Configuration
#
# Environment variables override these settings:
# - KEEPSAKE_BACKEND (local, sqlite, remote)
# - KEEPSAKE_DATA_DIR
# - KEEPSAKE_DATABASE
# - KEEPSAKE_API_URL
# - KEEPSAKE_ACCESS_KEY
# - KEEPSAKE_API_HOST
# - KEEPSAKE_API_PORT
# - KEEPSAKE_LOG_LEVEL
# - KEEPSAKE_LOG_FORMAT

[storage]
# Backend used by the journal client: local, sqlite or remote
backend = "local"

# Directory holding one file per post (local backend)
data_dir = "~/.local/share/keepsake/posts"

# Database file (sqlite backend, and the API server)
database_path = "~/.local/share/keepsake/keepsake.db"

# Hosted API base URL (remote backend)
api_url = "http://localhost:8090"

# Key sent to the hosted API
# access_key = ""

# HTTP request timeout in seconds (remote backend)
request_timeout_secs = 30

[api]
# API server host
host = "0.0.0.0"

# API server port
port = 8090

# Allowed CORS origins (empty = any)
cors_origins = []

# Require this key on every /api/v1 request
# access_key = ""

# Maximum concurrent realtime connections
max_realtime_connections = 256

[auth.users]
# Display name = numeric code
"귀연" = "951027"
"소영" = "000521"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
