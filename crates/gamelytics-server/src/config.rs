//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Credential transport and admin bootstrap.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Event ingestion limits.
    #[serde(default)]
    pub ingest: IngestConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Connections the pool keeps open while idle.
    #[serde(default = "default_pool_min_idle")]
    pub pool_min_idle: u32,

    /// Upper bound on pooled connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "gamelytics_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Authentication settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Name of the cookie carrying the login token.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Emails that become admin accounts when registered.
    #[serde(default)]
    pub admin_emails: Vec<String>,
}

/// Ingestion settings.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Largest accepted event batch. Clamped to what one insert can hold.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_db_path() -> String {
    "gamelytics.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_min_idle() -> u32 {
    1
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_cookie_name() -> String {
    "gamelytics_token".to_string()
}

fn default_max_batch_size() -> usize {
    1_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_min_idle: default_pool_min_idle(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            admin_emails: Vec::new(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
        }
    }
}

impl AuthConfig {
    /// Returns `true` if `email` is configured as an admin address.
    pub fn is_admin_email(&self, email: &str) -> bool {
        self.admin_emails
            .iter()
            .any(|admin| admin.eq_ignore_ascii_case(email))
    }
}

impl DatabaseConfig {
    /// Pool settings for [`gamelytics_db::create_pool`].
    pub fn runtime_settings(&self) -> gamelytics_db::DbRuntimeSettings {
        gamelytics_db::DbRuntimeSettings {
            busy_timeout_ms: self.busy_timeout_ms,
            pool_min_idle: self.pool_min_idle,
            pool_max_size: self.pool_max_size,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `GAMELYTICS_HOST` overrides `server.host`
/// - `GAMELYTICS_PORT` overrides `server.port`
/// - `GAMELYTICS_DB_PATH` overrides `database.path`
/// - `GAMELYTICS_LOG_LEVEL` overrides `logging.level`
/// - `GAMELYTICS_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `GAMELYTICS_COOKIE_NAME` overrides `auth.cookie_name`
/// - `GAMELYTICS_ADMIN_EMAILS` overrides `auth.admin_emails` (comma-separated)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    if let Ok(host) = std::env::var("GAMELYTICS_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Ok(port) = std::env::var("GAMELYTICS_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Ok(db_path) = std::env::var("GAMELYTICS_DB_PATH") {
        config.database.path = db_path;
    }
    if let Ok(level) = std::env::var("GAMELYTICS_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("GAMELYTICS_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Ok(cookie_name) = std::env::var("GAMELYTICS_COOKIE_NAME") {
        if !cookie_name.trim().is_empty() {
            config.auth.cookie_name = cookie_name;
        }
    }
    if let Ok(emails) = std::env::var("GAMELYTICS_ADMIN_EMAILS") {
        config.auth.admin_emails = emails
            .split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .collect();
    }

    let limit = gamelytics_store::events::MAX_EVENTS_PER_INSERT;
    if config.ingest.max_batch_size > limit {
        tracing::warn!(
            configured = config.ingest.max_batch_size,
            limit,
            "ingest.max_batch_size exceeds what one insert can hold, clamping"
        );
        config.ingest.max_batch_size = limit;
    }

    Ok(config)
}
