/*!
 * Configuration for the Pixelwatch CLI and server
 */

use crate::error::{AppError, Result};
use pixelwatch_server::{ApiLimits, ServerConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration, loaded from TOML
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelwatchConfig {
    /// Log level for diagnostic output
    #[serde(default)]
    pub log_level: LogLevel,

    /// Write JSON logs to this file instead of the terminal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    /// Force debug logging
    #[serde(default)]
    pub verbose: bool,

    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub database: DatabaseSection,

    #[serde(default)]
    pub api: ApiSection,
}

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// SQLite store settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "default_db_path")]
    pub path: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a writer waits on a locked database
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

/// Request limits of the HTTP API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiSection {
    #[serde(default = "default_heartbeat_limit")]
    pub default_heartbeat_limit: u32,

    #[serde(default = "default_max_heartbeat_limit")]
    pub max_heartbeat_limit: u32,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Log level for diagnostic output
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_db_path() -> String {
    "pixelwatch.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_heartbeat_limit() -> u32 {
    50
}

fn default_max_heartbeat_limit() -> u32 {
    500
}

fn default_max_body_bytes() -> usize {
    64 * 1024 // 64 KiB
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            default_heartbeat_limit: default_heartbeat_limit(),
            max_heartbeat_limit: default_max_heartbeat_limit(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for PixelwatchConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            log_file: None,
            verbose: false,
            server: ServerSection::default(),
            database: DatabaseSection::default(),
            api: ApiSection::default(),
        }
    }
}

impl PixelwatchConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&contents)
            .map_err(|e| AppError::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(format!("Failed to serialize config: {}", e)))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Load from an explicit path, else the default location if it exists, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Apply `PIXELWATCH_DB`, `PIXELWATCH_HOST` and `PIXELWATCH_PORT`
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply environment-style overrides from an arbitrary lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = lookup("PIXELWATCH_DB") {
            self.database.path = db;
        }
        if let Some(host) = lookup("PIXELWATCH_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PIXELWATCH_PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| AppError::Config(format!("Invalid PIXELWATCH_PORT: {}", port)))?;
        }
        Ok(())
    }

    /// Settings handed to the API server
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            database: self.database.path.clone(),
            max_connections: self.database.max_connections,
            busy_timeout_ms: self.database.busy_timeout_ms,
            limits: ApiLimits {
                default_heartbeat_limit: self.api.default_heartbeat_limit,
                max_heartbeat_limit: self.api.max_heartbeat_limit,
                max_body_bytes: self.api.max_body_bytes,
            },
        }
    }
}

/// Default config location: `~/.pixelwatch/pixelwatch.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".pixelwatch").join("pixelwatch.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = PixelwatchConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.path, "pixelwatch.db");
        assert_eq!(config.api.default_heartbeat_limit, 50);
        assert_eq!(config.api.max_body_bytes, 65536);
        assert_eq!(config.log_level, LogLevel::Info);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: PixelwatchConfig = toml::from_str(
            r#"
            log_level = "debug"

            [database]
            path = "/var/lib/pixelwatch/pw.db"
            "#,
        )
        .unwrap();

        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.database.path, "/var/lib/pixelwatch/pw.db");
        assert_eq!(config.database.busy_timeout_ms, 5000);
        assert_eq!(config.server, ServerSection::default());
    }

    #[test]
    fn test_file_round_trip() {
        let tmp = NamedTempFile::new().unwrap();
        let mut config = PixelwatchConfig::default();
        config.server.port = 9090;
        config.log_file = Some(PathBuf::from("pixelwatch.log"));

        config.to_file(tmp.path()).unwrap();
        let loaded = PixelwatchConfig::from_file(tmp.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PIXELWATCH_DB", "/tmp/other.db"),
            ("PIXELWATCH_PORT", "3000"),
        ]
        .into_iter()
        .collect();

        let mut config = PixelwatchConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.database.path, "/tmp/other.db");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_invalid_port_override() {
        let mut config = PixelwatchConfig::default();
        let err = config
            .apply_overrides(|key| (key == "PIXELWATCH_PORT").then(|| "http".to_string()))
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_server_config_carries_limits() {
        let mut config = PixelwatchConfig::default();
        config.api.max_heartbeat_limit = 100;
        let server = config.server_config();
        assert_eq!(server.limits.max_heartbeat_limit, 100);
        assert_eq!(server.bind_addr(), "127.0.0.1:8080");
    }
}
