//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub index: IndexSettings,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Index engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IndexSettings {
    /// How often staged writes become queryable
    #[serde(default = "default_materialize_interval")]
    pub materialize_interval_ms: u64,

    /// Service routed to the full index
    #[serde(default = "default_custom_service")]
    pub custom_service: String,

    /// Service routed to the text index
    #[serde(default = "default_text_service")]
    pub text_service: String,

    /// Largest accepted ingestion batch
    #[serde(default = "default_max_batch")]
    pub max_batch_messages: usize,
}

fn default_materialize_interval() -> u64 {
    30_000 // 30 seconds
}

fn default_custom_service() -> String {
    "custom".to_string()
}

fn default_text_service() -> String {
    "re".to_string()
}

fn default_max_batch() -> usize {
    10_000
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            materialize_interval_ms: default_materialize_interval(),
            custom_service: default_custom_service(),
            text_service: default_text_service(),
            max_batch_messages: default_max_batch(),
        }
    }
}

impl IndexSettings {
    pub fn materialize_interval(&self) -> Duration {
        Duration::from_millis(self.materialize_interval_ms)
    }
}

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origins; empty allows any
    #[serde(default)]
    pub cors_origins: Vec<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8085
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ApiConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
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

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.index.materialize_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "index.materialize_interval_ms",
                error: "must be greater than zero".to_string(),
            });
        }
        if self.index.max_batch_messages == 0 {
            return Err(ConfigError::Invalid {
                field: "index.max_batch_messages",
                error: "must be greater than zero".to_string(),
            });
        }
        Ok(())
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

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("virtindex").join("config.toml")),
            Some(PathBuf::from("/etc/virtindex/config.toml")),
            Some(PathBuf::from("./config.toml")),
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

        // Fall back to environment-only config
        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // API overrides
        if let Some(host) = lookup("VIRTINDEX_HOST") {
            self.api.host = host;
        }
        if let Some(port) = lookup("VIRTINDEX_PORT").and_then(|p| p.parse().ok()) {
            self.api.port = port;
        }

        // Index overrides
        match lookup("VIRTINDEX_MATERIALIZE_INTERVAL_MS").and_then(|v| v.parse::<u64>().ok()) {
            Some(0) => {
                tracing::warn!("Ignoring VIRTINDEX_MATERIALIZE_INTERVAL_MS=0");
            }
            Some(interval) => self.index.materialize_interval_ms = interval,
            None => {}
        }

        // Logging overrides
        if let Some(level) = lookup("VIRTINDEX_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("VIRTINDEX_LOG_FORMAT") {
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

    #[error("Invalid value for {field}: {error}")]
    Invalid { field: &'static str, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Virtindex Configuration
#
# Environment variables override these settings:
# - VIRTINDEX_HOST
# - VIRTINDEX_PORT
# - VIRTINDEX_MATERIALIZE_INTERVAL_MS
# - VIRTINDEX_LOG_LEVEL
# - VIRTINDEX_LOG_FORMAT

[index]
# How often buffered writes are materialized into queryable snapshots (ms)
materialize_interval_ms = 30000

# Service whose tags attach directly to metrics
custom_service = "custom"

# Service used for regex search over metric names
text_service = "re"

# Maximum number of messages accepted in one ingest batch
max_batch_messages = 10000

[api]
# API server host
host = "0.0.0.0"

# API server port
port = 8085

# Allowed CORS origins (empty allows any origin)
cors_origins = []

# Request timeout in seconds
request_timeout_secs = 30

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.index.materialize_interval_ms, 30_000);
        assert_eq!(config.index.custom_service, "custom");
        assert_eq!(config.index.text_service, "re");
        assert_eq!(config.api.addr(), "0.0.0.0:8085");
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_generated_config_parses() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        assert_eq!(config.index.max_batch_messages, 10_000);
        assert_eq!(config.api.port, 8085);
        assert!(config.api.cors_origins.is_empty());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[index]\nmaterialize_interval_ms = 500\n\n[api]\nport = 9000").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.index.materialize_interval(), Duration::from_millis(500));
        assert_eq!(config.index.text_service, "re");
        assert_eq!(config.api.port, 9000);
        assert_eq!(config.api.host, "0.0.0.0");
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(Config::load(&missing), Err(ConfigError::Io { .. })));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[index\nport = ").unwrap();
        assert!(matches!(Config::load(&bad), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("VIRTINDEX_HOST", "127.0.0.1"),
            ("VIRTINDEX_PORT", "not-a-port"),
            ("VIRTINDEX_MATERIALIZE_INTERVAL_MS", "1000"),
            ("VIRTINDEX_LOG_FORMAT", "json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.api.host, "127.0.0.1");
        assert_eq!(config.api.port, 8085);
        assert_eq!(config.index.materialize_interval_ms, 1000);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[index]\nmaterialize_interval_ms = 0").unwrap();
        assert!(matches!(
            Config::load(file.path()),
            Err(ConfigError::Invalid {
                field: "index.materialize_interval_ms",
                ..
            })
        ));

        let mut config = Config::default();
        config.apply_overrides(|name| {
            (name == "VIRTINDEX_MATERIALIZE_INTERVAL_MS").then(|| "0".to_string())
        });
        assert_eq!(config.index.materialize_interval_ms, 30_000);
        assert!(config.validate().is_ok());
    }
}
