//! Configuration
//!
//! Loads configuration from TOML files with environment variable
//! overrides. All knobs have working defaults, so every layer also
//! accepts a plain `Config::default()`.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Engine tuning knobs
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Initial record buffer capacity in bytes
    #[serde(default = "default_buffer_capacity")]
    pub initial_buffer_capacity: usize,

    /// Reject frames whose length prefix exceeds this many bytes
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,

    /// Chunk size for the CLI's stdin reader
    #[serde(default = "default_stdin_chunk_size")]
    pub stdin_chunk_size: usize,
}

fn default_buffer_capacity() -> usize {
    1024 * 1024 // 1 MiB
}

fn default_max_frame_len() -> usize {
    256 * 1024 * 1024 // 256 MiB
}

fn default_stdin_chunk_size() -> usize {
    64 * 1024 // 64 KiB
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_buffer_capacity: default_buffer_capacity(),
            max_frame_len: default_max_frame_len(),
            stdin_chunk_size: default_stdin_chunk_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: pretty or json
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

        Ok(config)
    }

    /// Load from a file, then apply environment overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load from the default locations, falling back to environment-only
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("framesql").join("config.toml")),
            Some(PathBuf::from("./framesql.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        Self::from_env()
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("FRAMESQL_BUFFER_CAPACITY") {
            if let Ok(n) = v.parse() {
                self.engine.initial_buffer_capacity = n;
            }
        }
        if let Ok(v) = std::env::var("FRAMESQL_MAX_FRAME_LEN") {
            if let Ok(n) = v.parse() {
                self.engine.max_frame_len = n;
            }
        }
        if let Ok(v) = std::env::var("FRAMESQL_STDIN_CHUNK_SIZE") {
            if let Ok(n) = v.parse() {
                self.engine.stdin_chunk_size = n;
            }
        }
        if let Ok(v) = std::env::var("FRAMESQL_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Ok(v) = std::env::var("FRAMESQL_LOG_FORMAT") {
            self.logging.format = v;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}
