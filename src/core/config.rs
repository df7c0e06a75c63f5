//! Configuration management for tracedock.
//!
//! This module provides configuration handling with:
//! - YAML file support
//! - Environment variable and CLI overrides (applied by the CLI)
//! - Validation and defaults
//!
//! The `pipelines` section declares per-pipeline span rules. They are parsed
//! and shape-checked here but not yet applied to ingested data.

use crate::core::{Result, TracedockError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration file read when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/tracedock/config.yaml";

/// Complete configuration for tracedock
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,
    /// Plugin discovery configuration
    pub plugins: PluginsConfig,
    /// Performance tuning
    pub performance: PerformanceConfig,
    /// Span processing pipelines
    pub pipelines: Vec<PipelineConfig>,
    /// Receiver configuration
    pub server: ServerConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level
    pub level: LogLevel,
}

/// Plugin discovery configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    /// Folders scanned for plugins
    pub folders: Vec<PathBuf>,
}

/// Performance configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Memory limiter settings
    pub memory_limiter: MemoryLimiterConfig,
}

/// Memory limiter configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryLimiterConfig {
    /// What to do once the limit is reached, e.g. `disk_dump`
    pub strategy: String,
    /// Maximum consumption, e.g. `4096m`
    pub max_consumption: String,
}

/// A named pipeline and its ordered rules
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,
    /// Rules applied in order
    pub rules: Vec<PipelineRule>,
}

/// A single pipeline rule.
///
/// `match` and `missing` are keyed by subject (`attributes`, `duration`, ...)
/// and then by field; `set` maps attribute names to replacement values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineRule {
    /// Rule provider, e.g. `eraser`
    pub provider: String,
    /// Predicates that must match
    #[serde(rename = "match")]
    pub match_: HashMap<String, HashMap<String, String>>,
    /// Predicates that must be absent
    pub missing: HashMap<String, HashMap<String, String>>,
    /// Attributes to set on matching spans
    pub set: HashMap<String, String>,
}

/// Receiver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address of the OTLP/gRPC receiver
    pub grpc_addr: String,
    /// Bind address of the OTLP/HTTP receiver
    pub http_addr: String,
    /// Grace period given to in-flight HTTP requests on shutdown
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    /// Maximum accepted HTTP request body, in bytes
    pub max_body_size: usize,
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Everything, including per-request spans
    #[serde(alias = "TRACE")]
    Trace,
    /// Per-export details such as span counts
    #[serde(alias = "DEBUG")]
    Debug,
    /// Lifecycle events
    #[serde(alias = "INFO")]
    Info,
    /// Rejected exports and slow shutdowns
    #[serde(alias = "WARN")]
    Warn,
    /// Failures only
    #[serde(alias = "ERROR")]
    Error,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: LogLevel::Info,
        }
    }
}

impl Default for PluginsConfig {
    fn default() -> Self {
        PluginsConfig {
            folders: vec![PathBuf::from("/etc/tracedock/plugins")],
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            grpc_addr: "0.0.0.0:4317".to_string(),
            http_addr: "0.0.0.0:4318".to_string(),
            shutdown_timeout: Duration::from_secs(5),
            max_body_size: 16 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    ///
    /// Falls back to [`DEFAULT_CONFIG_PATH`] when `path` is `None`, and to the
    /// built-in defaults if that file does not exist. An explicitly given file
    /// that is missing is reported as an IO error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Path::new(DEFAULT_CONFIG_PATH),
            None => {
                tracing::debug!("No config file at {}, using defaults", DEFAULT_CONFIG_PATH);
                return Ok(Config::default());
            },
        };
        let content = std::fs::read_to_string(path)?;

        let config = ConfigBuilder::new().from_yaml(&content)?.build()?;
        tracing::debug!("Loaded configuration from: {:?}", path);
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.grpc_addr == self.server.http_addr {
            return Err(TracedockError::config(format!(
                "GRPC and HTTP addresses must be different: both set to {}",
                self.server.grpc_addr
            )));
        }

        if self.server.max_body_size == 0 {
            return Err(TracedockError::config("max_body_size must be greater than 0"));
        }

        if self.server.shutdown_timeout.is_zero() {
            return Err(TracedockError::config("shutdown_timeout must be greater than 0"));
        }

        for (index, pipeline) in self.pipelines.iter().enumerate() {
            if pipeline.name.is_empty() {
                return Err(TracedockError::config(format!("pipeline #{} has no name", index)));
            }

            if let Some(position) = pipeline.rules.iter().position(|r| r.provider.is_empty()) {
                return Err(TracedockError::config(format!(
                    "rule #{} of pipeline '{}' has no provider",
                    position, pipeline.name
                )));
            }
        }

        Ok(())
    }
}

impl LogLevel {
    /// Convert to tracing filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Configuration builder for programmatic construction
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        ConfigBuilder {
            config: Config::default(),
        }
    }

    /// Load configuration from YAML string
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        self.config = serde_yaml::from_str(yaml)
            .map_err(|e| TracedockError::config(format!("Failed to parse YAML config: {}", e)))?;
        Ok(self)
    }

    /// Set the gRPC bind address
    pub fn grpc_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.server.grpc_addr = addr.into();
        self
    }

    /// Set the HTTP bind address
    pub fn http_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.server.http_addr = addr.into();
        self
    }

    /// Set the log level
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.log.level = level;
        self
    }

    /// Set the HTTP shutdown grace period
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.server.shutdown_timeout = timeout;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
