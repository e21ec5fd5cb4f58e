//! Configuration structures for the bets client.
//!
//! Configuration is loaded from TOML files once at startup and can be
//! overridden via CLI flags (which in turn read the `CLI_*` environment
//! variables). Nothing below the CLI reads the environment.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure. Read-only once constructed.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Client identity
    pub client: IdentityConfig,

    /// Server connection settings
    pub server: ServerConfig,

    /// Batching settings
    #[serde(default)]
    pub batch: BatchConfig,

    /// Record source settings
    #[serde(default)]
    pub source: SourceConfig,

    /// Monitoring configuration
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// Who this client is.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IdentityConfig {
    /// Client identity string (used in logs)
    #[serde(default)]
    pub id: String,

    /// Agency id attached to every record and control request
    pub agency: String,
}

/// Server connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Server address as `host:port`
    pub address: String,

    /// Maximum wire payload size in bytes (admission check)
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: usize,

    /// Largest response accepted from the server, in bytes
    #[serde(default = "default_max_response_size")]
    pub max_response_size: usize,

    /// Response deadline in milliseconds. Unset means wait forever.
    #[serde(default)]
    pub response_timeout_ms: Option<u64>,
}

impl ServerConfig {
    /// Response deadline as a `Duration`, if one is configured.
    pub fn response_timeout(&self) -> Option<Duration> {
        self.response_timeout_ms.map(Duration::from_millis)
    }
}

/// Batch accumulator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchConfig {
    /// Records per batch (flush threshold)
    #[serde(default = "default_batch_size")]
    pub size: usize,

    /// Pause between batch flushes in milliseconds
    #[serde(default)]
    pub loop_period_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size: default_batch_size(),
            loop_period_ms: 0,
        }
    }
}

impl BatchConfig {
    /// Pause between flushes, `None` when pacing is disabled.
    pub fn loop_period(&self) -> Option<Duration> {
        (self.loop_period_ms > 0).then(|| Duration::from_millis(self.loop_period_ms))
    }
}

/// Record source configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    /// Path of the zip archive holding per-agency entries
    #[serde(default = "default_archive_path")]
    pub archive_path: PathBuf,

    /// Entry name template; `{agency}` is replaced with the agency id
    #[serde(default = "default_entry_template")]
    pub entry_template: String,

    /// Field separator within a record line
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            archive_path: default_archive_path(),
            entry_template: default_entry_template(),
            delimiter: default_delimiter(),
        }
    }
}

/// Monitoring configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log format
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Log level.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level
    Trace,
    /// Debug level
    Debug,
    /// Info level (default)
    #[default]
    Info,
    /// Warn level
    Warn,
    /// Error level
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Plain text format (default)
    #[default]
    Text,
}

// Default value functions
fn default_max_packet_size() -> usize {
    8000
}
fn default_max_response_size() -> usize {
    64 * 1024
}
fn default_batch_size() -> usize {
    100
}
fn default_archive_path() -> PathBuf {
    PathBuf::from(".data/dataset.zip")
}
fn default_entry_template() -> String {
    "agency-{agency}.csv".to_string()
}
fn default_delimiter() -> char {
    ','
}

impl ClientConfig {
    /// Build a config with defaults for everything but identity and address.
    pub fn new(agency: impl Into<String>, address: impl Into<String>) -> Self {
        let agency = agency.into();
        Self {
            client: IdentityConfig {
                id: agency.clone(),
                agency,
            },
            server: ServerConfig {
                address: address.into(),
                max_packet_size: default_max_packet_size(),
                max_response_size: default_max_response_size(),
                response_timeout_ms: None,
            },
            batch: BatchConfig::default(),
            source: SourceConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML without validating, so overrides can be applied first.
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if self.client.agency.trim().is_empty() {
            return Err(crate::Error::Config("Agency id is required".into()));
        }

        match self.server.address.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {}
            _ => {
                return Err(crate::Error::Config(format!(
                    "Server address must be host:port, got '{}'",
                    self.server.address
                )));
            }
        }

        if self.batch.size == 0 {
            return Err(crate::Error::Config(
                "Batch size must be greater than zero".into(),
            ));
        }

        if self.server.max_packet_size == 0 {
            return Err(crate::Error::Config(
                "Max packet size must be greater than zero".into(),
            ));
        }

        if self.server.max_response_size == 0 {
            return Err(crate::Error::Config(
                "Max response size must be greater than zero".into(),
            ));
        }

        if self.source.entry_template.is_empty() {
            return Err(crate::Error::Config("Entry template is required".into()));
        }

        if !self.source.entry_template.contains("{agency}") {
            tracing::warn!(
                template = %self.source.entry_template,
                "Entry template has no {{agency}} placeholder, every agency reads the same entry"
            );
        }

        Ok(())
    }

    /// Name of the archive entry holding this agency's records.
    pub fn entry_name(&self) -> String {
        self.source
            .entry_template
            .replace("{agency}", &self.client.agency)
    }

    /// Identity used in log lines; falls back to the agency id.
    pub fn client_id(&self) -> &str {
        if self.client.id.is_empty() {
            &self.client.agency
        } else {
            &self.client.id
        }
    }
}
