use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub extractor: ExtractorConfig,
    pub progress: ProgressConfig,
    pub channels: ChannelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

/// External extraction engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Path or name of the yt-dlp executable
    pub binary: String,
    /// Upper bound for a metadata lookup
    pub timeout_seconds: u64,
    /// Read buffer for the payload relay, in bytes
    pub chunk_size: usize,
    /// Format selector used when the client does not name a variant
    pub default_format: String,
    /// Extra arguments passed to every engine invocation (proxy, cookies, ...)
    pub extra_args: Vec<String>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            binary: "yt-dlp".to_string(),
            timeout_seconds: 60,
            chunk_size: 1024 * 1024,
            default_format: "best".to_string(),
            extra_args: Vec::new(),
        }
    }
}

impl ExtractorConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Synthetic progress reported on channel-tracked retrievals
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    pub steps: u8,
    pub tick_interval_ms: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            steps: 10,
            tick_interval_ms: 500,
        }
    }
}

impl ProgressConfig {
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Persistent channel limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Outbound events buffered per channel before senders wait
    pub queue_capacity: usize,
    /// Maximum concurrently connected channels
    pub max_channels: usize,
    /// Maximum inbound WebSocket message size in bytes
    pub max_message_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            max_channels: 10_000,
            max_message_size: 64 * 1024,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // MEDIAGATE_SERVER__HTTP_PORT, MEDIAGATE_EXTRACTOR__BINARY, ...
        builder = builder.add_source(
            Environment::with_prefix("MEDIAGATE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let mut config: Self = config.try_deserialize()?;

        // Plain PORT is honored for platform deployments
        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            config.server.http_port = port;
        }

        Ok(config)
    }

    /// Load from environment variables only (for Docker/K8s)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Check settings that would only fail later at runtime
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.http_port == 0 {
            errors.push("server.http_port must be non-zero".to_string());
        }
        if self.extractor.binary.trim().is_empty() {
            errors.push("extractor.binary must not be empty".to_string());
        }
        if self.extractor.chunk_size == 0 {
            errors.push("extractor.chunk_size must be non-zero".to_string());
        }
        if self.extractor.timeout_seconds == 0 {
            errors.push("extractor.timeout_seconds must be non-zero".to_string());
        }
        if self.progress.steps == 0 || self.progress.steps > 100 {
            errors.push("progress.steps must be between 1 and 100".to_string());
        }
        if self.channels.queue_capacity == 0 {
            errors.push("channels.queue_capacity must be non-zero".to_string());
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            errors.push(format!(
                "logging.format must be \"json\" or \"pretty\", got {:?}",
                self.logging.format
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Get HTTP address
    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.http_port)
    }
}
