//! Configuration management for the store.
//!
//! Settings are loaded from a TOML file with environment-variable overrides,
//! following the same layering the rest of the ecosystem uses.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration loaded once per process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Connection settings for the backing document database.
    pub connection: ConnectionConfig,

    /// Chunking and segmentation defaults (spec.md §4.1).
    pub chunking: ChunkingConfig,

    /// Pruning defaults (spec.md §4.5).
    pub prune: PruneConfig,

    /// Quota sampling defaults (spec.md §4.8).
    pub quota: QuotaConfig,

    /// Metrics and monitoring.
    pub metrics: MetricsConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Connection settings (spec.md §6 Environment).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Connection URI for the backing document database.
    pub uri: String,

    /// Optional credentials provider endpoint, consulted on `reset()`.
    pub credentials_endpoint: Option<String>,

    /// Per-call deadline applied when the caller does not supply one
    /// (spec.md §5 Cancellation/timeouts).
    #[serde(with = "humantime_duration")]
    pub default_deadline: Duration,

    /// Maximum backoff applied to transient-error retries.
    #[serde(with = "humantime_duration")]
    pub max_retry_backoff: Duration,
}

/// Chunking defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Target pre-compression segment size in bytes (spec.md §4.1, ~2 MiB).
    pub target_segment_bytes: usize,
}

/// Prune defaults (spec.md §4.5, §9 Open Questions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruneConfig {
    /// Minimum age of a version before it is eligible for pruning, to
    /// avoid racing concurrent readers that already resolved a version id.
    #[serde(with = "humantime_duration")]
    pub grace_period: Duration,
}

/// Quota sampling defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Minimum interval between re-sampling a library's storage size.
    #[serde(with = "humantime_duration")]
    pub sample_interval: Duration,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable the Prometheus registry.
    pub enable_prometheus: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// Log format (`json` or `pretty`).
    pub format: String,

    /// Log file path (`None` means stdout).
    pub file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            chunking: ChunkingConfig::default(),
            prune: PruneConfig::default(),
            quota: QuotaConfig::default(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".to_string(),
            credentials_endpoint: None,
            default_deadline: Duration::from_secs(30),
            max_retry_backoff: Duration::from_secs(10),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_segment_bytes: 2 * 1024 * 1024,
        }
    }
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(10 * 60),
        }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(60),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enable_prometheus: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from `arctic-rs.toml` if present, then apply
    /// environment variable overrides, then validate.
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(file_config) = Self::from_file("arctic-rs.toml") {
            config = file_config;
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("failed to read config file: {e}")))?;

        toml::from_str(&contents).map_err(|e| Error::config(format!("failed to parse config file: {e}")))
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        use std::env;

        if let Ok(uri) = env::var("ARCTIC_RS_URI") {
            self.connection.uri = uri;
        }

        if let Ok(endpoint) = env::var("ARCTIC_RS_CREDENTIALS_ENDPOINT") {
            self.connection.credentials_endpoint = Some(endpoint);
        }

        if let Ok(bytes) = env::var("ARCTIC_RS_TARGET_SEGMENT_BYTES") {
            self.chunking.target_segment_bytes = bytes
                .parse()
                .map_err(|e| Error::config(format!("invalid target segment bytes: {e}")))?;
        }

        if let Ok(level) = env::var("ARCTIC_RS_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(format) = env::var("ARCTIC_RS_LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.chunking.target_segment_bytes == 0 {
            return Err(Error::config("target segment bytes must be non-zero"));
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => return Err(Error::config("invalid log level")),
        }

        Ok(())
    }
}

/// Serde helper for (de)serializing [`Duration`] as a human-readable string
/// like `"30s"` or `"10m"`, matching the TOML layout operators expect.
mod humantime_duration {
    use serde::de::{self, Deserializer, Visitor};
    use serde::Serializer;
    use std::fmt;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{}s", value.as_secs()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        struct DurationVisitor;

        impl<'de> Visitor<'de> for DurationVisitor {
            type Value = Duration;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a duration string like '30s' or '5m'")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Duration, E> {
                parse_duration(value).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(DurationVisitor)
    }

    fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse().map(Duration::from_millis).map_err(|_| "invalid milliseconds".to_string())
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse().map(Duration::from_secs).map_err(|_| "invalid seconds".to_string())
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.parse::<u64>().map(|m| Duration::from_secs(m * 60)).map_err(|_| "invalid minutes".to_string())
        } else if let Some(hours) = s.strip_suffix('h') {
            hours.parse::<u64>().map(|h| Duration::from_secs(h * 3600)).map_err(|_| "invalid hours".to_string())
        } else {
            s.parse().map(Duration::from_secs).map_err(|_| "invalid duration format".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_bad_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_segment_target() {
        let mut config = Config::default();
        config.chunking.target_segment_bytes = 0;
        assert!(config.validate().is_err());
    }
}
