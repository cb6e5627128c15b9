//! Configuration management for trackpoint.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "trackpoint";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "events.db";

/// Default identity file name for the command-line client.
const IDENTITY_FILE_NAME: &str = "identity.json";

/// Prefix for environment overrides.
const ENV_PREFIX: &str = "TRACKPOINT_";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `TRACKPOINT_`, nested keys split on `__`)
/// 2. TOML config file at `~/.config/trackpoint/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Aggregation configuration.
    pub aggregation: AggregationConfig,
    /// Tracking client configuration.
    pub client: ClientConfig,
    /// Privacy configuration.
    pub privacy: PrivacyConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub bind: IpAddr,
    /// Port to listen on.
    pub port: u16,
    /// How long browsers may cache CORS preflight responses, in seconds.
    pub cors_max_age_secs: u64,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/trackpoint/events.db`
    pub database_path: Option<PathBuf>,
}

/// Aggregation-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Length of the trailing realtime window in seconds.
    pub realtime_window_secs: u64,
    /// Deadline for a single aggregate query in milliseconds.
    pub query_timeout_ms: u64,
    /// Page size for event listing when the caller gives none.
    pub default_page_size: u32,
    /// Upper bound on the page size a caller may request.
    pub max_page_size: u32,
}

/// Tracking client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Collect endpoint the dispatcher posts envelopes to.
    pub endpoint: String,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// File holding the durable visitor identity.
    /// Defaults to `~/.local/share/trackpoint/identity.json`
    pub identity_path: Option<PathBuf>,
    /// Scroll-depth percentages reported once per page.
    pub scroll_thresholds: Vec<u8>,
}

/// Privacy-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivacyConfig {
    /// Form field names excluded from submissions in addition to the
    /// built-in password and confirmation names.
    pub denylisted_fields: Vec<String>,
    /// Enable pattern-based redaction of form values.
    pub redact_enabled: bool,
    /// Additional redaction patterns (regex).
    pub extra_patterns: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::from([0, 0, 0, 0]),
            port: 3001,
            cors_max_age_secs: 3600,
        }
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            realtime_window_secs: 300,
            query_timeout_ms: 5_000,
            default_page_size: 100,
            max_page_size: 1_000,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3001/api/analytics/collect".to_string(),
            request_timeout_ms: 5_000,
            identity_path: None,
            scroll_thresholds: vec![25, 50, 75, 90, 100],
        }
    }
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            denylisted_fields: Vec::new(),
            redact_enabled: true,
            extra_patterns: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. TOML config file (if exists)
    /// 3. Environment variables (prefixed with `TRACKPOINT_`)
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(invalid("server.port must be greater than 0"));
        }

        let agg = &self.aggregation;
        if agg.realtime_window_secs == 0 {
            return Err(invalid("aggregation.realtime_window_secs must be greater than 0"));
        }
        if agg.query_timeout_ms == 0 {
            return Err(invalid("aggregation.query_timeout_ms must be greater than 0"));
        }
        if agg.default_page_size == 0 || agg.default_page_size > agg.max_page_size {
            return Err(invalid(format!(
                "aggregation.default_page_size ({}) must be between 1 and max_page_size ({})",
                agg.default_page_size, agg.max_page_size
            )));
        }

        if self.client.endpoint.trim().is_empty() {
            return Err(invalid("client.endpoint must not be empty"));
        }
        if self.client.request_timeout_ms == 0 {
            return Err(invalid("client.request_timeout_ms must be greater than 0"));
        }
        let thresholds = &self.client.scroll_thresholds;
        if thresholds.iter().any(|t| !(1..=100).contains(t)) {
            return Err(invalid("client.scroll_thresholds must lie within 1..=100"));
        }
        if thresholds.windows(2).any(|w| w[0] >= w[1]) {
            return Err(invalid(
                "client.scroll_thresholds must be strictly increasing",
            ));
        }

        for pattern in &self.privacy.extra_patterns {
            if regex::Regex::new(pattern).is_err() {
                return Err(invalid(format!("invalid regex pattern: {pattern}")));
            }
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the client identity file path, resolving defaults if not set.
    #[must_use]
    pub fn identity_path(&self) -> PathBuf {
        self.client
            .identity_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(IDENTITY_FILE_NAME))
    }

    /// Get the socket address the server listens on.
    #[must_use]
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.bind, self.server.port)
    }

    /// Get the client request timeout as a Duration.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.client.request_timeout_ms)
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::ConfigValidation {
        message: message.into(),
    }
}
