//! Shipper configuration.
//!
//! Every field has a default so a config can be deserialized from a
//! partial document, built in code with the `with_*` helpers, or read
//! from the environment with [`ShipperConfig::from_env`].

use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;

use crate::backend::ClientOptions;
use crate::connection::{parse_dsn, ConnectionConfig};
use crate::env;
use crate::error::ShipperError;
use crate::index::{check_index_name, DatePattern, IndexDescriptor};
use crate::record::Severity;

/// Default flush period in milliseconds.
pub const DEFAULT_INTERVAL_MS: u64 = 10_000;

/// Default pending count that triggers a flush ahead of the timer.
pub const DEFAULT_MAX_CACHE_SIZE: usize = 1_000;

/// Default dead-node timeout in milliseconds.
pub const DEFAULT_RECONNECT_MS: u64 = 60_000;

/// Default request timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Default transport retry count.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

pub const DEFAULT_INDEX: &str = "log";

pub const DEFAULT_DATE_FORMAT: &str = "yyyyMMdd";

/// Tunables grouped under `options`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ShipperOptions {
    /// Flush period, ms.
    pub interval: u64,
    /// Pending records that force an early flush; also the cache cap.
    pub max_cache_size: usize,
    /// Dead-node timeout, ms.
    pub reconnect: u64,
    /// Request timeout, ms.
    pub timeout: u64,
    pub max_retries: u32,
    /// Make message text searchable.
    pub index_message: bool,
}

impl Default for ShipperOptions {
    fn default() -> Self {
        ShipperOptions {
            interval: DEFAULT_INTERVAL_MS,
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            reconnect: DEFAULT_RECONNECT_MS,
            timeout: DEFAULT_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            index_message: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ShipperConfig {
    /// Least severe level the cache keeps.
    pub level: Severity,
    /// Context name stamped on records produced by the tracing layer.
    pub source: String,
    pub connection: ConnectionConfig,
    /// Base index name.
    pub index: String,
    /// Rotation date pattern, used when `daily` is set.
    pub date_format: String,
    pub daily: bool,
    pub options: ShipperOptions,
}

impl Default for ShipperConfig {
    fn default() -> Self {
        ShipperConfig {
            level: Severity::Info,
            source: "app".to_string(),
            connection: ConnectionConfig::default(),
            index: DEFAULT_INDEX.to_string(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            daily: false,
            options: ShipperOptions::default(),
        }
    }
}

impl ShipperConfig {
    /// Point the config at `dsn`; an index path in the DSN replaces the
    /// base index name.
    pub fn with_dsn(mut self, dsn: &str) -> Result<Self, ShipperError> {
        let parsed = parse_dsn(dsn).map_err(|e| ShipperError::Configuration(e.to_string()))?;
        self.connection = parsed.connection;
        if let Some(index) = parsed.index {
            self.index = index;
        }
        Ok(self)
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = index.into();
        self
    }

    pub fn with_daily(mut self, date_format: impl Into<String>) -> Self {
        self.daily = true;
        self.date_format = date_format.into();
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.options.interval = interval.as_millis() as u64;
        self
    }

    pub fn with_level(mut self, level: Severity) -> Self {
        self.level = level;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.options.interval)
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            timeout: Duration::from_millis(self.options.timeout),
            max_retries: self.options.max_retries,
            reconnect: Duration::from_millis(self.options.reconnect),
        }
    }

    pub fn index_descriptor(&self) -> Result<IndexDescriptor, ShipperError> {
        if !self.daily {
            return Ok(IndexDescriptor::fixed(self.index.clone()));
        }
        let pattern = DatePattern::parse(&self.date_format)
            .map_err(|e| ShipperError::Configuration(e.to_string()))?;
        Ok(IndexDescriptor::daily(self.index.clone(), pattern))
    }

    /// Reject settings that would only fail later at runtime.
    ///
    /// The index name is checked as it resolves today, so literal text in
    /// the date pattern is held to the same naming rules as the base name.
    pub fn validate(&self) -> Result<(), ShipperError> {
        if self.index.trim().is_empty() {
            return Err(ShipperError::Configuration("index name is empty".into()));
        }
        if self.options.interval == 0 {
            return Err(ShipperError::Configuration("flush interval must be positive".into()));
        }
        let name = self.index_descriptor()?.resolve_at(Utc::now());
        check_index_name(&name).map_err(ShipperError::Configuration)
    }

    /// Build a config from `LOG_SHIPPER_*` environment variables, falling
    /// back to defaults for anything unset.
    pub fn from_env() -> Result<Self, ShipperError> {
        let mut config = ShipperConfig::default();

        if let Some(dsn) = env::env_opt(env::LOG_SHIPPER_DSN_ENV) {
            config = config.with_dsn(&dsn)?;
        }
        if let Some(index) = env::env_opt(env::LOG_SHIPPER_INDEX_ENV) {
            config.index = index;
        }
        if let Some(level) = env::env_opt(env::LOG_SHIPPER_LEVEL_ENV) {
            config.level = level
                .parse()
                .map_err(|e: crate::record::ParseSeverityError| ShipperError::Configuration(e.to_string()))?;
        }
        config.source = env::env_or(env::LOG_SHIPPER_SOURCE_ENV, &config.source);
        config.date_format = env::env_or(env::LOG_SHIPPER_DATE_FORMAT_ENV, &config.date_format);
        config.daily = env::env_parse(env::LOG_SHIPPER_DAILY_ENV, config.daily)?;
        config.options.interval = env::env_parse(env::LOG_SHIPPER_INTERVAL_MS_ENV, config.options.interval)?;
        config.options.max_cache_size =
            env::env_parse(env::LOG_SHIPPER_MAX_CACHE_SIZE_ENV, config.options.max_cache_size)?;
        config.options.timeout = env::env_parse(env::LOG_SHIPPER_TIMEOUT_MS_ENV, config.options.timeout)?;
        config.options.reconnect =
            env::env_parse(env::LOG_SHIPPER_RECONNECT_MS_ENV, config.options.reconnect)?;
        config.options.max_retries =
            env::env_parse(env::LOG_SHIPPER_MAX_RETRIES_ENV, config.options.max_retries)?;
        config.options.index_message =
            env::env_parse(env::LOG_SHIPPER_INDEX_MESSAGE_ENV, config.options.index_message)?;

        config.validate()?;
        Ok(config)
    }
}
