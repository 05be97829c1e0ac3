//! Environment variable names used by [`ShipperConfig::from_env`].
//!
//! These are purely helpers; the shipper itself never reads the
//! environment.
//!
//! [`ShipperConfig::from_env`]: crate::config::ShipperConfig::from_env

use std::str::FromStr;

use crate::error::ShipperError;

/// Backend DSN, e.g. `opensearch://127.0.0.1:9200/log`.
pub const LOG_SHIPPER_DSN_ENV: &str = "LOG_SHIPPER_DSN";

/// Base index name; overrides an index given in the DSN.
pub const LOG_SHIPPER_INDEX_ENV: &str = "LOG_SHIPPER_INDEX";

/// `true` to rotate the index by date.
pub const LOG_SHIPPER_DAILY_ENV: &str = "LOG_SHIPPER_DAILY";

/// Rotation date pattern, e.g. `yyyyMMdd`.
pub const LOG_SHIPPER_DATE_FORMAT_ENV: &str = "LOG_SHIPPER_DATE_FORMAT";

/// Least severe level kept by the cache.
pub const LOG_SHIPPER_LEVEL_ENV: &str = "LOG_SHIPPER_LEVEL";

/// Logical source name stamped on records.
pub const LOG_SHIPPER_SOURCE_ENV: &str = "LOG_SHIPPER_SOURCE";

/// Flush period in milliseconds.
pub const LOG_SHIPPER_INTERVAL_MS_ENV: &str = "LOG_SHIPPER_INTERVAL_MS";

pub const LOG_SHIPPER_MAX_CACHE_SIZE_ENV: &str = "LOG_SHIPPER_MAX_CACHE_SIZE";

/// Request timeout in milliseconds.
pub const LOG_SHIPPER_TIMEOUT_MS_ENV: &str = "LOG_SHIPPER_TIMEOUT_MS";

/// Dead-node window in milliseconds.
pub const LOG_SHIPPER_RECONNECT_MS_ENV: &str = "LOG_SHIPPER_RECONNECT_MS";

pub const LOG_SHIPPER_MAX_RETRIES_ENV: &str = "LOG_SHIPPER_MAX_RETRIES";

pub const LOG_SHIPPER_INDEX_MESSAGE_ENV: &str = "LOG_SHIPPER_INDEX_MESSAGE";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read a non-empty environment variable.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse an environment variable, using `default` when it is unset.
pub fn env_parse<T>(key: &str, default: T) -> Result<T, ShipperError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_opt(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ShipperError::Configuration(format!("{}={}: {}", key, raw, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_falls_back_and_reports_errors() {
        std::env::remove_var("LOG_SHIPPER_TEST_UNSET");
        assert_eq!(env_parse("LOG_SHIPPER_TEST_UNSET", 7u32).unwrap(), 7);

        std::env::set_var("LOG_SHIPPER_TEST_NUMBER", " 42 ");
        assert_eq!(env_parse("LOG_SHIPPER_TEST_NUMBER", 0u64).unwrap(), 42);

        std::env::set_var("LOG_SHIPPER_TEST_BOOL", "maybe");
        assert!(env_parse("LOG_SHIPPER_TEST_BOOL", false).is_err());
    }
}
