use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Severity of a [`LogRecord`], ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "trace",
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown severity level: {0}")]
pub struct ParseSeverityError(pub String);

impl FromStr for Severity {
    type Err = ParseSeverityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Severity::Trace),
            "debug" => Ok(Severity::Debug),
            "info" => Ok(Severity::Info),
            "warn" | "warning" => Ok(Severity::Warn),
            "error" => Ok(Severity::Error),
            "fatal" | "critical" => Ok(Severity::Fatal),
            _ => Err(ParseSeverityError(s.to_string())),
        }
    }
}

impl From<tracing::Level> for Severity {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Severity::Trace,
            tracing::Level::DEBUG => Severity::Debug,
            tracing::Level::INFO => Severity::Info,
            tracing::Level::WARN => Severity::Warn,
            _ => Severity::Error,
        }
    }
}

/// Structured error attached to a [`LogRecord`].
///
/// Mirrors the `error` object of the index schema; `cause` nests another
/// error of the same shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogError {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub category: Option<String>,
    pub status: Option<u16>,
    pub code: Option<String>,
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, serde_json::Value>,
    pub cause: Option<Box<LogError>>,
    pub stack_trace: Option<String>,
}

impl LogError {
    pub fn new(message: impl Into<String>) -> Self {
        LogError {
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_cause(mut self, cause: LogError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

/// One buffered log event. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: Severity,
    pub source: String,
    pub correlation_id: Option<String>,
    pub message: String,
    pub error: Option<LogError>,
}

impl LogRecord {
    pub fn new(level: Severity, source: impl Into<String>, message: impl Into<String>) -> Self {
        LogRecord {
            timestamp: Utc::now(),
            level,
            source: source.into(),
            correlation_id: None,
            message: message.into(),
            error: None,
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_error(mut self, error: LogError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_parses_case_insensitively() {
        assert_eq!("WARN".parse::<Severity>().unwrap(), Severity::Warn);
        assert_eq!("warning".parse::<Severity>().unwrap(), Severity::Warn);
        assert_eq!(" Error ".parse::<Severity>().unwrap(), Severity::Error);
        assert!("loud".parse::<Severity>().is_err());
    }

    #[test]
    fn severity_orders_by_seriousness() {
        assert!(Severity::Fatal > Severity::Error);
        assert!(Severity::Debug < Severity::Info);
        assert_eq!(Severity::from(tracing::Level::WARN), Severity::Warn);
    }
}
