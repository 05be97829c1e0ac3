use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ShipperError;

/// Resolved endpoint of the storage backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionTarget {
    Endpoint {
        scheme: String,
        host: String,
        port: u16,
    },
    Uri(String),
}

impl ConnectionTarget {
    /// Base URL without a trailing slash, e.g. `http://localhost:9200`.
    pub fn base_url(&self) -> String {
        match self {
            ConnectionTarget::Endpoint { scheme, host, port } => {
                format!("{}://{}:{}", scheme, host, port)
            }
            ConnectionTarget::Uri(uri) => uri.trim_end_matches('/').to_string(),
        }
    }
}

/// Connection settings as they appear in configuration.
///
/// `uri` wins over `host`/`port` when both are set. `key` names the
/// entry a discovery-backed resolver should look up; the static resolver
/// only reports it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub key: Option<String>,
    pub protocol: String,
    pub host: Option<String>,
    pub port: u16,
    pub uri: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            key: None,
            protocol: "http".to_string(),
            host: None,
            port: 9200,
            uri: None,
        }
    }
}

/// Turns configuration into a [`ConnectionTarget`].
///
/// Implementations may consult service discovery; `trace_id` is only used
/// to correlate diagnostics.
#[async_trait]
pub trait ConnectionResolver: Send + Sync {
    async fn resolve(&self, trace_id: &str) -> Result<ConnectionTarget, ShipperError>;
}

/// Resolver that reads the target straight from [`ConnectionConfig`].
#[derive(Debug, Clone)]
pub struct StaticResolver {
    config: ConnectionConfig,
}

impl StaticResolver {
    pub fn new(config: ConnectionConfig) -> Self {
        StaticResolver { config }
    }
}

#[async_trait]
impl ConnectionResolver for StaticResolver {
    async fn resolve(&self, trace_id: &str) -> Result<ConnectionTarget, ShipperError> {
        let target = if let Some(uri) = self.config.uri.as_deref().filter(|u| !u.is_empty()) {
            ConnectionTarget::Uri(uri.to_string())
        } else if let Some(host) = self.config.host.as_deref().filter(|h| !h.is_empty()) {
            ConnectionTarget::Endpoint {
                scheme: self.config.protocol.clone(),
                host: host.to_string(),
                port: self.config.port,
            }
        } else {
            tracing::warn!(
                trace_id = %trace_id,
                key = ?self.config.key,
                "no connection target configured"
            );
            return Err(ShipperError::no_connection());
        };

        tracing::debug!(trace_id = %trace_id, url = %target.base_url(), "resolved connection target");
        Ok(target)
    }
}

/// Result of parsing a DSN: where to connect and, optionally, which index
/// to write to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDsn {
    pub connection: ConnectionConfig,
    pub index: Option<String>,
}

/// Error type returned when parsing a DSN.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum DsnError {
    #[error("unknown or unsupported DSN scheme")]
    UnknownScheme,

    #[error("DSN has no host")]
    MissingHost,

    #[error("invalid port in DSN: {0}")]
    InvalidPort(String),
}

/// Parse a DSN string into connection settings.
///
/// Examples:
/// - "opensearch://127.0.0.1:9200/logs"
/// - "elasticsearch://search.internal/app-logs"
/// - "https://search.internal:9243"
pub fn parse_dsn(dsn: &str) -> Result<ParsedDsn, DsnError> {
    let lower = dsn.to_ascii_lowercase();

    let (protocol, rest) = if let Some(rest) = strip_scheme(&lower, dsn, "opensearch://") {
        ("http", rest)
    } else if let Some(rest) = strip_scheme(&lower, dsn, "elasticsearch://") {
        ("http", rest)
    } else if let Some(rest) = strip_scheme(&lower, dsn, "https://") {
        ("https", rest)
    } else if let Some(rest) = strip_scheme(&lower, dsn, "http://") {
        ("http", rest)
    } else {
        return Err(DsnError::UnknownScheme);
    };

    let mut parts = rest.splitn(2, '/');
    let authority = parts.next().unwrap_or("");
    let index = parts
        .next()
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty())
        .map(|p| p.to_string());

    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| DsnError::InvalidPort(port.to_string()))?;
            (host, port)
        }
        None => (authority, ConnectionConfig::default().port),
    };

    if host.is_empty() {
        return Err(DsnError::MissingHost);
    }

    Ok(ParsedDsn {
        connection: ConnectionConfig {
            protocol: protocol.to_string(),
            host: Some(host.to_string()),
            port,
            ..Default::default()
        },
        index,
    })
}

fn strip_scheme<'a>(lower: &str, dsn: &'a str, scheme: &str) -> Option<&'a str> {
    if lower.starts_with(scheme) {
        Some(&dsn[scheme.len()..])
    } else {
        None
    }
}
