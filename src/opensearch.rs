use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::backend::{
    BackendConnector, BackendError, BulkDocument, ClientOptions, IndexBackend, DOC_TYPE,
};
use crate::connection::ConnectionTarget;
use crate::error::ShipperError;
use crate::schema::IndexSchema;

const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(10);

/// OpenSearch / Elasticsearch session over the HTTP REST API.
///
/// Transient failures (connect errors, timeouts, 429, 5xx) are retried up
/// to `max_retries` times with exponential backoff. A node that stays
/// unreachable is marked dead for `reconnect`; requests in that window fail
/// immediately.
pub struct OpenSearchBackend {
    client: Client,
    /// Base URL of the cluster, e.g. "http://localhost:9200".
    base_url: String,
    options: ClientOptions,
    dead_until: Mutex<Option<Instant>>,
}

impl OpenSearchBackend {
    pub fn new(base_url: impl Into<String>, options: ClientOptions) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        Ok(OpenSearchBackend {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            options,
            dead_until: Mutex::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn index_url(&self, index: &str) -> String {
        format!("{}/{}", self.base_url, urlencoding::encode(index))
    }

    fn check_alive(&self) -> Result<(), BackendError> {
        let mut dead_until = self.dead_until.lock();
        match *dead_until {
            Some(until) if until > Instant::now() => Err(BackendError::NodeDead(
                until.saturating_duration_since(Instant::now()),
            )),
            Some(_) => {
                *dead_until = None;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn mark_dead(&self) {
        *self.dead_until.lock() = Some(Instant::now() + self.options.reconnect);
        tracing::warn!(
            url = %self.base_url,
            reconnect_ms = self.options.reconnect.as_millis() as u64,
            "search node unreachable, marking dead"
        );
    }

    /// Send the request built by `build`, retrying transient failures.
    async fn send<F>(&self, what: &str, build: F) -> Result<Response, BackendError>
    where
        F: Fn() -> RequestBuilder,
    {
        self.check_alive()?;

        let mut delay = RETRY_BASE_DELAY;
        let max_retries = self.options.max_retries;
        let mut attempt = 0;

        loop {
            let retries_left = attempt < max_retries;
            match build().send().await {
                Ok(resp) if is_transient(resp.status()) && retries_left => {
                    tracing::debug!(request = what, status = %resp.status(), "transient status");
                }
                Ok(resp) => return Ok(resp),
                Err(e) if (e.is_connect() || e.is_timeout()) && retries_left => {
                    tracing::debug!(request = what, error = %e, "transient transport error");
                }
                Err(e) => {
                    if e.is_connect() || e.is_timeout() {
                        self.mark_dead();
                    }
                    return Err(BackendError::Transport(e.to_string()));
                }
            }

            attempt += 1;
            tracing::warn!(
                request = what,
                attempt = attempt,
                max_retries = max_retries,
                delay_ms = delay.as_millis() as u64,
                "retrying search request"
            );
            tokio::time::sleep(delay).await;
            delay = std::cmp::min(delay * 2, RETRY_MAX_DELAY);
        }
    }
}

fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

async fn status_error(resp: Response) -> BackendError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
    BackendError::Status { status, body }
}

#[derive(Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<BTreeMap<String, BulkItem>>,
}

#[derive(Deserialize)]
struct BulkItem {
    #[serde(default)]
    status: u16,
    error: Option<Value>,
}

impl BulkItem {
    fn failed(&self) -> bool {
        self.error.is_some() || self.status >= 300
    }

    fn reason(&self) -> String {
        match &self.error {
            Some(Value::Object(err)) => format!(
                "{}: {}",
                err.get("type").and_then(Value::as_str).unwrap_or("error"),
                err.get("reason").and_then(Value::as_str).unwrap_or("")
            ),
            Some(other) => other.to_string(),
            None => format!("status {}", self.status),
        }
    }
}

/// Render `documents` as an NDJSON `_bulk` body.
fn bulk_body(doc_type: &str, documents: &[BulkDocument]) -> Result<String, BackendError> {
    let mut body = String::new();
    for doc in documents {
        let mut meta = json!({ "_index": doc.index, "_id": doc.id });
        if doc_type != DOC_TYPE {
            meta["_type"] = Value::from(doc_type);
        }
        let action = json!({ "index": meta });
        body.push_str(&serde_json::to_string(&action).map_err(|e| BackendError::Encode(e.to_string()))?);
        body.push('\n');
        body.push_str(&serde_json::to_string(&doc.source).map_err(|e| BackendError::Encode(e.to_string()))?);
        body.push('\n');
    }
    Ok(body)
}

#[async_trait]
impl IndexBackend for OpenSearchBackend {
    async fn index_exists(&self, index: &str) -> Result<bool, BackendError> {
        let url = self.index_url(index);
        let resp = self.send("index_exists", || self.client.head(&url)).await?;
        match resp.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(status_error(resp).await),
        }
    }

    async fn create_index(&self, index: &str, schema: &IndexSchema) -> Result<(), BackendError> {
        let url = self.index_url(index);
        let body = schema.to_body();
        let resp = self
            .send("create_index", || self.client.put(&url).json(&body))
            .await?;

        if resp.status().is_success() {
            return Ok(());
        }
        match status_error(resp).await {
            BackendError::Status { status: 400, body } if body.contains("resource_already_exists_exception") => {
                tracing::debug!(index = %index, "index created concurrently");
                Ok(())
            }
            err => Err(err),
        }
    }

    async fn bulk_write(
        &self,
        index: &str,
        doc_type: &str,
        documents: &[BulkDocument],
    ) -> Result<(), BackendError> {
        if documents.is_empty() {
            return Ok(());
        }

        let body = bulk_body(doc_type, documents)?;
        let url = format!("{}/_bulk", self.base_url);
        let resp = self
            .send("bulk", || {
                self.client
                    .post(&url)
                    .header("Content-Type", "application/x-ndjson")
                    .body(body.clone())
            })
            .await?;

        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }

        let parsed: BulkResponse = resp
            .json()
            .await
            .map_err(|e| BackendError::Transport(format!("invalid bulk response: {}", e)))?;
        if !parsed.errors {
            return Ok(());
        }

        let failures: Vec<&BulkItem> = parsed
            .items
            .iter()
            .flat_map(|item| item.values())
            .filter(|item| item.failed())
            .collect();
        let reason = failures
            .first()
            .map(|item| item.reason())
            .unwrap_or_else(|| "bulk response flagged errors".to_string());

        tracing::warn!(
            index = %index,
            failed = failures.len(),
            total = documents.len(),
            reason = %reason,
            "bulk write rejected documents"
        );
        Err(BackendError::ItemsFailed {
            failed: failures.len().max(1),
            total: documents.len(),
            reason,
        })
    }
}

/// Opens an [`OpenSearchBackend`] for each resolved target.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenSearchConnector;

#[async_trait]
impl BackendConnector for OpenSearchConnector {
    async fn connect(
        &self,
        target: &ConnectionTarget,
        options: &ClientOptions,
    ) -> Result<Arc<dyn IndexBackend>, ShipperError> {
        let backend = OpenSearchBackend::new(target.base_url(), *options)
            .map_err(|e| ShipperError::Configuration(e.to_string()))?;
        Ok(Arc::new(backend))
    }
}
