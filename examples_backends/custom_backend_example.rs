use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use index_log_shipper::{
    backend::{BackendConnector, BackendError, BulkDocument, ClientOptions, IndexBackend},
    connection::{ConnectionConfig, ConnectionTarget, StaticResolver},
    schema::IndexSchema,
    LogRecord, Severity, Shipper, ShipperConfig, ShipperError,
};

/// Example of plugging in a completely custom storage client by
/// implementing `IndexBackend` directly. Imagine this talks to some
/// proprietary search service for which this crate has no built-in client.
struct PrintingBackend;

#[async_trait]
impl IndexBackend for PrintingBackend {
    async fn index_exists(&self, index: &str) -> Result<bool, BackendError> {
        println!("[custom] exists? {}", index);
        Ok(false)
    }

    async fn create_index(&self, index: &str, schema: &IndexSchema) -> Result<(), BackendError> {
        println!("[custom] create {} -> {}", index, schema.to_body());
        Ok(())
    }

    async fn bulk_write(
        &self,
        index: &str,
        _doc_type: &str,
        documents: &[BulkDocument],
    ) -> Result<(), BackendError> {
        for doc in documents {
            println!("[custom] {} {} {}", index, doc.id, doc.source);
        }
        Ok(())
    }
}

struct PrintingConnector;

#[async_trait]
impl BackendConnector for PrintingConnector {
    async fn connect(
        &self,
        target: &ConnectionTarget,
        _options: &ClientOptions,
    ) -> Result<Arc<dyn IndexBackend>, ShipperError> {
        println!("[custom] connecting to {}", target.base_url());
        Ok(Arc::new(PrintingBackend))
    }
}

#[tokio::main]
async fn main() -> Result<(), ShipperError> {
    let connection = ConnectionConfig {
        uri: Some("custom://in-process".to_string()),
        ..Default::default()
    };
    let config = ShipperConfig {
        connection: connection.clone(),
        ..Default::default()
    }
    .with_daily("yyyy.MM.dd")
    .with_interval(Duration::from_millis(200));

    let shipper = Shipper::new(
        config,
        Arc::new(StaticResolver::new(connection)),
        Arc::new(PrintingConnector),
    )?;
    shipper.open().await?;

    shipper.log(LogRecord::new(Severity::Info, "custom", "custom backend example started"));
    shipper.log(LogRecord::new(Severity::Error, "custom", "simulated error sent via custom backend"));

    tokio::time::sleep(Duration::from_millis(300)).await;
    shipper.close().await
}
