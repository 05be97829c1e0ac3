use std::time::Duration;

use tracing::{error, info, warn};
use index_log_shipper::{
    config::ShipperConfig,
    init::init_tracing,
    Shipper, Severity,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Example DSN: opensearch://localhost:9200/log
    let dsn = std::env::var("LOG_SHIPPER_DSN")
        .unwrap_or_else(|_| "opensearch://localhost:9200/log".to_string());

    let config = ShipperConfig::default()
        .with_dsn(&dsn)?
        .with_daily("yyyyMMdd")
        .with_level(Severity::Info)
        .with_source("opensearch-example")
        .with_interval(Duration::from_secs(1));

    let shipper = Shipper::opensearch(config)?;
    init_tracing(shipper.cache().clone(), "opensearch-example")?;
    shipper.open().await?;

    info!("opensearch backend example started");
    warn!(correlation_id = "req-1001", "slow upstream response");
    error!(
        correlation_id = "req-1002",
        error.code = "E_UPSTREAM",
        error.status = 502,
        "simulated error sent via OpenSearch backend"
    );

    // Let the timer pick the records up, then flush the rest on close.
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    shipper.close().await?;
    Ok(())
}
