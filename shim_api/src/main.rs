// vk-web-shim binary
//
// Entry point for the node-agent shim.

use anyhow::Result;
use clap::Parser;

use shim_api::{telemetry, ApiServer, ShimConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ShimConfig::parse();
    telemetry::init_tracing(config.log_format)?;

    tracing::info!(backend = ?config.backend, "Starting vk-web-shim");

    ApiServer::new(config).run().await
}
