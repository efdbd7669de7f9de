//! # OCPP Networking Node
//!
//! Reads inbound OCPP requests as newline-delimited JSON envelopes from stdin
//! and writes one forwarding decision per line to stdout. Logs go to stderr.
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging (`RUST_LOG`, default `info`)
//! 2. Load configuration (defaults, `NN_CONFIG` file, environment overrides)
//! 3. Build the signature policy and one pipeline per configured action
//! 4. Serve stdin until EOF or Ctrl+C

use std::sync::Arc;

use anyhow::{Context, Result};
use nn_02_forwarding::CancellationToken;
use tokio::io::BufReader;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use node_runtime::{NodeConfig, NodeContainer, NodeRuntime};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("===========================================");
    info!("  OCPP Networking Node v{}", env!("CARGO_PKG_VERSION"));
    info!("===========================================");

    let config = NodeConfig::load().context("Failed to load node configuration")?;
    let container = NodeContainer::new(config).context("Invalid node configuration")?;
    let runtime = Arc::new(NodeRuntime::new(container));

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl+C received, shutting down");
                signal.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    let summary = runtime
        .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), shutdown)
        .await
        .context("Request loop failed")?;

    info!(
        forwarded = summary.forwarded,
        rejected = summary.rejected,
        dropped = summary.dropped,
        "Shutdown complete"
    );
    Ok(())
}
