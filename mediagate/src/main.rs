mod server;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use mediagate_api::AppState;
use mediagate_core::{bootstrap::load_config, logging, provider::YtDlpExtractor};

use server::MediaGateServer;

/// Media gateway: metadata, streaming downloads and progress channels
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to a YAML config file
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load and validate configuration
    let config = load_config(args.config.as_deref())?;

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("mediagate starting...");
    info!("HTTP address: {}", config.http_address());

    // 3. Extraction engine
    let extractor = YtDlpExtractor::new(&config.extractor);
    info!(
        binary = %config.extractor.binary,
        default_format = %config.extractor.default_format,
        "Extraction engine configured"
    );

    // 4. Services and channel registry
    let state = AppState::new(Arc::new(extractor), &config);

    // 5. Serve until shutdown
    MediaGateServer::new(config, state).start().await
}
