// Master node: holds the world between turns and fans work out to workers
use clap::Parser;
use grid_life::config::{MasterConfig, NodeConfig};
use grid_life::{logging, rpc, MasterEngine};
use log::{info, warn};
use std::error::Error;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "life_master", about = "Game of Life master node")]
struct Args {
    /// JSON configuration file
    #[arg(long)]
    config: Option<String>,
    /// Address to listen on, `host:port`
    #[arg(long)]
    listen: Option<String>,
    /// Port to listen on all interfaces; ignored when --listen is given
    #[arg(short, long)]
    port: Option<u16>,
    /// Worker addresses, comma separated
    #[arg(long, value_delimiter = ',')]
    workers: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    logging::init(false);
    let args = Args::parse();

    let mut config = MasterConfig::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.listen_address = listen;
    } else if let Some(port) = args.port {
        config.listen_address = format!("0.0.0.0:{}", port);
    }
    if !args.workers.is_empty() {
        config.worker_addresses = args.workers;
    }

    if config.worker_addresses.is_empty() {
        warn!("⚠️ No workers configured, every turn is computed on the master");
    } else {
        info!("📋 Worker pool: {}", config.worker_addresses.join(", "));
    }

    let shutdown = CancellationToken::new();
    let on_interrupt = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("🛑 Received Ctrl+C, shutting down master...");
        on_interrupt.cancel();
    })?;

    let engine = Arc::new(MasterEngine::from_config(&config));
    let listener = rpc::bind(&config.listen_address).await?;
    rpc::serve(listener, engine, config.max_frame_bytes, shutdown).await?;
    info!("👋 Master stopped");
    Ok(())
}
