// Worker node: serves band computations for the master
use clap::Parser;
use grid_life::config::{NodeConfig, WorkerConfig};
use grid_life::{logging, rpc, WorkerEngine};
use log::info;
use std::error::Error;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "life_worker", about = "Game of Life worker node")]
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
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    logging::init(false);
    let args = Args::parse();

    let mut config = WorkerConfig::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.listen_address = listen;
    } else if let Some(port) = args.port {
        config.listen_address = format!("0.0.0.0:{}", port);
    }

    let shutdown = CancellationToken::new();
    let on_interrupt = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("🛑 Received Ctrl+C, shutting down worker...");
        on_interrupt.cancel();
    })?;

    info!("🔧 Starting worker");
    let listener = rpc::bind(&config.listen_address).await?;
    rpc::serve(listener, Arc::new(WorkerEngine::new()), config.max_frame_bytes, shutdown).await?;
    info!("👋 Worker stopped");
    Ok(())
}
