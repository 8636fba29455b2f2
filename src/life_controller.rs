// Controller: drives a run on the master and reports progress
use clap::Parser;
use grid_life::config::{ControllerConfig, NodeConfig};
use grid_life::controller::{spawn_key_reader, RawModeGuard};
use grid_life::{logging, Controller, Event, MasterClient, PgmImageIo, RunOutcome};
use log::{error, info};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(name = "life_controller", about = "Game of Life controller")]
struct Args {
    /// JSON configuration file
    #[arg(long)]
    config: Option<String>,
    /// Worker node budget
    #[arg(short, long)]
    threads: Option<usize>,
    #[arg(short, long)]
    width: Option<usize>,
    #[arg(short = 'H', long)]
    height: Option<usize>,
    #[arg(long)]
    turns: Option<u64>,
    /// Master address, `host:port`
    #[arg(long)]
    ip: Option<String>,
    /// Pick up a compatible run already in progress on the master
    #[arg(long)]
    resume: bool,
    #[arg(long)]
    images_dir: Option<PathBuf>,
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Do not read key presses from the terminal
    #[arg(long)]
    no_keys: bool,
}

impl Args {
    fn apply(self, config: &mut ControllerConfig) {
        let params = &mut config.params;
        if let Some(threads) = self.threads {
            params.threads = threads;
        }
        if let Some(width) = self.width {
            params.image_width = width;
        }
        if let Some(height) = self.height {
            params.image_height = height;
        }
        if let Some(turns) = self.turns {
            params.turns = turns;
        }
        if let Some(ip) = self.ip {
            params.server_address = ip;
        }
        if self.resume {
            config.resume = true;
        }
        if let Some(dir) = self.images_dir {
            config.images_dir = dir;
        }
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let read_keys = !args.no_keys;
    logging::init(read_keys);

    let mut config = ControllerConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    let params = config.params.clone();
    info!(
        "🎮 {}x{} for {} turns on up to {} workers via {}",
        params.image_width, params.image_height, params.turns, params.threads, params.server_address
    );

    let master = match MasterClient::connect(&params.server_address, config.max_frame_bytes).await {
        Ok(master) => Arc::new(master),
        Err(e) => {
            error!("❌ Cannot reach master at {}: {}", params.server_address, e);
            return Err(e.into());
        }
    };
    let images = Arc::new(PgmImageIo::new(&config.images_dir, &config.output_dir));
    let controller = Controller::new(master, images, config);

    let shutdown = controller.shutdown_token();
    let on_interrupt = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("🛑 Received Ctrl+C, detaching...");
        on_interrupt.cancel();
    })?;

    let (key_tx, key_rx) = mpsc::channel(16);
    let (raw_mode, key_reader) = if read_keys {
        let guard = RawModeGuard::enable()?;
        info!("⌨️  s: save image, q: detach (run continues on the master)");
        (Some(guard), Some(spawn_key_reader(key_tx, shutdown.clone())))
    } else {
        drop(key_tx);
        (None, None)
    };

    let (event_tx, mut event_rx) = mpsc::channel(64);
    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                Event::AliveCellsCount { .. } => info!("📊 {}", event),
                _ => info!("📣 {}", event),
            }
        }
    });

    let result = controller.run(event_tx, key_rx).await;

    shutdown.cancel();
    if let Some(reader) = key_reader {
        let _ = tokio::task::spawn_blocking(move || reader.join()).await;
    }
    drop(raw_mode);
    let _ = printer.await;

    match result {
        Ok(RunOutcome::Completed) => info!("✅ Run complete"),
        Ok(RunOutcome::Detached) => info!("⏏️ Detached; resume later with --resume"),
        Err(e) => {
            error!("❌ Run failed: {}", e);
            return Err(e.into());
        }
    }
    Ok(())
}
