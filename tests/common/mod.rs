//! Shared helpers: in-memory images and servers on loopback ports
#![allow(dead_code)]

use async_trait::async_trait;
use grid_life::config::{MasterConfig, DEFAULT_MAX_FRAME_BYTES};
use grid_life::{rpc, Event, Grid, ImageIo, ImageIoError, MasterEngine, WorkerEngine};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Images kept in memory, keyed by name.
#[derive(Default)]
pub struct MemoryImageIo {
    images: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryImageIo {
    pub fn with_image(name: &str, grid: &Grid) -> Self {
        let io = Self::default();
        io.images.lock().unwrap().insert(name.to_string(), grid.to_bytes());
        io
    }

    pub fn image(&self, name: &str) -> Option<Vec<u8>> {
        self.images.lock().unwrap().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.images.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl ImageIo for MemoryImageIo {
    async fn load(&self, name: &str, width: usize, height: usize) -> Result<Vec<u8>, ImageIoError> {
        let pixels = self.image(name).ok_or_else(|| ImageIoError::Format {
            name: name.to_string(),
            reason: "no such image".to_string(),
        })?;
        if pixels.len() != width * height {
            return Err(ImageIoError::Format {
                name: name.to_string(),
                reason: "wrong size".to_string(),
            });
        }
        Ok(pixels)
    }

    async fn save(
        &self,
        name: &str,
        _width: usize,
        _height: usize,
        pixels: Vec<u8>,
    ) -> Result<(), ImageIoError> {
        self.images.lock().unwrap().insert(name.to_string(), pixels);
        Ok(())
    }

    async fn wait_idle(&self) -> Result<(), ImageIoError> {
        Ok(())
    }
}

/// Seeded random grid with roughly a third of the cells alive.
pub fn random_grid(width: usize, height: usize, seed: u64) -> Grid {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut grid = Grid::new(width, height);
    for y in 0..height {
        for x in 0..width {
            grid.set(x, y, rng.gen_bool(0.33));
        }
    }
    grid
}

pub async fn spawn_worker(shutdown: &CancellationToken) -> String {
    let listener = rpc::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    tokio::spawn(rpc::serve(
        listener,
        Arc::new(WorkerEngine::new()),
        DEFAULT_MAX_FRAME_BYTES,
        shutdown.clone(),
    ));
    address
}

/// Master backed by `workers` freshly spawned workers. Returns its address.
pub async fn spawn_cluster(workers: usize, shutdown: &CancellationToken) -> String {
    let mut worker_addresses = Vec::new();
    for _ in 0..workers {
        worker_addresses.push(spawn_worker(shutdown).await);
    }
    spawn_master(worker_addresses, shutdown).await
}

pub async fn spawn_master(worker_addresses: Vec<String>, shutdown: &CancellationToken) -> String {
    let config = MasterConfig {
        listen_address: "127.0.0.1:0".to_string(),
        worker_addresses,
        max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
    };
    let listener = rpc::bind(&config.listen_address).await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    tokio::spawn(rpc::serve(
        listener,
        Arc::new(MasterEngine::from_config(&config)),
        config.max_frame_bytes,
        shutdown.clone(),
    ));
    address
}

/// Drain every event until the sender side closes.
pub async fn collect_events(mut events: mpsc::Receiver<Event>) -> Vec<Event> {
    let mut all = Vec::new();
    while let Some(event) = events.recv().await {
        all.push(event);
    }
    all
}
