use super::params::SimulationParams;
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Largest frame accepted on the wire unless configured otherwise (256 MiB)
pub const DEFAULT_MAX_FRAME_BYTES: u32 = 256 * 1024 * 1024;

/// Master node configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterConfig {
    /// Address the master listens on for controllers
    pub listen_address: String,
    /// Worker pool, one `host:port` per node
    pub worker_addresses: Vec<String>,
    /// Maximum accepted frame size in bytes
    pub max_frame_bytes: u32,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:8030".to_string(),
            worker_addresses: Vec::new(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

/// Worker node configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub listen_address: String,
    pub max_frame_bytes: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:8031".to_string(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

/// Controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub params: SimulationParams,
    /// Directory holding `<height>x<width>.pgm` input images
    pub images_dir: PathBuf,
    /// Directory receiving `<height>x<width>x<turn>.pgm` snapshots
    pub output_dir: PathBuf,
    /// Try to pick up a run already in progress on the master
    pub resume: bool,
    /// Alive cell report interval (ms)
    pub report_interval_ms: u64,
    pub max_frame_bytes: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            params: SimulationParams::default(),
            images_dir: PathBuf::from("images"),
            output_dir: PathBuf::from("out"),
            resume: false,
            report_interval_ms: 1000,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

impl ControllerConfig {
    /// Never zero; a zero setting reports every millisecond.
    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms.max(1))
    }
}

/// Read `key` and parse it, warning and returning `None` when it does not parse.
fn env_value<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("⚠️ Ignoring {}={:?}: not a valid value", key, raw);
            None
        }
    }
}

fn env_list(key: &str) -> Option<Vec<String>> {
    let raw = std::env::var(key).ok()?;
    Some(
        raw.split(',')
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .map(String::from)
            .collect(),
    )
}

/// Shared loading behaviour: JSON file, then `GOL_*` environment overrides.
pub trait NodeConfig: Sized + Default + Serialize + for<'de> Deserialize<'de> {
    /// Apply `GOL_*` environment variables on top of the current values
    fn apply_env(&mut self);

    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), Box<dyn std::error::Error>> {
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Load configuration from environment variables with fallback to defaults
    fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Optional file first, environment second
    fn load(path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }
}

impl NodeConfig for MasterConfig {
    fn apply_env(&mut self) {
        if let Some(addr) = env_value::<String>("GOL_MASTER_LISTEN") {
            self.listen_address = addr;
        }
        if let Some(workers) = env_list("GOL_WORKERS") {
            self.worker_addresses = workers;
        }
        if let Some(max) = env_value("GOL_MAX_FRAME_BYTES") {
            self.max_frame_bytes = max;
        }
    }
}

impl NodeConfig for WorkerConfig {
    fn apply_env(&mut self) {
        if let Some(addr) = env_value::<String>("GOL_WORKER_LISTEN") {
            self.listen_address = addr;
        }
        if let Some(max) = env_value("GOL_MAX_FRAME_BYTES") {
            self.max_frame_bytes = max;
        }
    }
}

impl NodeConfig for ControllerConfig {
    fn apply_env(&mut self) {
        if let Some(turns) = env_value("GOL_TURNS") {
            self.params.turns = turns;
        }
        if let Some(threads) = env_value("GOL_THREADS") {
            self.params.threads = threads;
        }
        if let Some(width) = env_value("GOL_WIDTH") {
            self.params.image_width = width;
        }
        if let Some(height) = env_value("GOL_HEIGHT") {
            self.params.image_height = height;
        }
        if let Some(server) = env_value::<String>("GOL_SERVER") {
            self.params.server_address = server;
        }
        if let Some(resume) = env_value::<String>("GOL_RESUME") {
            self.resume = resume.to_lowercase() == "true";
        }
        if let Some(dir) = env_value::<String>("GOL_IMAGES_DIR") {
            self.images_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env_value::<String>("GOL_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(max) = env_value("GOL_MAX_FRAME_BYTES") {
            self.max_frame_bytes = max;
        }
    }
}
