// Simulation parameters and per-role node configuration
pub mod node_config;
pub mod params;

pub use node_config::{
    ControllerConfig, MasterConfig, NodeConfig, WorkerConfig, DEFAULT_MAX_FRAME_BYTES,
};
pub use params::SimulationParams;
