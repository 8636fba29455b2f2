// Grid Life: distributed Game of Life over a controller, a master and a
// pool of workers

pub mod config;
pub mod controller;
pub mod errors;
pub mod grid;
pub mod image_io;
pub mod ipc_protocol;
pub mod logging;
pub mod master_engine;
pub mod rpc;
pub mod worker_engine;

// Re-export main types for convenience
pub use config::{ControllerConfig, MasterConfig, NodeConfig, SimulationParams, WorkerConfig};
pub use controller::{Controller, Event, RunOutcome, State};
pub use errors::{ControllerError, GridError, GridResult, ImageIoError, MasterError, RpcError, WorkerError};
pub use grid::{Cell, Grid};
pub use image_io::{ImageIo, PgmImageIo};
pub use master_engine::{MasterClient, MasterEngine, MasterService, TurnState};
pub use worker_engine::{WorkerClient, WorkerEngine, WorkerService};
