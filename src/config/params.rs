// Per-run simulation parameters
use serde::{Deserialize, Serialize};

/// Immutable configuration of one simulation run.
///
/// The master keeps the params of the run it is serving and a reconnecting
/// controller may only resume when its own params are exactly equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SimulationParams {
    /// Total generations to evolve
    pub turns: u64,
    /// Worker node budget
    pub threads: usize,
    pub image_width: usize,
    pub image_height: usize,
    /// Address of the master, `host:port`
    pub server_address: String,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            turns: 10_000_000_000,
            threads: 8,
            image_width: 512,
            image_height: 512,
            server_address: "localhost:8030".to_string(),
        }
    }
}

impl SimulationParams {
    pub fn new(turns: u64, threads: usize, image_width: usize, image_height: usize) -> Self {
        Self {
            turns,
            threads,
            image_width,
            image_height,
            ..Self::default()
        }
    }

    pub fn with_server_address(mut self, address: impl Into<String>) -> Self {
        self.server_address = address.into();
        self
    }

    /// `None` when the dimensions do not fit in memory at all.
    pub fn cell_count(&self) -> Option<usize> {
        self.image_width.checked_mul(self.image_height)
    }

    /// Image name of the initial world, `"{height}x{width}"`
    pub fn input_image_name(&self) -> String {
        format!("{}x{}", self.image_height, self.image_width)
    }

    /// Image name of a snapshot, `"{height}x{width}x{turn}"`
    pub fn output_image_name(&self, turn: u64) -> String {
        format!("{}x{}x{}", self.image_height, self.image_width, turn)
    }

    /// Whether `turn` is the last generation of the run.
    pub fn is_final_turn(&self, turn: u64) -> bool {
        self.turns > 0 && turn == self.turns - 1
    }
}
