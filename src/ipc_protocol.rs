//! Request/response types exchanged between controller, master and workers

use crate::config::SimulationParams;
use crate::grid::{Grid, Row};
use serde::{Deserialize, Serialize};

/// Bumped whenever a wire type changes shape.
pub const PROTOCOL_VERSION: u32 = 1;

/// Versioned wrapper around every payload on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub protocol_version: u32,
    pub payload: T,
}

impl<T> Envelope<T> {
    pub fn new(payload: T) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            payload,
        }
    }
}

/// Work for one band of the next generation.
///
/// `grid` is the whole current grid so the worker can resolve neighbours
/// outside `[start_row, end_row)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkAssignment {
    pub params: SimulationParams,
    pub grid: Grid,
    pub start_row: usize,
    pub end_row: usize,
}

/// Rows of the next generation produced by a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub start_row: usize,
    pub rows: Vec<Row>,
}

impl Band {
    pub fn end_row(&self) -> usize {
        self.start_row + self.rows.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MasterRequest {
    /// Evolve one generation. `grid: None` evolves the world the master retains.
    RunMaster {
        grid: Option<Grid>,
        params: SimulationParams,
        turn: u64,
    },
    GetWorldState,
    GetTurnNumber,
    CheckParamsCompatible(SimulationParams),
    ResetState,
    GetAvailableNodeCount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MasterResponse {
    World(Grid),
    WorldState(Option<Grid>),
    TurnNumber(u64),
    Compatible(bool),
    Ack,
    NodeCount(usize),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorkerRequest {
    ComputeBand(WorkAssignment),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorkerResponse {
    Band(Band),
    Error(String),
}

/// Responses that can carry a remote failure message.
pub trait ErrorResponse {
    fn error(message: String) -> Self;
}

impl ErrorResponse for MasterResponse {
    fn error(message: String) -> Self {
        MasterResponse::Error(message)
    }
}

impl ErrorResponse for WorkerResponse {
    fn error(message: String) -> Self {
        WorkerResponse::Error(message)
    }
}
