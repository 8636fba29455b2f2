//! Master role: owns the authoritative world between turns and fans each
//! generation out across the worker pool.
//!
//! One simulation is served at a time. All access to the retained
//! [`TurnState`] goes through the [`MasterService`] operations; concurrent
//! controllers share it and the last writer wins.

use crate::config::{MasterConfig, SimulationParams};
use crate::errors::{GridError, MasterError, RpcError};
use crate::grid::{next_grid, partition_rows, Grid};
use crate::ipc_protocol::{Band, MasterRequest, MasterResponse, WorkAssignment};
use crate::rpc::{RpcClient, RpcHandler};
use crate::worker_engine::{WorkerClient, WorkerService};
use async_trait::async_trait;
use futures::future::try_join_all;
use log::{debug, error, info};
use std::ops::Range;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Operations a controller can invoke on the master.
#[async_trait]
pub trait MasterService: Send + Sync {
    /// Evolve one generation. `grid: None` evolves the retained world.
    async fn run_master(
        &self,
        grid: Option<Grid>,
        params: SimulationParams,
        turn: u64,
    ) -> Result<Grid, MasterError>;

    async fn get_world_state(&self) -> Result<Option<Grid>, MasterError>;

    async fn get_turn_number(&self) -> Result<u64, MasterError>;

    /// Whether `params` exactly match the run in progress.
    async fn check_params_compatible(&self, params: &SimulationParams) -> Result<bool, MasterError>;

    async fn reset_state(&self) -> Result<(), MasterError>;

    async fn get_available_node_count(&self) -> Result<usize, MasterError>;
}

/// A run resident on the master.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveRun {
    pub params: SimulationParams,
    pub grid: Grid,
    /// Generations already applied to `grid`
    pub turn: u64,
}

/// Retained simulation state: `Empty -> Active -> ... -> Empty`.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TurnState {
    #[default]
    Empty,
    Active(ActiveRun),
}

impl TurnState {
    pub fn world(&self) -> Option<&Grid> {
        match self {
            TurnState::Empty => None,
            TurnState::Active(run) => Some(&run.grid),
        }
    }

    pub fn turn(&self) -> u64 {
        match self {
            TurnState::Empty => 0,
            TurnState::Active(run) => run.turn,
        }
    }

    pub fn params(&self) -> Option<&SimulationParams> {
        match self {
            TurnState::Empty => None,
            TurnState::Active(run) => Some(&run.params),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, TurnState::Active(_))
    }

    pub fn clear(&mut self) {
        *self = TurnState::Empty;
    }
}

pub struct MasterEngine {
    state: Mutex<TurnState>,
    workers: Vec<Arc<dyn WorkerService>>,
}

impl MasterEngine {
    pub fn new(workers: Vec<Arc<dyn WorkerService>>) -> Self {
        Self {
            state: Mutex::new(TurnState::Empty),
            workers,
        }
    }

    /// Remote workers for every configured address. Nothing is dialled yet.
    pub fn from_config(config: &MasterConfig) -> Self {
        let workers = config
            .worker_addresses
            .iter()
            .map(|address| {
                Arc::new(WorkerClient::new(address.clone(), config.max_frame_bytes))
                    as Arc<dyn WorkerService>
            })
            .collect();
        Self::new(workers)
    }

    /// Size of the configured worker pool
    pub fn pool_size(&self) -> usize {
        self.workers.len()
    }

    /// Workers used for a turn: the node budget capped by the pool, at least one.
    pub fn active_nodes(&self, params: &SimulationParams) -> usize {
        params.threads.min(self.workers.len()).max(1)
    }

    /// Snapshot of the retained state
    pub async fn turn_state(&self) -> TurnState {
        self.state.lock().await.clone()
    }

    async fn evolve(&self, grid: Grid, params: &SimulationParams) -> Result<Grid, MasterError> {
        let nodes = self.active_nodes(params);
        if nodes == 1 {
            debug!("🧮 Evolving {}x{} locally", grid.width(), grid.height());
            return tokio::task::spawn_blocking(move || next_grid(&grid))
                .await
                .map_err(|e| MasterError::Join(e.to_string()));
        }

        let bands = partition_rows(grid.height(), nodes);
        debug!("📤 Dispatching {} bands: {:?}", bands.len(), bands);
        let calls = bands.iter().enumerate().map(|(index, range)| {
            let worker = self.workers[index].clone();
            let assignment = WorkAssignment {
                params: params.clone(),
                grid: grid.clone(),
                start_row: range.start,
                end_row: range.end,
            };
            async move {
                worker
                    .compute_band(assignment)
                    .await
                    .map_err(|source| MasterError::Worker { index, source })
            }
        });
        // All or nothing: the first failure fails the turn
        let replies = try_join_all(calls).await?;

        let mut rows = Vec::with_capacity(grid.height());
        for (index, (band, range)) in replies.into_iter().zip(bands.iter()).enumerate() {
            check_band(index, &band, range)?;
            rows.extend(band.rows);
        }
        Ok(Grid::from_rows(grid.width(), grid.height(), rows)?)
    }
}

fn check_band(index: usize, band: &Band, expected: &Range<usize>) -> Result<(), MasterError> {
    if band.start_row != expected.start || band.end_row() != expected.end {
        return Err(MasterError::BandMismatch {
            index,
            start_row: expected.start,
            end_row: expected.end,
            actual: band.start_row,
            rows: band.rows.len(),
        });
    }
    Ok(())
}

#[async_trait]
impl MasterService for MasterEngine {
    async fn run_master(
        &self,
        grid: Option<Grid>,
        params: SimulationParams,
        turn: u64,
    ) -> Result<Grid, MasterError> {
        let grid = match grid {
            Some(grid) => grid,
            None => self
                .state
                .lock()
                .await
                .world()
                .cloned()
                .ok_or(MasterError::NoRetainedWorld)?,
        };
        let completed = turn.checked_add(1).ok_or(MasterError::TurnOverflow(turn))?;
        grid.check_shape()?;
        if !grid.has_dimensions(params.image_width, params.image_height) {
            return Err(GridError::Dimensions {
                expected_width: params.image_width,
                expected_height: params.image_height,
                detail: format!("{}x{} grid", grid.width(), grid.height()),
            }
            .into());
        }

        let next = self.evolve(grid, &params).await?;

        let mut state = self.state.lock().await;
        if params.is_final_turn(turn) {
            info!("🏁 Final turn {} complete, releasing retained world", completed);
            state.clear();
        } else {
            debug!("✅ Turn {} complete", completed);
            *state = TurnState::Active(ActiveRun {
                params,
                grid: next.clone(),
                turn: completed,
            });
        }
        Ok(next)
    }

    async fn get_world_state(&self) -> Result<Option<Grid>, MasterError> {
        Ok(self.state.lock().await.world().cloned())
    }

    async fn get_turn_number(&self) -> Result<u64, MasterError> {
        Ok(self.state.lock().await.turn())
    }

    async fn check_params_compatible(&self, params: &SimulationParams) -> Result<bool, MasterError> {
        Ok(self.state.lock().await.params() == Some(params))
    }

    async fn reset_state(&self) -> Result<(), MasterError> {
        info!("🔄 Retained state reset");
        self.state.lock().await.clear();
        Ok(())
    }

    async fn get_available_node_count(&self) -> Result<usize, MasterError> {
        Ok(self.workers.len())
    }
}

#[async_trait]
impl RpcHandler for MasterEngine {
    type Request = MasterRequest;
    type Response = MasterResponse;

    async fn handle(&self, request: MasterRequest) -> MasterResponse {
        let result = match request {
            MasterRequest::RunMaster { grid, params, turn } => self
                .run_master(grid, params, turn)
                .await
                .map(MasterResponse::World),
            MasterRequest::GetWorldState => {
                self.get_world_state().await.map(MasterResponse::WorldState)
            }
            MasterRequest::GetTurnNumber => {
                self.get_turn_number().await.map(MasterResponse::TurnNumber)
            }
            MasterRequest::CheckParamsCompatible(params) => self
                .check_params_compatible(&params)
                .await
                .map(MasterResponse::Compatible),
            MasterRequest::ResetState => self.reset_state().await.map(|_| MasterResponse::Ack),
            MasterRequest::GetAvailableNodeCount => self
                .get_available_node_count()
                .await
                .map(MasterResponse::NodeCount),
        };
        result.unwrap_or_else(|e| {
            error!("❌ Request failed: {}", e);
            MasterResponse::Error(e.to_string())
        })
    }
}

/// Controller-side handle to a remote master.
///
/// Dials on construction. Like [`WorkerClient`], the connection is held
/// back only after a complete reply; a failed or cancelled call drops it
/// and the next call dials again.
pub struct MasterClient {
    address: String,
    max_frame_bytes: u32,
    connection: Mutex<Option<RpcClient<MasterRequest, MasterResponse>>>,
}

impl MasterClient {
    pub async fn connect(address: &str, max_frame_bytes: u32) -> Result<Self, MasterError> {
        let client = RpcClient::connect(address, max_frame_bytes).await?;
        info!("✅ Connected to master at {}", address);
        Ok(Self {
            address: address.to_string(),
            max_frame_bytes,
            connection: Mutex::new(Some(client)),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn call(&self, request: MasterRequest) -> Result<MasterResponse, MasterError> {
        let mut connection = self.connection.lock().await;
        let mut client = match connection.take() {
            Some(client) => client,
            None => {
                debug!("🔌 Redialling master at {}", self.address);
                RpcClient::connect(&self.address, self.max_frame_bytes).await?
            }
        };
        let response = client.call(&request).await?;
        *connection = Some(client);
        match response {
            MasterResponse::Error(message) => Err(RpcError::Remote(message).into()),
            response => Ok(response),
        }
    }
}

fn unexpected(response: MasterResponse) -> MasterError {
    RpcError::UnexpectedResponse(format!("{:?}", response)).into()
}

#[async_trait]
impl MasterService for MasterClient {
    async fn run_master(
        &self,
        grid: Option<Grid>,
        params: SimulationParams,
        turn: u64,
    ) -> Result<Grid, MasterError> {
        match self.call(MasterRequest::RunMaster { grid, params, turn }).await? {
            MasterResponse::World(grid) => Ok(grid),
            other => Err(unexpected(other)),
        }
    }

    async fn get_world_state(&self) -> Result<Option<Grid>, MasterError> {
        match self.call(MasterRequest::GetWorldState).await? {
            MasterResponse::WorldState(grid) => Ok(grid),
            other => Err(unexpected(other)),
        }
    }

    async fn get_turn_number(&self) -> Result<u64, MasterError> {
        match self.call(MasterRequest::GetTurnNumber).await? {
            MasterResponse::TurnNumber(turn) => Ok(turn),
            other => Err(unexpected(other)),
        }
    }

    async fn check_params_compatible(&self, params: &SimulationParams) -> Result<bool, MasterError> {
        match self
            .call(MasterRequest::CheckParamsCompatible(params.clone()))
            .await?
        {
            MasterResponse::Compatible(compatible) => Ok(compatible),
            other => Err(unexpected(other)),
        }
    }

    async fn reset_state(&self) -> Result<(), MasterError> {
        match self.call(MasterRequest::ResetState).await? {
            MasterResponse::Ack => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn get_available_node_count(&self) -> Result<usize, MasterError> {
        match self.call(MasterRequest::GetAvailableNodeCount).await? {
            MasterResponse::NodeCount(count) => Ok(count),
            other => Err(unexpected(other)),
        }
    }
}
