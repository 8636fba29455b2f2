//! Worker role: computes one band of the next generation per request.
//!
//! The engine keeps no state between calls. [`WorkerClient`] is the remote
//! handle the master uses; both implement [`WorkerService`] so the master can
//! be driven by in-process workers in tests.

use crate::errors::{GridError, RpcError, WorkerError};
use crate::grid::next_band;
use crate::ipc_protocol::{Band, WorkAssignment, WorkerRequest, WorkerResponse};
use crate::rpc::{RpcClient, RpcHandler};
use async_trait::async_trait;
use log::{debug, error, warn};
use tokio::sync::Mutex;

#[async_trait]
pub trait WorkerService: Send + Sync {
    /// Compute rows `[start_row, end_row)` of the next generation.
    async fn compute_band(&self, assignment: WorkAssignment) -> Result<Band, WorkerError>;
}

/// Stateless band computation.
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkerEngine;

impl WorkerEngine {
    pub fn new() -> Self {
        Self
    }

    /// Validate the assignment and run the generation rule over its band.
    pub fn compute(assignment: &WorkAssignment) -> Result<Band, GridError> {
        let grid = &assignment.grid;
        grid.check_shape()?;
        let params = &assignment.params;
        if !grid.has_dimensions(params.image_width, params.image_height) {
            return Err(GridError::Dimensions {
                expected_width: params.image_width,
                expected_height: params.image_height,
                detail: format!("{}x{} grid", grid.width(), grid.height()),
            });
        }
        let rows = next_band(grid, assignment.start_row, assignment.end_row)?;
        Ok(Band {
            start_row: assignment.start_row,
            rows,
        })
    }
}

#[async_trait]
impl WorkerService for WorkerEngine {
    async fn compute_band(&self, assignment: WorkAssignment) -> Result<Band, WorkerError> {
        let band = tokio::task::spawn_blocking(move || Self::compute(&assignment))
            .await
            .map_err(|e| WorkerError::Join(e.to_string()))??;
        Ok(band)
    }
}

#[async_trait]
impl RpcHandler for WorkerEngine {
    type Request = WorkerRequest;
    type Response = WorkerResponse;

    async fn handle(&self, request: WorkerRequest) -> WorkerResponse {
        match request {
            WorkerRequest::ComputeBand(assignment) => {
                let (start_row, end_row) = (assignment.start_row, assignment.end_row);
                debug!("⚙️ Computing band [{}, {})", start_row, end_row);
                match self.compute_band(assignment).await {
                    Ok(band) => WorkerResponse::Band(band),
                    Err(e) => {
                        error!("❌ Rejected band [{}, {}): {}", start_row, end_row, e);
                        WorkerResponse::Error(e.to_string())
                    }
                }
            }
        }
    }
}

/// Remote worker reached over TCP.
///
/// Connects lazily on first use and keeps the connection for later turns.
/// The connection is only returned to the slot after a complete reply, so a
/// failed or cancelled call drops it and the next turn dials again. The
/// failed call itself is not retried.
pub struct WorkerClient {
    address: String,
    max_frame_bytes: u32,
    connection: Mutex<Option<RpcClient<WorkerRequest, WorkerResponse>>>,
}

impl WorkerClient {
    pub fn new(address: impl Into<String>, max_frame_bytes: u32) -> Self {
        Self {
            address: address.into(),
            max_frame_bytes,
            connection: Mutex::new(None),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn call(&self, request: &WorkerRequest) -> Result<WorkerResponse, RpcError> {
        let mut connection = self.connection.lock().await;
        // Taken out for the call: a reply left unread would desync the stream
        let mut client = match connection.take() {
            Some(client) => client,
            None => RpcClient::connect(&self.address, self.max_frame_bytes).await?,
        };
        match client.call(request).await {
            Ok(response) => {
                *connection = Some(client);
                Ok(response)
            }
            Err(e) => {
                warn!("⚠️ Worker {} call failed, dropping connection: {}", self.address, e);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl WorkerService for WorkerClient {
    async fn compute_band(&self, assignment: WorkAssignment) -> Result<Band, WorkerError> {
        match self.call(&WorkerRequest::ComputeBand(assignment)).await? {
            WorkerResponse::Band(band) => Ok(band),
            WorkerResponse::Error(message) => Err(RpcError::Remote(message).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationParams;
    use crate::grid::{Cell, Grid};

    fn assignment(start_row: usize, end_row: usize) -> WorkAssignment {
        WorkAssignment {
            params: SimulationParams::new(1, 2, 5, 5),
            grid: Grid::from_cells(5, 5, &[Cell::new(1, 2), Cell::new(2, 2), Cell::new(3, 2)]),
            start_row,
            end_row,
        }
    }

    #[tokio::test]
    async fn test_band_is_tagged_with_start_row() {
        let band = WorkerEngine::new().compute_band(assignment(1, 3)).await.unwrap();
        assert_eq!(band.start_row, 1);
        assert_eq!(band.end_row(), 3);
        assert_eq!(band.rows[0], vec![false, false, true, false, false]);
        assert_eq!(band.rows[1], vec![false, false, true, false, false]);
    }

    #[tokio::test]
    async fn test_band_past_grid_is_malformed() {
        let err = WorkerEngine::new().compute_band(assignment(3, 6)).await.unwrap_err();
        assert!(matches!(err, WorkerError::MalformedAssignment(GridError::InvalidBand { .. })));
    }

    #[tokio::test]
    async fn test_params_must_describe_grid() {
        let mut bad = assignment(0, 5);
        bad.params.image_height = 6;
        let err = WorkerEngine::new().compute_band(bad).await.unwrap_err();
        assert!(matches!(err, WorkerError::MalformedAssignment(GridError::Dimensions { .. })));
    }

    #[tokio::test]
    async fn test_handler_turns_errors_into_responses() {
        let response = WorkerEngine::new()
            .handle(WorkerRequest::ComputeBand(assignment(4, 2)))
            .await;
        assert!(matches!(response, WorkerResponse::Error(_)));
    }
}
