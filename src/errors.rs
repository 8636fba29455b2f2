//! Error types for every layer of the engine.
//!
//! Each role gets its own enum and wraps the layer below with `#[from]`, so a
//! binary can bubble any failure up to `main` with `?` and log it once.

use std::io;
use thiserror::Error;

/// Errors raised while building or evolving a grid.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GridError {
    /// Rows or bytes did not describe a `width` x `height` grid
    #[error("grid dimension mismatch: expected {expected_width}x{expected_height}, found {detail}")]
    Dimensions {
        expected_width: usize,
        expected_height: usize,
        detail: String,
    },
    /// A row band fell outside the grid
    #[error("invalid band [{start_row}, {end_row}) for grid of height {height}")]
    InvalidBand {
        start_row: usize,
        end_row: usize,
        height: usize,
    },
}

/// Transport level failures.
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("network I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("failed to encode or decode message: {0}")]
    Codec(#[from] bincode::Error),
    #[error("malformed frame: {0}")]
    Frame(String),
    #[error("connection closed by peer")]
    Closed,
    #[error("protocol version mismatch: local {local}, remote {remote}")]
    VersionMismatch { local: u32, remote: u32 },
    /// The peer processed the request and answered with an error
    #[error("remote error: {0}")]
    Remote(String),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("malformed work assignment: {0}")]
    MalformedAssignment(#[from] GridError),
    #[error("worker call failed: {0}")]
    Rpc(#[from] RpcError),
    #[error("band computation aborted: {0}")]
    Join(String),
}

#[derive(Error, Debug)]
pub enum MasterError {
    /// RunMaster was called without a grid and the master retains none
    #[error("no grid supplied and no world retained on the master")]
    NoRetainedWorld,
    #[error("turn {0} cannot be advanced: counter overflow")]
    TurnOverflow(u64),
    #[error("worker {index} failed: {source}")]
    Worker {
        index: usize,
        #[source]
        source: WorkerError,
    },
    #[error("worker {index} returned band starting at {actual} with {rows} rows, expected [{start_row}, {end_row})")]
    BandMismatch {
        index: usize,
        start_row: usize,
        end_row: usize,
        actual: usize,
        rows: usize,
    },
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error("master call failed: {0}")]
    Rpc(#[from] RpcError),
    #[error("local generation aborted: {0}")]
    Join(String),
}

#[derive(Error, Debug)]
pub enum ImageIoError {
    #[error("image I/O failed for {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid PGM image {name}: {reason}")]
    Format { name: String, reason: String },
    #[error("image writer has stopped")]
    WriterStopped,
}

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error(transparent)]
    Master(#[from] MasterError),
    #[error(transparent)]
    Image(#[from] ImageIoError),
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error("master returned a {actual_width}x{actual_height} grid for a {width}x{height} run")]
    WorldMismatch {
        width: usize,
        height: usize,
        actual_width: usize,
        actual_height: usize,
    },
}

/// Result alias used across the crate for grid construction.
pub type GridResult<T> = Result<T, GridError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = GridError::InvalidBand {
            start_row: 4,
            end_row: 9,
            height: 6,
        };
        let display = format!("{}", error);
        assert!(display.contains("[4, 9)"));
        assert!(display.contains("height 6"));
    }

    #[test]
    fn test_worker_error_wraps_grid_error() {
        let error: WorkerError = GridError::InvalidBand {
            start_row: 0,
            end_row: 3,
            height: 2,
        }
        .into();
        assert!(matches!(error, WorkerError::MalformedAssignment(_)));
        assert!(error.to_string().starts_with("malformed work assignment"));
    }

    #[test]
    fn test_master_error_keeps_worker_index() {
        let error = MasterError::Worker {
            index: 3,
            source: WorkerError::Rpc(RpcError::Closed),
        };
        assert!(error.to_string().contains("worker 3"));
    }
}
