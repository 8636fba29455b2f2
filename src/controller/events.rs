//! Events published by the controller while a run is in progress

use crate::grid::Cell;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Executing,
    Quitting,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Executing => write!(f, "Executing"),
            State::Quitting => write!(f, "Quitting"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Periodic report taken from the latest received grid
    AliveCellsCount {
        completed_turns: u64,
        cells_count: usize,
    },
    ImageOutputComplete {
        completed_turns: u64,
        filename: String,
    },
    StateChange {
        completed_turns: u64,
        new_state: State,
    },
    /// Last event of a completed run. Cells are in row-major order.
    FinalTurnComplete {
        completed_turns: u64,
        alive: Vec<Cell>,
    },
}

impl Event {
    pub fn completed_turns(&self) -> u64 {
        match self {
            Event::AliveCellsCount { completed_turns, .. }
            | Event::ImageOutputComplete { completed_turns, .. }
            | Event::StateChange { completed_turns, .. }
            | Event::FinalTurnComplete { completed_turns, .. } => *completed_turns,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::AliveCellsCount {
                completed_turns,
                cells_count,
            } => write!(f, "Turn {}: {} alive cells", completed_turns, cells_count),
            Event::ImageOutputComplete {
                completed_turns,
                filename,
            } => write!(f, "Turn {}: wrote {}", completed_turns, filename),
            Event::StateChange {
                completed_turns,
                new_state,
            } => write!(f, "Turn {}: {}", completed_turns, new_state),
            Event::FinalTurnComplete {
                completed_turns,
                alive,
            } => write!(
                f,
                "Final turn {} complete: {} alive cells",
                completed_turns,
                alive.len()
            ),
        }
    }
}
