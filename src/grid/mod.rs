// Grid model, generation rule and band partitioning
pub mod bands;
pub mod basic;
pub mod rule;

pub use bands::partition_rows;
pub use basic::{Cell, Grid, Row, ALIVE_BYTE, DEAD_BYTE};
pub use rule::{live_neighbours, next_band, next_cell_state, next_grid};
