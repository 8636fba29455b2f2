// Generation rule with toroidal neighbour lookup

use super::basic::{Grid, Row};
use crate::errors::{GridError, GridResult};

const NEIGHBOUR_OFFSETS: [(isize, isize); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Number of live neighbours around `(x, y)`, wrapping at every edge.
pub fn live_neighbours(grid: &Grid, x: usize, y: usize) -> usize {
    NEIGHBOUR_OFFSETS
        .iter()
        .filter(|(dx, dy)| grid.is_alive_wrapped(x as isize + dx, y as isize + dy))
        .count()
}

/// Conway's rule for a single cell.
pub fn next_cell_state(alive: bool, neighbours: usize) -> bool {
    matches!((alive, neighbours), (true, 2) | (true, 3) | (false, 3))
}

/// Next generation of rows `[start_row, end_row)`.
///
/// `grid` must be the whole current grid, not just the band: the rows either
/// side of the band (and the opposite edge, for bands touching row 0 or the
/// last row) feed the neighbour counts.
pub fn next_band(grid: &Grid, start_row: usize, end_row: usize) -> GridResult<Vec<Row>> {
    if start_row > end_row || end_row > grid.height() {
        return Err(GridError::InvalidBand {
            start_row,
            end_row,
            height: grid.height(),
        });
    }

    let band = (start_row..end_row)
        .map(|y| {
            (0..grid.width())
                .map(|x| next_cell_state(grid.is_alive(x, y), live_neighbours(grid, x, y)))
                .collect()
        })
        .collect();
    Ok(band)
}

/// Next generation of the whole grid.
pub fn next_grid(grid: &Grid) -> Grid {
    let rows = (0..grid.height())
        .map(|y| {
            (0..grid.width())
                .map(|x| next_cell_state(grid.is_alive(x, y), live_neighbours(grid, x, y)))
                .collect()
        })
        .collect();
    Grid::with_rows(grid.width(), grid.height(), rows)
}
