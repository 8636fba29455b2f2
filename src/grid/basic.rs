// Grid model shared by every role

use crate::errors::{GridError, GridResult};
use serde::{Deserialize, Serialize};

/// Byte value of a live cell in the row-major image stream.
pub const ALIVE_BYTE: u8 = 255;
/// Byte value of a dead cell in the row-major image stream.
pub const DEAD_BYTE: u8 = 0;

pub type Row = Vec<bool>;

/// Coordinate of a live cell, `x` is the column and `y` the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    pub x: usize,
    pub y: usize,
}

impl Cell {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

/// Rectangular matrix of cell states.
///
/// Every row holds exactly `width` cells and there are exactly `height` rows.
/// The constructors enforce this, and the fields stay private so nothing can
/// break it afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    width: usize,
    height: usize,
    rows: Vec<Row>,
}

impl Grid {
    /// All-dead grid
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            rows: vec![vec![false; width]; height],
        }
    }

    /// Build a grid from rows, checking the row count and every row length.
    pub fn from_rows(width: usize, height: usize, rows: Vec<Row>) -> GridResult<Self> {
        if rows.len() != height {
            return Err(GridError::Dimensions {
                expected_width: width,
                expected_height: height,
                detail: format!("{} rows", rows.len()),
            });
        }
        if let Some((index, row)) = rows.iter().enumerate().find(|(_, row)| row.len() != width) {
            return Err(GridError::Dimensions {
                expected_width: width,
                expected_height: height,
                detail: format!("row {} with {} cells", index, row.len()),
            });
        }
        Ok(Self {
            width,
            height,
            rows,
        })
    }

    /// Rows produced inside the crate that already have the right shape.
    pub(crate) fn with_rows(width: usize, height: usize, rows: Vec<Row>) -> Self {
        debug_assert!(rows.len() == height && rows.iter().all(|row| row.len() == width));
        Self {
            width,
            height,
            rows,
        }
    }

    /// Build a grid from a list of live cells. Cells outside the grid are ignored.
    pub fn from_cells(width: usize, height: usize, cells: &[Cell]) -> Self {
        let mut grid = Self::new(width, height);
        for cell in cells {
            if cell.x < width && cell.y < height {
                grid.rows[cell.y][cell.x] = true;
            }
        }
        grid
    }

    /// Reassemble a row-major byte stream, `255` meaning alive.
    pub fn from_bytes(width: usize, height: usize, bytes: &[u8]) -> GridResult<Self> {
        if width.checked_mul(height) != Some(bytes.len()) {
            return Err(GridError::Dimensions {
                expected_width: width,
                expected_height: height,
                detail: format!("{} bytes", bytes.len()),
            });
        }
        let rows = if width == 0 {
            vec![Vec::new(); height]
        } else {
            bytes
                .chunks(width)
                .map(|chunk| chunk.iter().map(|&b| b == ALIVE_BYTE).collect())
                .collect()
        };
        Ok(Self {
            width,
            height,
            rows,
        })
    }

    /// Row-major byte stream, the inverse of [`Grid::from_bytes`].
    pub fn to_bytes(&self) -> Vec<u8> {
        self.rows
            .iter()
            .flat_map(|row| {
                row.iter()
                    .map(|&alive| if alive { ALIVE_BYTE } else { DEAD_BYTE })
            })
            .collect()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn is_alive(&self, x: usize, y: usize) -> bool {
        self.rows[y][x]
    }

    pub fn set(&mut self, x: usize, y: usize, alive: bool) {
        self.rows[y][x] = alive;
    }

    /// Live cell lookup with toroidal wraparound on both axes.
    pub fn is_alive_wrapped(&self, x: isize, y: isize) -> bool {
        let x = x.rem_euclid(self.width as isize) as usize;
        let y = y.rem_euclid(self.height as isize) as usize;
        self.rows[y][x]
    }

    pub fn alive_count(&self) -> usize {
        self.rows
            .iter()
            .map(|row| row.iter().filter(|&&alive| alive).count())
            .sum()
    }

    /// Live cells in row-major order.
    pub fn alive_cells(&self) -> Vec<Cell> {
        let mut cells = Vec::new();
        for (y, row) in self.rows.iter().enumerate() {
            for (x, &alive) in row.iter().enumerate() {
                if alive {
                    cells.push(Cell::new(x, y));
                }
            }
        }
        cells
    }

    pub fn has_dimensions(&self, width: usize, height: usize) -> bool {
        self.width == width && self.height == height
    }

    /// Re-check the shape invariant. Grids arriving off the wire skip the
    /// constructors, so receivers call this before trusting one.
    pub fn check_shape(&self) -> GridResult<()> {
        if self.rows.len() != self.height || self.rows.iter().any(|row| row.len() != self.width) {
            return Err(GridError::Dimensions {
                expected_width: self.width,
                expected_height: self.height,
                detail: "ragged rows".to_string(),
            });
        }
        Ok(())
    }
}
