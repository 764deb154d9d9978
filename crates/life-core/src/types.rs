//! Core type definitions for the distributed life runtime

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Byte value of a live cell
pub const ALIVE: u8 = 255;

/// Byte value of a dead cell
pub const DEAD: u8 = 0;

/// Completed-turn counter
pub type Turn = u64;

/// Coordinates of a single cell; `x` is the column, `y` the row
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

/// Row-major on/off matrix, one byte per cell
///
/// Every cell is either [`ALIVE`] or [`DEAD`]; constructors that take raw
/// bytes reject anything else.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    height: usize,
    width: usize,
    cells: Vec<u8>,
}

impl Grid {
    /// Create an all-dead grid
    pub fn new(height: usize, width: usize) -> Self {
        Self {
            height,
            width,
            cells: vec![DEAD; height * width],
        }
    }

    /// Build a grid from wire bytes, validating length and cell values
    pub fn from_bytes(height: usize, width: usize, cells: Vec<u8>) -> Result<Self> {
        let expected = height.checked_mul(width).ok_or_else(|| Error::InvalidGrid {
            message: format!("{}x{} overflows", width, height),
        })?;

        if cells.len() != expected {
            return Err(Error::InvalidGrid {
                message: format!(
                    "expected {} bytes for {}x{} grid, got {}",
                    expected,
                    width,
                    height,
                    cells.len()
                ),
            });
        }

        if let Some(pos) = cells.iter().position(|&c| c != ALIVE && c != DEAD) {
            return Err(Error::InvalidGrid {
                message: format!(
                    "cell ({}, {}) has value {}, expected 0 or 255",
                    pos % width,
                    pos / width,
                    cells[pos]
                ),
            });
        }

        Ok(Self {
            height,
            width,
            cells,
        })
    }

    /// Build a grid from text rows using `#` for alive and `.` for dead
    pub fn from_rows(rows: &[&str]) -> Result<Self> {
        let height = rows.len();
        let width = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut cells = Vec::with_capacity(height * width);

        for (y, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(Error::InvalidGrid {
                    message: format!("row {} has width {}, expected {}", y, row.len(), width),
                });
            }
            for b in row.bytes() {
                cells.push(match b {
                    b'#' => ALIVE,
                    b'.' => DEAD,
                    other => {
                        return Err(Error::InvalidGrid {
                            message: format!("unexpected character {:?} in row {}", other as char, y),
                        })
                    }
                });
            }
        }

        Ok(Self {
            height,
            width,
            cells,
        })
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// True for the zero-sized grid held between runs
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.cells
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.cells
    }

    /// Raw byte at `(row, col)`
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> u8 {
        self.cells[row * self.width + col]
    }

    #[inline]
    pub fn is_alive(&self, row: usize, col: usize) -> bool {
        self.get(row, col) == ALIVE
    }

    pub fn set(&mut self, row: usize, col: usize, alive: bool) {
        self.cells[row * self.width + col] = if alive { ALIVE } else { DEAD };
    }

    /// One full row of cells
    pub fn row(&self, row: usize) -> &[u8] {
        let start = row * self.width;
        &self.cells[start..start + self.width]
    }

    /// All live cells in row-major order
    pub fn alive_cells(&self) -> Vec<Cell> {
        if self.width == 0 {
            return Vec::new();
        }
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, &c)| c == ALIVE)
            .map(|(i, _)| Cell::new(i % self.width, i / self.width))
            .collect()
    }

    pub fn alive_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c == ALIVE).count()
    }
}

impl fmt::Debug for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Grid {}x{}", self.width, self.height)?;
        for y in 0..self.height {
            let line: String = self
                .row(y)
                .iter()
                .map(|&c| if c == ALIVE { '#' } else { '.' })
                .collect();
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

/// Rectangular region of a grid: rows `start_row..end_row`, cols `start_col..end_col`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Band {
    pub start_row: usize,
    pub end_row: usize,
    pub start_col: usize,
    pub end_col: usize,
}

impl Band {
    pub fn new(start_row: usize, end_row: usize, start_col: usize, end_col: usize) -> Self {
        Self {
            start_row,
            end_row,
            start_col,
            end_col,
        }
    }

    /// Full-width band covering `start_row..end_row`
    pub fn rows(start_row: usize, end_row: usize, width: usize) -> Self {
        Self::new(start_row, end_row, 0, width)
    }

    /// Band covering an entire grid
    pub fn whole(grid: &Grid) -> Self {
        Self::rows(0, grid.height(), grid.width())
    }

    pub fn height(&self) -> usize {
        self.end_row.saturating_sub(self.start_row)
    }

    pub fn width(&self) -> usize {
        self.end_col.saturating_sub(self.start_col)
    }

    /// Number of cells the band produces
    pub fn cell_count(&self) -> usize {
        self.height() * self.width()
    }

    pub fn is_empty(&self) -> bool {
        self.cell_count() == 0
    }

    /// Check the band lies inside a `height x width` grid
    pub fn validate(&self, height: usize, width: usize) -> Result<()> {
        if self.start_row > self.end_row
            || self.end_row > height
            || self.start_col > self.end_col
            || self.end_col > width
        {
            return Err(Error::InvalidBand {
                start_row: self.start_row,
                end_row: self.end_row,
                start_col: self.start_col,
                end_col: self.end_col,
                height,
                width,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bytes_validation() {
        assert!(Grid::from_bytes(2, 2, vec![0, 255, 255, 0]).is_ok());
        assert!(matches!(
            Grid::from_bytes(2, 2, vec![0, 255, 255]),
            Err(Error::InvalidGrid { .. })
        ));
        assert!(matches!(
            Grid::from_bytes(2, 2, vec![0, 255, 1, 0]),
            Err(Error::InvalidGrid { .. })
        ));
    }

    #[test]
    fn test_alive_cells_use_column_as_x() {
        let grid = Grid::from_rows(&["...", "..#", "#.."]).unwrap();
        assert_eq!(grid.alive_cells(), vec![Cell::new(2, 1), Cell::new(0, 2)]);
        assert_eq!(grid.alive_count(), 2);
    }

    #[test]
    fn test_from_rows_rejects_ragged_rows() {
        assert!(Grid::from_rows(&["..", "..."]).is_err());
        assert!(Grid::from_rows(&[".x"]).is_err());
    }

    #[test]
    fn test_band_validation() {
        assert!(Band::rows(0, 4, 4).validate(4, 4).is_ok());
        assert!(Band::rows(2, 2, 4).validate(4, 4).is_ok());
        assert!(Band::rows(3, 5, 4).validate(4, 4).is_err());
        assert!(Band::new(0, 1, 2, 5).validate(4, 4).is_err());
        assert!(Band::rows(3, 2, 4).validate(4, 4).is_err());
    }

    #[test]
    fn test_empty_grid() {
        let grid = Grid::default();
        assert!(grid.is_empty());
        assert!(grid.alive_cells().is_empty());
    }
}
