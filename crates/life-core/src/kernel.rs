//! Toroidal Game of Life kernel
//!
//! Computes next-state bytes for a rectangular band of a grid. Neighbor
//! lookups wrap around both edges, so the full grid is always required even
//! when only a few rows are produced. The band is split into thread-level
//! sub-bands that run on the rayon pool; they write disjoint rows and only
//! read the shared input, so no synchronization is needed between them.

use rayon::prelude::*;
use std::ops::Range;

use crate::partition::split_range;
use crate::{Band, Error, Grid, Result, ALIVE, DEAD};

const NEIGHBOR_OFFSETS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Apply the life rule to one cell
#[inline]
pub fn next_cell(current: u8, alive_neighbors: u8) -> u8 {
    match (current == ALIVE, alive_neighbors) {
        (true, n) if n < 2 => DEAD,
        (true, n) if n > 3 => DEAD,
        (false, 3) => ALIVE,
        _ => current,
    }
}

/// Count live cells among the 8 wrapped neighbors of `(row, col)`
#[inline]
pub fn alive_neighbors(grid: &Grid, row: usize, col: usize) -> u8 {
    let height = grid.height() as isize;
    let width = grid.width() as isize;

    NEIGHBOR_OFFSETS
        .iter()
        .filter(|(dr, dc)| {
            let r = (row as isize + dr + height) % height;
            let c = (col as isize + dc + width) % width;
            grid.is_alive(r as usize, c as usize)
        })
        .count() as u8
}

/// Next-state bytes for `band`, row-major, `band.cell_count()` long
///
/// `thread_count` only controls how the work is divided; the output is the
/// same for every value.
pub fn next_band(grid: &Grid, band: &Band, thread_count: usize) -> Result<Vec<u8>> {
    if thread_count == 0 {
        return Err(Error::InvalidArgument {
            message: "thread_count must be at least 1".to_string(),
        });
    }
    band.validate(grid.height(), grid.width())?;

    // More parts than rows only yields empty ranges
    let split_into = thread_count.min(band.height().max(1));
    let sub_bands: Vec<Range<usize>> = split_range(band.start_row..band.end_row, split_into)
        .into_iter()
        .filter(|rows| !rows.is_empty())
        .collect();

    let cols = band.start_col..band.end_col;
    let parts: Vec<Vec<u8>> = sub_bands
        .into_par_iter()
        .map(|rows| compute_rows(grid, rows, cols.clone()))
        .collect();

    let mut out = Vec::with_capacity(band.cell_count());
    for part in parts {
        out.extend_from_slice(&part);
    }
    Ok(out)
}

fn compute_rows(grid: &Grid, rows: Range<usize>, cols: Range<usize>) -> Vec<u8> {
    let mut out = Vec::with_capacity(rows.len() * cols.len());
    for row in rows {
        for col in cols.clone() {
            out.push(next_cell(grid.get(row, col), alive_neighbors(grid, row, col)));
        }
    }
    out
}

/// Advance a whole grid by one turn
pub fn step(grid: &Grid, thread_count: usize) -> Result<Grid> {
    let cells = next_band(grid, &Band::whole(grid), thread_count)?;
    Grid::from_bytes(grid.height(), grid.width(), cells)
}
