//! Grid image storage
//!
//! Images are binary PGM (`P5`) files with a max value of 255, named
//! `"<width>x<height>"` for inputs and `"<width>x<height>x<turn>"` for
//! outputs.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use life_core::{Error, Grid, Result, Turn};

const PGM_MAGIC: &str = "P5";
const PGM_MAX_VALUE: usize = 255;

/// Name of the input image for a board size
pub fn input_name(width: usize, height: usize) -> String {
    format!("{}x{}", width, height)
}

/// Name of an output image taken at `turn`
pub fn output_name(width: usize, height: usize, turn: Turn) -> String {
    format!("{}x{}x{}", width, height, turn)
}

/// Source of initial grids and sink for result grids
pub trait ImageStore: Send + Sync {
    /// Load the image called `name`, which must be `height` x `width`
    fn load(&self, name: &str, height: usize, width: usize) -> Result<Grid>;

    /// Write `grid` as the image called `name`
    fn save(&self, name: &str, grid: &Grid) -> Result<()>;
}

/// PGM files read from one directory and written to another
#[derive(Debug, Clone)]
pub struct PgmStore {
    input_dir: PathBuf,
    output_dir: PathBuf,
}

impl PgmStore {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn input_path(&self, name: &str) -> PathBuf {
        self.input_dir.join(format!("{}.pgm", name))
    }

    pub fn output_path(&self, name: &str) -> PathBuf {
        self.output_dir.join(format!("{}.pgm", name))
    }
}

impl ImageStore for PgmStore {
    fn load(&self, name: &str, height: usize, width: usize) -> Result<Grid> {
        let path = self.input_path(name);
        let data = fs::read(&path)?;
        let grid = decode_pgm(&data).map_err(|e| with_path(e, &path))?;

        if grid.height() != height || grid.width() != width {
            return Err(Error::InvalidGrid {
                message: format!(
                    "{} is {}x{}, expected {}x{}",
                    path.display(),
                    grid.width(),
                    grid.height(),
                    width,
                    height
                ),
            });
        }

        debug!(path = %path.display(), alive = grid.alive_count(), "Loaded image");
        Ok(grid)
    }

    fn save(&self, name: &str, grid: &Grid) -> Result<()> {
        fs::create_dir_all(&self.output_dir)?;
        let path = self.output_path(name);
        fs::write(&path, encode_pgm(grid))?;

        debug!(path = %path.display(), "Wrote image");
        Ok(())
    }
}

fn with_path(err: Error, path: &Path) -> Error {
    match err {
        Error::InvalidGrid { message } => Error::InvalidGrid {
            message: format!("{}: {}", path.display(), message),
        },
        other => other,
    }
}

/// Serialize a grid as a binary PGM
pub fn encode_pgm(grid: &Grid) -> Vec<u8> {
    let header = format!(
        "{}\n{} {}\n{}\n",
        PGM_MAGIC,
        grid.width(),
        grid.height(),
        PGM_MAX_VALUE
    );
    let mut out = Vec::with_capacity(header.len() + grid.as_bytes().len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(grid.as_bytes());
    out
}

/// Parse a binary PGM; `#` comments are allowed in the header
pub fn decode_pgm(data: &[u8]) -> Result<Grid> {
    let mut pos = 0;
    let mut fields = [0usize; 3];

    let magic = next_token(data, &mut pos)?;
    if magic != PGM_MAGIC.as_bytes() {
        return Err(invalid("not a binary PGM (expected P5)"));
    }

    for field in fields.iter_mut() {
        let token = next_token(data, &mut pos)?;
        *field = std::str::from_utf8(token)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| invalid("malformed PGM header"))?;
    }
    let [width, height, max_value] = fields;

    if max_value != PGM_MAX_VALUE {
        return Err(invalid(&format!("unsupported max value {}", max_value)));
    }

    // Exactly one whitespace byte separates the header from the raster
    pos += 1;
    let end = width
        .checked_mul(height)
        .and_then(|len| len.checked_add(pos))
        .ok_or_else(|| invalid("PGM dimensions overflow"))?;
    let raster = data
        .get(pos..end)
        .ok_or_else(|| invalid("truncated PGM raster"))?;

    Grid::from_bytes(height, width, raster.to_vec())
}

fn next_token<'a>(data: &'a [u8], pos: &mut usize) -> Result<&'a [u8]> {
    loop {
        match data.get(*pos) {
            Some(b'#') => {
                while data.get(*pos).is_some_and(|&b| b != b'\n') {
                    *pos += 1;
                }
            }
            Some(b) if b.is_ascii_whitespace() => *pos += 1,
            Some(_) => break,
            None => return Err(invalid("truncated PGM header")),
        }
    }

    let start = *pos;
    while data.get(*pos).is_some_and(|b| !b.is_ascii_whitespace()) {
        *pos += 1;
    }
    Ok(&data[start..*pos])
}

fn invalid(message: &str) -> Error {
    Error::InvalidGrid {
        message: message.to_string(),
    }
}
