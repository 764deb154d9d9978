//! Life Core - foundation for the distributed Game of Life runtime
//!
//! This crate provides:
//! - **Grid model**: the on/off byte matrix shared by every component
//! - **Kernel**: the toroidal next-state computation for a row band
//! - **Partitioning**: the remainder-first row split used at every level
//! - **Configuration, errors and shutdown signalling** for the services
//!
//! # Example
//!
//! ```rust
//! use life_core::{kernel, Grid};
//!
//! let grid = Grid::from_rows(&[
//!     ".....",
//!     "..#..",
//!     "..#..",
//!     "..#..",
//!     ".....",
//! ])
//! .unwrap();
//!
//! // A blinker flips between vertical and horizontal
//! let next = kernel::step(&grid, 4).unwrap();
//! assert_eq!(next.alive_count(), 3);
//! assert!(next.is_alive(2, 1) && next.is_alive(2, 3));
//! ```

pub mod config;
pub mod error;
pub mod kernel;
pub mod partition;
pub mod shutdown;
pub mod types;

pub use config::LifeConfig;
pub use error::{Error, Result};
pub use shutdown::ShutdownSignal;
pub use types::*;
