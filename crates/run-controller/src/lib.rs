//! Run controller for the distributed Game of Life
//!
//! Loads the initial image, drives one coordinator run and reports what
//! happens as a stream of [`Event`]s:
//! - **Images**: PGM input and output through an [`ImageStore`]
//! - **Monitoring**: periodic alive-cell counts while the run executes
//! - **Commands**: snapshot, pause/resume, quit and terminate-all

pub mod command;
pub mod controller;
pub mod events;
pub mod image;

pub use command::Command;
pub use controller::{Params, RunController, RunReport};
pub use events::{Event, State};
pub use image::{ImageStore, PgmStore};
