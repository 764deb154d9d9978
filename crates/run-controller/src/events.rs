//! Events reported to the controller's consumer

use std::fmt;

use life_core::{Cell, Turn};

/// Execution state announced through [`Event::StateChange`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Paused,
    Executing,
    Quitting,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Paused => "Paused",
            State::Executing => "Executing",
            State::Quitting => "Quitting",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A cell changed state; emitted for every initially alive cell
    CellFlipped { turn: Turn, cell: Cell },

    /// Periodic population report
    AliveCellsCount { completed_turns: Turn, cells_count: usize },

    /// An image file has been written
    ImageOutputComplete { turn: Turn, filename: String },

    StateChange { turn: Turn, state: State },

    /// The run is over; `alive` is the final population
    FinalTurnComplete { completed_turns: Turn, alive: Vec<Cell> },
}

impl Event {
    /// Turn the event refers to
    pub fn turn(&self) -> Turn {
        match self {
            Event::CellFlipped { turn, .. }
            | Event::ImageOutputComplete { turn, .. }
            | Event::StateChange { turn, .. } => *turn,
            Event::AliveCellsCount { completed_turns, .. }
            | Event::FinalTurnComplete { completed_turns, .. } => *completed_turns,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::CellFlipped { turn, cell } => {
                write!(f, "Turn {}: cell ({}, {}) flipped", turn, cell.x, cell.y)
            }
            Event::AliveCellsCount {
                completed_turns,
                cells_count,
            } => write!(f, "Turn {}: {} alive cells", completed_turns, cells_count),
            Event::ImageOutputComplete { turn, filename } => {
                write!(f, "Turn {}: wrote {}", turn, filename)
            }
            Event::StateChange { turn, state } => write!(f, "Turn {}: {}", turn, state),
            Event::FinalTurnComplete {
                completed_turns,
                alive,
            } => write!(
                f,
                "Final turn {} complete with {} alive cells",
                completed_turns,
                alive.len()
            ),
        }
    }
}
