//! Interactive commands for a running controller

use std::io::BufRead;
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Write the current grid to an image
    Snapshot,

    /// Pause a running run, or resume a paused one
    TogglePause,

    /// Stop the run early and report its final state
    Quit,

    /// Quit, then shut down the coordinator and every worker
    Terminate,
}

impl Command {
    /// Map a single key press onto a command
    pub fn from_key(key: char) -> Option<Self> {
        match key {
            's' => Some(Command::Snapshot),
            'p' => Some(Command::TogglePause),
            'q' => Some(Command::Quit),
            'k' => Some(Command::Terminate),
            _ => None,
        }
    }
}

/// Forward key presses from stdin until stdin closes or the receiver is gone
///
/// Reads on a plain thread; a blocked stdin read must not hold up runtime
/// shutdown.
pub fn spawn_stdin_reader(commands: mpsc::Sender<Command>) -> JoinHandle<()> {
    thread::spawn(move || {
        let stdin = std::io::stdin();

        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin");
                    return;
                }
            };

            for key in line.chars().filter(|c| !c.is_whitespace()) {
                match Command::from_key(key) {
                    Some(command) => {
                        if commands.blocking_send(command).is_err() {
                            return;
                        }
                    }
                    None => debug!(key = %key, "Ignoring unknown key"),
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_mapping() {
        assert_eq!(Command::from_key('s'), Some(Command::Snapshot));
        assert_eq!(Command::from_key('p'), Some(Command::TogglePause));
        assert_eq!(Command::from_key('q'), Some(Command::Quit));
        assert_eq!(Command::from_key('k'), Some(Command::Terminate));
        assert_eq!(Command::from_key('x'), None);
        assert_eq!(Command::from_key('S'), None);
    }
}
