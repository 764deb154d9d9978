//! Turn-loop state machine
//!
//! [`TurnEngine`] is the single owner of the authoritative grid. All mutable
//! run state lives in one [`RunState`] behind one mutex, and the lock is only
//! held for short critical sections: copying the grid out before a turn,
//! swapping in the reassembled grid after it, and lifecycle transitions. It
//! is never held while workers are computing, so queries stay responsive for
//! the whole turn.
//!
//! Lifecycle: `Idle -> Running -> {Paused <-> Running} -> {Completed | Quit |
//! Failed} -> Idle`. Pause is a flag the loop checks (with a [`Notify`] to
//! wake it) before starting a turn and again before committing one, so the
//! turn counter is frozen while paused. Quit is an atomic flag checked at the
//! same two points. When quit lands while a turn is in flight, the turn's
//! results are discarded and the run reports the last committed turn.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{watch, Notify};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use life_core::partition::partition_bands;
use life_core::{Cell, Error, Grid, Result, Turn};

use crate::executor::BandExecutor;

/// Coordinator lifecycle state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// No run active; a new run may start
    #[default]
    Idle,

    /// Turn loop is executing turns
    Running,

    /// Turn loop is held before its next commit or fan-out
    Paused,

    /// Run stopped early on request
    Quit,

    /// Run reached its target turn count
    Completed,

    /// Run aborted by a worker or timeout error
    Failed,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Lifecycle::Idle => "idle",
            Lifecycle::Running => "running",
            Lifecycle::Paused => "paused",
            Lifecycle::Quit => "quit",
            Lifecycle::Completed => "completed",
            Lifecycle::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Final state handed back to the StartRun caller
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub grid: Grid,
    pub turn: Turn,
    pub alive: Vec<Cell>,
}

/// Summary of the most recently finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub ended: Lifecycle,
    pub final_turn: Turn,
    pub target_turns: Turn,
    pub finished_at: DateTime<Utc>,
    pub error: Option<String>,
}

/// Point-in-time view of the engine for the status API
#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub state: Lifecycle,
    pub run_id: Option<Uuid>,
    pub turn: Turn,
    pub target_turns: Turn,
    pub height: usize,
    pub width: usize,
    pub alive_cells: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub pool_size: usize,
    pub last_run: Option<RunSummary>,
}

/// Everything guarded by the state lock
#[derive(Default)]
struct RunState {
    lifecycle: Lifecycle,
    grid: Grid,
    turn: Turn,
    target_turns: Turn,
    run_id: Option<Uuid>,
    started_at: Option<DateTime<Utc>>,
    /// Receives the final turn once the active loop has finished
    finished: Option<watch::Receiver<Option<Turn>>>,
    last_run: Option<RunSummary>,
}

impl RunState {
    fn reset(&mut self) {
        let last_run = self.last_run.take();
        *self = RunState {
            last_run,
            ..Default::default()
        };
    }
}

/// Authoritative world state plus the turn loop that advances it
pub struct TurnEngine {
    state: Mutex<RunState>,
    executor: Arc<dyn BandExecutor>,
    quit: AtomicBool,
    lifecycle_changed: Notify,
    turn_timeout: Option<Duration>,
}

impl TurnEngine {
    pub fn new(executor: Arc<dyn BandExecutor>) -> Self {
        Self::with_turn_timeout(executor, None)
    }

    /// Bound each turn's fan-out; `None` waits for workers indefinitely
    pub fn with_turn_timeout(executor: Arc<dyn BandExecutor>, turn_timeout: Option<Duration>) -> Self {
        Self {
            state: Mutex::new(RunState::default()),
            executor,
            quit: AtomicBool::new(false),
            lifecycle_changed: Notify::new(),
            turn_timeout,
        }
    }

    pub fn executor(&self) -> &Arc<dyn BandExecutor> {
        &self.executor
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.state.lock().lifecycle
    }

    /// True once quit has been requested for the active run
    pub fn is_quitting(&self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }

    /// Run `turns` turns starting from `grid`, blocking until the loop ends
    ///
    /// The loop itself runs on its own task so the other operations can
    /// interleave with it.
    pub async fn start_run(
        self: &Arc<Self>,
        grid: Grid,
        turns: Turn,
        thread_count: usize,
    ) -> Result<RunOutcome> {
        if grid.is_empty() {
            return Err(Error::InvalidGrid {
                message: "cannot start a run on an empty grid".to_string(),
            });
        }
        if thread_count == 0 {
            return Err(Error::InvalidArgument {
                message: "thread_count must be at least 1".to_string(),
            });
        }

        let run_id = Uuid::new_v4();
        let (finished_tx, finished_rx) = watch::channel(None);
        let (height, width) = (grid.height(), grid.width());

        {
            let mut state = self.state.lock();
            if state.lifecycle != Lifecycle::Idle {
                return Err(Error::InvalidLifecycle {
                    operation: "start a run".to_string(),
                    state: state.lifecycle.to_string(),
                });
            }
            self.quit.store(false, Ordering::SeqCst);
            state.lifecycle = Lifecycle::Running;
            state.grid = grid;
            state.turn = 0;
            state.target_turns = turns;
            state.run_id = Some(run_id);
            state.started_at = Some(Utc::now());
            state.finished = Some(finished_rx);
        }

        info!(
            run_id = %run_id,
            turns = turns,
            height = height,
            width = width,
            threads = thread_count,
            pool_size = self.executor.pool_size(),
            "Run started"
        );

        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let result = engine.run_turns(turns, thread_count).await;
            engine.finish(run_id, result, finished_tx)
        });

        handle.await.map_err(|e| Error::Internal {
            message: format!("turn loop task failed: {}", e),
        })?
    }

    async fn run_turns(&self, target: Turn, thread_count: usize) -> Result<()> {
        loop {
            if !self.wait_until_runnable().await {
                return Ok(());
            }

            // Copy-in: the only read of the grid the turn needs
            let (grid, turn) = {
                let state = self.state.lock();
                if state.turn >= target {
                    return Ok(());
                }
                (Arc::new(state.grid.clone()), state.turn)
            };

            let next = self.execute_turn(grid, turn, thread_count).await?;

            if !self.commit(next).await {
                debug!(turn = turn, "Discarded in-flight turn after quit");
                return Ok(());
            }
        }
    }

    /// Block while paused; false once quit has been requested
    async fn wait_until_runnable(&self) -> bool {
        loop {
            let notified = self.lifecycle_changed.notified();
            if self.quit.load(Ordering::SeqCst) {
                return false;
            }
            if self.state.lock().lifecycle != Lifecycle::Paused {
                return true;
            }
            notified.await;
        }
    }

    /// Swap in the next grid, waiting out a pause; false if quit won
    async fn commit(&self, next: Grid) -> bool {
        loop {
            let notified = self.lifecycle_changed.notified();
            {
                let mut state = self.state.lock();
                if self.quit.load(Ordering::SeqCst) {
                    return false;
                }
                if state.lifecycle != Lifecycle::Paused {
                    state.grid = next;
                    state.turn += 1;
                    return true;
                }
            }
            notified.await;
        }
    }

    /// Fan one turn out across the pool and reassemble the bands in order
    async fn execute_turn(&self, grid: Arc<Grid>, turn: Turn, thread_count: usize) -> Result<Grid> {
        let (height, width) = (grid.height(), grid.width());
        let bands = partition_bands(height, width, self.executor.pool_size());

        let calls = bands
            .into_iter()
            .enumerate()
            .filter(|(_, band)| !band.is_empty())
            .map(|(slot, band)| {
                let grid = Arc::clone(&grid);
                let executor = &self.executor;
                async move { executor.compute_band(slot, grid, band, thread_count).await }
            });

        let parts = match self.turn_timeout {
            Some(limit) => tokio::time::timeout(limit, try_join_all(calls))
                .await
                .map_err(|_| Error::TurnTimeout {
                    turn: turn + 1,
                    timeout_ms: limit.as_millis() as u64,
                })??,
            None => try_join_all(calls).await?,
        };

        let mut cells = Vec::with_capacity(height * width);
        for part in parts {
            cells.extend_from_slice(&part);
        }
        Grid::from_bytes(height, width, cells)
    }

    /// Record how the run ended, reset to Idle and release waiters
    fn finish(
        &self,
        run_id: Uuid,
        result: Result<()>,
        finished_tx: watch::Sender<Option<Turn>>,
    ) -> Result<RunOutcome> {
        let (grid, turn, quit) = {
            let mut state = self.state.lock();
            let quit = self.quit.swap(false, Ordering::SeqCst);
            let grid = std::mem::take(&mut state.grid);
            let turn = state.turn;

            let ended = ended_lifecycle(result.is_err(), quit, turn, state.target_turns);
            state.last_run = Some(RunSummary {
                run_id,
                ended,
                final_turn: turn,
                target_turns: state.target_turns,
                finished_at: Utc::now(),
                error: result.as_ref().err().map(|e| e.to_string()),
            });
            state.reset();
            (grid, turn, quit)
        };

        let _ = finished_tx.send(Some(turn));
        self.lifecycle_changed.notify_waiters();

        match result {
            Ok(()) => {
                info!(run_id = %run_id, final_turn = turn, quit = quit, "Run finished");
                let alive = grid.alive_cells();
                Ok(RunOutcome { grid, turn, alive })
            }
            Err(e) => {
                error!(run_id = %run_id, final_turn = turn, error = %e, "Run failed");
                Err(e)
            }
        }
    }

    /// Hold the loop before its next turn; returns the turn at the pause
    pub fn pause(&self) -> Result<Turn> {
        let mut state = self.state.lock();
        let current = state.lifecycle;
        match current {
            Lifecycle::Running => {
                state.lifecycle = Lifecycle::Paused;
                info!(turn = state.turn, "Run paused");
                Ok(state.turn)
            }
            other => Err(Error::InvalidLifecycle {
                operation: "pause".to_string(),
                state: other.to_string(),
            }),
        }
    }

    /// Release a paused loop; returns the current turn
    pub fn resume(&self) -> Result<Turn> {
        let turn = {
            let mut state = self.state.lock();
            let current = state.lifecycle;
            match current {
                Lifecycle::Paused => {
                    state.lifecycle = Lifecycle::Running;
                    state.turn
                }
                other => {
                    return Err(Error::InvalidLifecycle {
                        operation: "resume".to_string(),
                        state: other.to_string(),
                    })
                }
            }
        };

        self.lifecycle_changed.notify_waiters();
        info!(turn = turn, "Run resumed");
        Ok(turn)
    }

    /// Stop the active run early and wait for the loop to wind down
    ///
    /// Returns the last committed turn. The engine is Idle afterwards.
    pub async fn quit(&self) -> Result<Turn> {
        let mut finished = {
            let state = self.state.lock();
            match state.lifecycle {
                Lifecycle::Running | Lifecycle::Paused => {}
                other => {
                    return Err(Error::InvalidLifecycle {
                        operation: "quit".to_string(),
                        state: other.to_string(),
                    })
                }
            }
            self.quit.store(true, Ordering::SeqCst);
            state.finished.clone().ok_or_else(|| Error::Internal {
                message: "active run has no completion channel".to_string(),
            })?
        };

        info!("Quit requested");
        self.lifecycle_changed.notify_waiters();

        let turn = *finished
            .wait_for(|turn| turn.is_some())
            .await
            .map_err(|_| Error::ChannelClosed {
                channel: "run completion".to_string(),
            })?;

        Ok(turn.unwrap_or_default())
    }

    /// Completed turns and live cells of the current grid
    pub fn alive_cells_count(&self) -> (Turn, usize) {
        let state = self.state.lock();
        (state.turn, state.grid.alive_count())
    }

    /// Consistent copy of the current grid and the turn it belongs to
    pub fn snapshot(&self) -> (Grid, Turn) {
        let state = self.state.lock();
        (state.grid.clone(), state.turn)
    }

    pub fn status(&self) -> RunStatus {
        let state = self.state.lock();
        RunStatus {
            state: state.lifecycle,
            run_id: state.run_id,
            turn: state.turn,
            target_turns: state.target_turns,
            height: state.grid.height(),
            width: state.grid.width(),
            alive_cells: state.grid.alive_count(),
            started_at: state.started_at,
            pool_size: self.executor.pool_size(),
            last_run: state.last_run.clone(),
        }
    }

    /// Quit any active run, then shut down every worker in the pool
    pub async fn close_all(&self) -> Result<()> {
        match self.quit().await {
            Ok(turn) => info!(turn = turn, "Active run quit before closing pool"),
            Err(Error::InvalidLifecycle { .. }) => {}
            Err(e) => warn!(error = %e, "Failed to quit active run"),
        }
        self.executor.shutdown().await
    }
}

/// How a finished run is recorded
///
/// Reaching the target wins over a quit that arrived after the last turn.
fn ended_lifecycle(failed: bool, quit: bool, turn: Turn, target: Turn) -> Lifecycle {
    if failed {
        Lifecycle::Failed
    } else if quit && turn < target {
        Lifecycle::Quit
    } else {
        Lifecycle::Completed
    }
}
