//! gRPC service implementation for coordinator
//!
//! Implements all methods defined in coordinator.proto on top of the
//! [`TurnEngine`].

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tonic::{Request, Response, Status};
use tracing::{debug, error, info};

use compute_worker::error_to_status;
use life_core::{Error, Grid, ShutdownSignal};

use crate::engine::{RunStatus, TurnEngine};
use crate::executor::BandExecutor;
use crate::proto::{
    self, coordinator_server::Coordinator, AliveCellsCountRequest, AliveCellsCountResponse,
    PauseRequest, QuitRequest, ResumeRequest, ShutdownRequest, ShutdownResponse, SnapshotRequest,
    SnapshotResponse, StartRunRequest, StartRunResponse, TurnResponse,
};

/// Coordinator gRPC service
#[derive(Clone)]
pub struct CoordinatorService {
    /// Owner of the authoritative grid and the turn loop
    engine: Arc<TurnEngine>,

    /// Fired by the Shutdown RPC once every worker has been told to stop
    shutdown: ShutdownSignal,

    /// Server start time for uptime tracking
    start_time: Instant,
}

impl CoordinatorService {
    pub fn new(executor: Arc<dyn BandExecutor>) -> Self {
        Self::with_engine(Arc::new(TurnEngine::new(executor)))
    }

    pub fn with_engine(engine: Arc<TurnEngine>) -> Self {
        Self {
            engine,
            shutdown: ShutdownSignal::new(),
            start_time: Instant::now(),
        }
    }

    pub fn engine(&self) -> &Arc<TurnEngine> {
        &self.engine
    }

    /// Signal the server loop waits on
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    // ========== HTTP API Helper Methods ==========

    /// Get server uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn run_status(&self) -> RunStatus {
        self.engine.status()
    }

    /// Worker addresses by slot
    pub fn worker_addresses(&self) -> Vec<String> {
        let executor = self.engine.executor();
        (0..executor.pool_size())
            .map(|slot| executor.slot_address(slot))
            .collect()
    }

    fn grid_from_request(req: &StartRunRequest) -> Result<Grid, Error> {
        Grid::from_bytes(req.height as usize, req.width as usize, req.grid.to_vec())
    }
}

#[tonic::async_trait]
impl Coordinator for CoordinatorService {
    /// Run the requested number of turns; replies when the run ends
    async fn start_run(
        &self,
        request: Request<StartRunRequest>,
    ) -> Result<Response<StartRunResponse>, Status> {
        let req = request.into_inner();
        info!(
            turns = req.turns,
            height = req.height,
            width = req.width,
            threads = req.thread_count,
            "StartRun request"
        );

        let grid = Self::grid_from_request(&req).map_err(error_to_status)?;
        let outcome = self
            .engine
            .start_run(grid, req.turns, req.thread_count as usize)
            .await
            .map_err(|e| {
                error!(error = %e, "Run did not complete");
                error_to_status(e)
            })?;

        let alive_cells = outcome
            .alive
            .iter()
            .map(|cell| proto::Cell {
                x: cell.x as u32,
                y: cell.y as u32,
            })
            .collect();

        Ok(Response::new(StartRunResponse {
            final_grid: Bytes::from(outcome.grid.into_bytes()),
            final_turn: outcome.turn,
            alive_cells,
        }))
    }

    async fn alive_cells_count(
        &self,
        _request: Request<AliveCellsCountRequest>,
    ) -> Result<Response<AliveCellsCountResponse>, Status> {
        let (turn, count) = self.engine.alive_cells_count();
        debug!(turn = turn, alive = count, "AliveCellsCount");

        Ok(Response::new(AliveCellsCountResponse {
            completed_turns: turn,
            cells_count: count as u64,
        }))
    }

    async fn snapshot(
        &self,
        _request: Request<SnapshotRequest>,
    ) -> Result<Response<SnapshotResponse>, Status> {
        let (grid, turn) = self.engine.snapshot();
        debug!(turn = turn, "Snapshot");

        Ok(Response::new(SnapshotResponse {
            turn,
            height: grid.height() as u32,
            width: grid.width() as u32,
            grid: Bytes::from(grid.into_bytes()),
        }))
    }

    async fn pause(&self, _request: Request<PauseRequest>) -> Result<Response<TurnResponse>, Status> {
        let turn = self.engine.pause().map_err(error_to_status)?;
        Ok(Response::new(TurnResponse { turn }))
    }

    async fn resume(
        &self,
        _request: Request<ResumeRequest>,
    ) -> Result<Response<TurnResponse>, Status> {
        let turn = self.engine.resume().map_err(error_to_status)?;
        Ok(Response::new(TurnResponse { turn }))
    }

    async fn quit(&self, _request: Request<QuitRequest>) -> Result<Response<TurnResponse>, Status> {
        let turn = self.engine.quit().await.map_err(error_to_status)?;
        Ok(Response::new(TurnResponse { turn }))
    }

    /// Quit any run, stop every worker, then stop this server
    async fn shutdown(
        &self,
        _request: Request<ShutdownRequest>,
    ) -> Result<Response<ShutdownResponse>, Status> {
        info!(uptime_secs = self.uptime_secs(), "Shutdown requested");

        let result = self.engine.close_all().await;
        self.shutdown.trigger();

        match result {
            Ok(()) => Ok(Response::new(ShutdownResponse { acknowledged: true })),
            Err(e) => {
                error!(error = %e, "Not every worker acknowledged shutdown");
                Err(error_to_status(e))
            }
        }
    }
}
