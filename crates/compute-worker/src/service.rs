//! gRPC service implementation for the compute worker
//!
//! Implements all methods defined in worker.proto

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tonic::{Request, Response, Status};
use tracing::{debug, info, warn};

use life_core::{kernel, Band, Error, Grid, ShutdownSignal};

use crate::proto::{
    worker_server::Worker, ComputeBandRequest, ComputeBandResponse, ShutdownRequest,
    ShutdownResponse,
};

/// Map a runtime error onto the closest gRPC status
pub fn error_to_status(err: Error) -> Status {
    match &err {
        Error::InvalidGrid { .. } | Error::InvalidBand { .. } | Error::InvalidArgument { .. } => {
            Status::invalid_argument(err.to_string())
        }
        Error::InvalidLifecycle { .. } => Status::failed_precondition(err.to_string()),
        Error::WorkerUnavailable { .. }
        | Error::WorkerFailed { .. }
        | Error::CoordinatorUnavailable { .. } => Status::unavailable(err.to_string()),
        Error::TurnTimeout { .. } => Status::deadline_exceeded(err.to_string()),
        _ => Status::internal(err.to_string()),
    }
}

/// Compute worker gRPC service
///
/// Holds no grid state between calls; the only state is the shutdown latch
/// and a call counter for logging.
#[derive(Clone)]
pub struct WorkerService {
    /// Set once Shutdown has been called
    shutdown: ShutdownSignal,

    /// Completed ComputeBand calls
    completed: Arc<AtomicU64>,
}

impl Default for WorkerService {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerService {
    pub fn new() -> Self {
        Self::with_shutdown(ShutdownSignal::new())
    }

    /// Share an externally owned shutdown signal
    pub fn with_shutdown(shutdown: ShutdownSignal) -> Self {
        Self {
            shutdown,
            completed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Signal the server loop waits on
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn completed_calls(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Decode and validate a band request into the kernel's inputs
    fn parse_request(req: ComputeBandRequest) -> Result<(Grid, Band, usize), Error> {
        let height = req.full_height as usize;
        let width = req.full_width as usize;

        if height == 0 || width == 0 {
            return Err(Error::InvalidGrid {
                message: format!("grid dimensions must be non-zero, got {}x{}", width, height),
            });
        }
        if req.thread_count == 0 {
            return Err(Error::InvalidArgument {
                message: "thread_count must be at least 1".to_string(),
            });
        }

        let grid = Grid::from_bytes(height, width, req.full_grid.to_vec())?;
        let band = Band::new(
            req.start_row as usize,
            req.end_row as usize,
            req.start_col as usize,
            req.end_col as usize,
        );
        band.validate(height, width)?;

        Ok((grid, band, req.thread_count as usize))
    }
}

#[tonic::async_trait]
impl Worker for WorkerService {
    /// Advance one band of the grid by a single turn
    async fn compute_band(
        &self,
        request: Request<ComputeBandRequest>,
    ) -> Result<Response<ComputeBandResponse>, Status> {
        if self.shutdown.is_triggered() {
            return Err(Status::unavailable("Worker is shutting down"));
        }

        let (grid, band, threads) = Self::parse_request(request.into_inner()).map_err(|e| {
            warn!(error = %e, "Rejected band request");
            error_to_status(e)
        })?;

        debug!(
            start_row = band.start_row,
            end_row = band.end_row,
            threads = threads,
            "Computing band"
        );

        // Keep the CPU-bound kernel off the async executor
        let cells = tokio::task::spawn_blocking(move || kernel::next_band(&grid, &band, threads))
            .await
            .map_err(|e| Status::internal(format!("Band computation panicked: {}", e)))?
            .map_err(error_to_status)?;

        self.completed.fetch_add(1, Ordering::Relaxed);

        Ok(Response::new(ComputeBandResponse {
            band: Bytes::from(cells),
        }))
    }

    /// Stop accepting work once in-flight calls finish
    async fn shutdown(
        &self,
        _request: Request<ShutdownRequest>,
    ) -> Result<Response<ShutdownResponse>, Status> {
        info!(
            completed_calls = self.completed_calls(),
            "Worker shutdown requested"
        );
        self.shutdown.trigger();

        Ok(Response::new(ShutdownResponse { acknowledged: true }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_for(grid: &Grid, band: Band, threads: u32) -> ComputeBandRequest {
        ComputeBandRequest {
            full_grid: Bytes::copy_from_slice(grid.as_bytes()),
            full_height: grid.height() as u32,
            full_width: grid.width() as u32,
            start_row: band.start_row as u32,
            end_row: band.end_row as u32,
            start_col: band.start_col as u32,
            end_col: band.end_col as u32,
            thread_count: threads,
        }
    }

    #[tokio::test]
    async fn test_compute_band_matches_kernel() {
        let grid = Grid::from_rows(&[".....", "..#..", "..#..", "..#..", "....."]).unwrap();
        let band = Band::rows(1, 4, 5);
        let service = WorkerService::new();

        let response = service
            .compute_band(Request::new(request_for(&grid, band, 2)))
            .await
            .unwrap()
            .into_inner();

        let expected = kernel::next_band(&grid, &band, 1).unwrap();
        assert_eq!(response.band.as_ref(), expected.as_slice());
        assert_eq!(service.completed_calls(), 1);
    }

    #[tokio::test]
    async fn test_max_thread_count_is_served() {
        let mut grid = Grid::new(4, 4);
        grid.set(1, 1, true);
        let service = WorkerService::new();

        let response = service
            .compute_band(Request::new(request_for(&grid, Band::whole(&grid), u32::MAX)))
            .await
            .unwrap()
            .into_inner();

        let expected = kernel::next_band(&grid, &Band::whole(&grid), 1).unwrap();
        assert_eq!(response.band.as_ref(), expected.as_slice());
    }

    #[tokio::test]
    async fn test_rejects_malformed_requests() {
        let grid = Grid::new(4, 4);
        let service = WorkerService::new();

        let mut bad_len = request_for(&grid, Band::whole(&grid), 1);
        bad_len.full_grid = Bytes::from_static(&[0, 0, 0]);
        let status = service.compute_band(Request::new(bad_len)).await.unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);

        let out_of_range = request_for(&grid, Band::rows(2, 9, 4), 1);
        let status = service
            .compute_band(Request::new(out_of_range))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);

        let no_threads = request_for(&grid, Band::whole(&grid), 0);
        let status = service.compute_band(Request::new(no_threads)).await.unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_refuses_work_after_shutdown() {
        let grid = Grid::new(3, 3);
        let service = WorkerService::new();

        let ack = service
            .shutdown(Request::new(ShutdownRequest {}))
            .await
            .unwrap()
            .into_inner();
        assert!(ack.acknowledged);
        assert!(service.shutdown_signal().is_triggered());

        let status = service
            .compute_band(Request::new(request_for(&grid, Band::whole(&grid), 1)))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unavailable);
    }

    #[test]
    fn test_error_mapping() {
        let status = error_to_status(Error::InvalidLifecycle {
            operation: "pause".to_string(),
            state: "idle".to_string(),
        });
        assert_eq!(status.code(), tonic::Code::FailedPrecondition);

        let status = error_to_status(Error::TurnTimeout {
            turn: 1,
            timeout_ms: 10,
        });
        assert_eq!(status.code(), tonic::Code::DeadlineExceeded);
    }
}
