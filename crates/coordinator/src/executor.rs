//! Fan-out target for a turn's partitions
//!
//! The turn engine only knows that a pool has a fixed number of slots and
//! that each slot can advance one band. [`RemoteWorkerPool`](crate::pool::RemoteWorkerPool)
//! sends bands to compute workers over gRPC; [`LocalWorkerPool`] runs the
//! kernel in-process.

use std::sync::Arc;

use async_trait::async_trait;

use life_core::{kernel, Band, Error, Grid, Result};

/// A fixed-size pool of band executors
#[async_trait]
pub trait BandExecutor: Send + Sync + 'static {
    /// Number of slots; the grid is split into exactly this many partitions
    fn pool_size(&self) -> usize;

    /// Human-readable address of a slot, for logs and errors
    fn slot_address(&self, slot: usize) -> String;

    /// Advance `band` of `grid` by one turn on `slot`
    ///
    /// Returns `band.cell_count()` bytes in row-major order.
    async fn compute_band(
        &self,
        slot: usize,
        grid: Arc<Grid>,
        band: Band,
        thread_count: usize,
    ) -> Result<Vec<u8>>;

    /// Ask every slot to stop accepting work
    async fn shutdown(&self) -> Result<()>;
}

/// In-process pool that runs the kernel on blocking threads
#[derive(Debug, Clone)]
pub struct LocalWorkerPool {
    slots: usize,
}

impl LocalWorkerPool {
    pub fn new(slots: usize) -> Self {
        Self { slots }
    }
}

#[async_trait]
impl BandExecutor for LocalWorkerPool {
    fn pool_size(&self) -> usize {
        self.slots
    }

    fn slot_address(&self, slot: usize) -> String {
        format!("local-{}", slot)
    }

    async fn compute_band(
        &self,
        slot: usize,
        grid: Arc<Grid>,
        band: Band,
        thread_count: usize,
    ) -> Result<Vec<u8>> {
        tokio::task::spawn_blocking(move || kernel::next_band(&grid, &band, thread_count))
            .await
            .map_err(|e| Error::WorkerFailed {
                slot,
                address: self.slot_address(slot),
                message: e.to_string(),
            })?
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
