//! gRPC-backed worker pool
//!
//! One tonic client per fixed worker address. Connections are made eagerly
//! so an unreachable worker is reported at startup rather than mid-run.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, error, info};

use compute_worker::proto::{ComputeBandRequest, ShutdownRequest};
use compute_worker::WorkerClient;
use life_core::config::NetworkConfig;
use life_core::{Band, Error, Grid, Result};

use crate::executor::BandExecutor;

struct RemoteWorker {
    address: String,
    client: WorkerClient<Channel>,
}

/// Fixed pool of remote compute workers, indexed by slot
pub struct RemoteWorkerPool {
    workers: Vec<RemoteWorker>,
}

impl RemoteWorkerPool {
    /// Connect to every address; the first failure aborts
    pub async fn connect(addresses: &[String], network: &NetworkConfig) -> Result<Self> {
        if addresses.is_empty() {
            return Err(Error::InvalidConfig {
                message: "worker pool needs at least one address".to_string(),
            });
        }

        let mut workers = Vec::with_capacity(addresses.len());
        for (slot, address) in addresses.iter().enumerate() {
            let uri = if address.contains("://") {
                address.clone()
            } else {
                format!("http://{}", address)
            };

            let endpoint = Endpoint::from_shared(uri)
                .map_err(|e| Error::InvalidConfig {
                    message: format!("invalid worker address {}: {}", address, e),
                })?
                .connect_timeout(network.connect_timeout)
                .tcp_keepalive(Some(network.tcp_keepalive));

            let channel = endpoint.connect().await.map_err(|e| {
                error!(slot = slot, address = %address, error = %e, "Worker unreachable");
                Error::WorkerUnavailable {
                    address: address.clone(),
                    message: e.to_string(),
                }
            })?;

            let client = WorkerClient::new(channel)
                .max_decoding_message_size(network.max_message_size)
                .max_encoding_message_size(network.max_message_size);

            info!(slot = slot, address = %address, "Connected to worker");
            workers.push(RemoteWorker {
                address: address.clone(),
                client,
            });
        }

        Ok(Self { workers })
    }

    fn worker(&self, slot: usize) -> Result<&RemoteWorker> {
        self.workers.get(slot).ok_or_else(|| Error::Internal {
            message: format!("no worker in slot {} (pool size {})", slot, self.workers.len()),
        })
    }
}

#[async_trait]
impl BandExecutor for RemoteWorkerPool {
    fn pool_size(&self) -> usize {
        self.workers.len()
    }

    fn slot_address(&self, slot: usize) -> String {
        self.workers
            .get(slot)
            .map(|w| w.address.clone())
            .unwrap_or_default()
    }

    async fn compute_band(
        &self,
        slot: usize,
        grid: Arc<Grid>,
        band: Band,
        thread_count: usize,
    ) -> Result<Vec<u8>> {
        let worker = self.worker(slot)?;
        // Clients share one HTTP/2 channel; cloning is cheap
        let mut client = worker.client.clone();

        let request = ComputeBandRequest {
            full_grid: Bytes::copy_from_slice(grid.as_bytes()),
            full_height: grid.height() as u32,
            full_width: grid.width() as u32,
            start_row: band.start_row as u32,
            end_row: band.end_row as u32,
            start_col: band.start_col as u32,
            end_col: band.end_col as u32,
            thread_count: thread_count as u32,
        };

        let response = client.compute_band(request).await.map_err(|status| {
            error!(
                slot = slot,
                address = %worker.address,
                code = ?status.code(),
                "ComputeBand failed"
            );
            Error::WorkerFailed {
                slot,
                address: worker.address.clone(),
                message: status.message().to_string(),
            }
        })?;

        let cells = response.into_inner().band;
        if cells.len() != band.cell_count() {
            return Err(Error::WorkerFailed {
                slot,
                address: worker.address.clone(),
                message: format!(
                    "returned {} bytes for a {}-cell band",
                    cells.len(),
                    band.cell_count()
                ),
            });
        }

        debug!(slot = slot, rows = band.height(), "Band received");
        Ok(cells.to_vec())
    }

    async fn shutdown(&self) -> Result<()> {
        let mut first_error = None;

        for (slot, worker) in self.workers.iter().enumerate() {
            let mut client = worker.client.clone();
            match client.shutdown(ShutdownRequest {}).await {
                Ok(_) => info!(slot = slot, address = %worker.address, "Worker shut down"),
                Err(status) => {
                    error!(
                        slot = slot,
                        address = %worker.address,
                        error = %status,
                        "Worker shutdown failed"
                    );
                    first_error.get_or_insert(Error::WorkerFailed {
                        slot,
                        address: worker.address.clone(),
                        message: status.message().to_string(),
                    });
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
