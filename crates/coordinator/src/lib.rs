//! Coordinator gRPC server for distributed Game of Life runs
//!
//! This crate owns the authoritative world state and drives it forward:
//! - **Turn engine**: the run lifecycle and turn loop ([`TurnEngine`])
//! - **Worker pool**: fan-out of row bands to compute workers ([`BandExecutor`])
//! - **Control surface**: StartRun, AliveCellsCount, Snapshot, Pause, Resume,
//!   Quit and Shutdown over gRPC
//! - **Status API**: read-only HTTP view of the current run
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use coordinator::{CoordinatorServer, CoordinatorService, RemoteWorkerPool};
//! use life_core::config::NetworkConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let addresses = vec!["127.0.0.1:8050".to_string()];
//!     let pool = RemoteWorkerPool::connect(&addresses, &NetworkConfig::default()).await?;
//!     let service = CoordinatorService::new(Arc::new(pool));
//!     CoordinatorServer::new(service).run().await?;
//!     Ok(())
//! }
//! ```

pub mod engine;
pub mod executor;
pub mod http_api;
pub mod pool;
pub mod server;
pub mod service;

// Re-export generated protobuf types
pub mod proto {
    tonic::include_proto!("coordinator");
}

// Re-export main types
pub use engine::{Lifecycle, RunOutcome, RunStatus, TurnEngine};
pub use executor::{BandExecutor, LocalWorkerPool};
pub use pool::RemoteWorkerPool;
pub use server::{CoordinatorServer, ServerConfig};
pub use service::CoordinatorService;

// Re-export proto service trait for convenience
pub use proto::coordinator_client::CoordinatorClient;
pub use proto::coordinator_server::CoordinatorServer as CoordinatorServiceServer;
