//! Compute worker for the distributed Game of Life runtime
//!
//! A worker owns one partition of the grid per turn. It is stateless across
//! calls: every ComputeBand request carries the whole current grid plus the
//! row range to advance, and the response carries only that range's next
//! state. The band is split across threads inside the worker.
//!
//! # Example
//!
//! ```ignore
//! use compute_worker::{WorkerServer, WorkerService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     WorkerServer::new(WorkerService::new())
//!         .run_on("0.0.0.0:8050".parse()?)
//!         .await
//! }
//! ```

pub mod server;
pub mod service;

// Re-export generated protobuf types
pub mod proto {
    tonic::include_proto!("worker");
}

// Re-export main types
pub use server::{ServerConfig, WorkerServer};
pub use service::{error_to_status, WorkerService};

// Re-export proto service trait for convenience
pub use proto::worker_client::WorkerClient;
pub use proto::worker_server::WorkerServer as WorkerServiceServer;
