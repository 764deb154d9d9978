//! Compute worker binary entry point
//!
//! Usage: `compute-worker [bind-addr]`, e.g. `compute-worker 0.0.0.0:8051`.

use std::net::SocketAddr;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use compute_worker::{ServerConfig, WorkerServer, WorkerService};
use life_core::LifeConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "compute_worker=info,life_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = LifeConfig::load()?;
    let mut server_config = ServerConfig::from_runtime(&config.worker, &config.network)?;

    // Bind address from args overrides the config file
    if let Some(arg) = std::env::args().nth(1) {
        let addr: SocketAddr = arg
            .parse()
            .map_err(|e| format!("invalid bind address {:?}: {}", arg, e))?;
        server_config.addr = addr;
    }

    WorkerServer::with_config(WorkerService::new(), server_config)
        .run()
        .await
}
