//! Coordinator binary entry point
//!
//! Connects to the configured compute workers, then serves the gRPC
//! coordinator and its HTTP status API.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coordinator::{
    http_api, CoordinatorServer, CoordinatorService, RemoteWorkerPool, ServerConfig, TurnEngine,
};
use life_core::LifeConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coordinator=info,life_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = LifeConfig::load()?;
    let mut server_config = ServerConfig::from_runtime(&config.coordinator, &config.network)?;

    // Optional gRPC address override from args
    if let Some(arg) = std::env::args().nth(1) {
        server_config.addr = arg.parse::<SocketAddr>()?;
    }
    let grpc_addr = server_config.addr;
    let http_addr = server_config.http_addr()?;

    // An unreachable worker is fatal: no retry
    let pool = match RemoteWorkerPool::connect(
        &config.coordinator.worker_addresses,
        &config.network,
    )
    .await
    {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "Could not connect to the worker pool");
            return Err(e.into());
        }
    };

    let engine = Arc::new(TurnEngine::with_turn_timeout(
        Arc::new(pool),
        config.coordinator.turn_timeout,
    ));
    let service = CoordinatorService::with_engine(engine);

    tracing::info!("Starting coordinator gRPC on {}", grpc_addr);
    tracing::info!("Starting coordinator HTTP API on {}", http_addr);

    let http_router = http_api::create_router(Arc::new(service.clone()));
    let http_handle = tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(http_addr).await?;
        tracing::info!("HTTP API listening on {}", http_addr);
        axum::serve(listener, http_router).await
    });

    let server = CoordinatorServer::with_config(service, server_config);
    let grpc_handle = tokio::spawn(server.run());

    // Wait for either server to finish
    tokio::select! {
        result = http_handle => {
            tracing::info!("HTTP server stopped");
            result??;
        }
        result = grpc_handle => {
            tracing::info!("gRPC server stopped");
            result??;
        }
    }

    Ok(())
}
