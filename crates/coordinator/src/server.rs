//! gRPC server implementation with graceful shutdown
//!
//! Provides the Tonic server setup with configurable bind address and
//! graceful shutdown on Ctrl+C, SIGTERM or the Shutdown RPC.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tonic::transport::Server;
use tracing::{error, info};

use life_core::config::{CoordinatorConfig, NetworkConfig};
use life_core::ShutdownSignal;

use crate::proto::coordinator_server::CoordinatorServer as CoordinatorGrpcServer;
use crate::service::CoordinatorService;

const HTTP_PORT_OFFSET: u16 = 1000;

/// Service handle type for sharing between gRPC and HTTP
pub type CoordinatorServiceHandle = Arc<CoordinatorService>;

/// Coordinator server configuration
///
/// No request timeout is applied: StartRun stays open for the whole run.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub addr: SocketAddr,

    /// TCP keepalive interval
    pub tcp_keepalive: Option<Duration>,

    /// Maximum encoded/decoded message size
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8030)),
            tcp_keepalive: Some(Duration::from_secs(60)),
            max_message_size: 256 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Build from the shared runtime configuration sections
    pub fn from_runtime(
        coordinator: &CoordinatorConfig,
        network: &NetworkConfig,
    ) -> life_core::Result<Self> {
        let addr = format!("{}:{}", coordinator.bind_address, coordinator.port)
            .parse()
            .map_err(|e| life_core::Error::InvalidConfig {
                message: format!("invalid coordinator bind address: {}", e),
            })?;

        Ok(Self {
            addr,
            tcp_keepalive: Some(network.tcp_keepalive),
            max_message_size: network.max_message_size,
        })
    }

    /// Address of the HTTP status API (gRPC port + 1000)
    pub fn http_addr(&self) -> life_core::Result<SocketAddr> {
        let port = self
            .addr
            .port()
            .checked_add(HTTP_PORT_OFFSET)
            .ok_or_else(|| life_core::Error::InvalidConfig {
                message: format!(
                    "gRPC port {} leaves no room for the HTTP API at +{}",
                    self.addr.port(),
                    HTTP_PORT_OFFSET
                ),
            })?;
        Ok(SocketAddr::new(self.addr.ip(), port))
    }
}

/// Coordinator gRPC server
pub struct CoordinatorServer {
    config: ServerConfig,
    service: CoordinatorService,
}

impl CoordinatorServer {
    /// Create a new coordinator server
    pub fn new(service: CoordinatorService) -> Self {
        Self {
            config: ServerConfig::default(),
            service,
        }
    }

    /// Create with custom configuration
    pub fn with_config(service: CoordinatorService, config: ServerConfig) -> Self {
        Self { config, service }
    }

    /// Run the server until a shutdown signal or Shutdown RPC
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = self.config.addr;
        let shutdown = self.service.shutdown_signal();

        info!(address = %addr, "Starting coordinator server");

        let grpc_service = CoordinatorGrpcServer::new(self.service)
            .max_decoding_message_size(self.config.max_message_size)
            .max_encoding_message_size(self.config.max_message_size);

        let server = Server::builder()
            .tcp_keepalive(self.config.tcp_keepalive)
            .add_service(grpc_service)
            .serve_with_shutdown(addr, shutdown_signal(shutdown));

        info!(address = %addr, "Coordinator server listening");

        server.await.map_err(|e| {
            error!(error = %e, "Server error");
            Box::new(e) as Box<dyn std::error::Error + Send + Sync>
        })?;

        info!("Coordinator server shutdown complete");
        Ok(())
    }

    /// Run the server on a specific address
    pub async fn run_on(
        self,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut server = self;
        server.config.addr = addr;
        server.run().await
    }
}

/// Wait for Ctrl+C, SIGTERM or a Shutdown RPC
async fn shutdown_signal(requested: ShutdownSignal) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
        _ = requested.wait() => {
            info!("Close-all requested, stopping coordinator");
        }
    }
}
