//! gRPC server for the compute worker with graceful shutdown
//!
//! The server stops on Ctrl+C, SIGTERM, or a Shutdown RPC. In every case
//! tonic drains in-flight calls before `run` returns.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::signal;
use tonic::transport::Server;
use tracing::{error, info};

use life_core::config::{NetworkConfig, WorkerConfig};
use life_core::ShutdownSignal;

use crate::proto::worker_server::WorkerServer as WorkerGrpcServer;
use crate::service::WorkerService;

/// Worker server configuration
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
            addr: SocketAddr::from(([0, 0, 0, 0], 8050)),
            tcp_keepalive: Some(Duration::from_secs(60)),
            max_message_size: 256 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Build from the shared runtime configuration sections
    pub fn from_runtime(worker: &WorkerConfig, network: &NetworkConfig) -> life_core::Result<Self> {
        let addr = format!("{}:{}", worker.bind_address, worker.port)
            .parse()
            .map_err(|e| life_core::Error::InvalidConfig {
                message: format!("invalid worker bind address: {}", e),
            })?;

        Ok(Self {
            addr,
            tcp_keepalive: Some(network.tcp_keepalive),
            max_message_size: network.max_message_size,
        })
    }
}

/// Compute worker gRPC server
pub struct WorkerServer {
    config: ServerConfig,
    service: WorkerService,
}

impl WorkerServer {
    /// Create a new worker server
    pub fn new(service: WorkerService) -> Self {
        Self {
            config: ServerConfig::default(),
            service,
        }
    }

    /// Create with custom configuration
    pub fn with_config(service: WorkerService, config: ServerConfig) -> Self {
        Self { config, service }
    }

    /// Run the server until a shutdown signal or Shutdown RPC
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = self.config.addr;
        let shutdown = self.service.shutdown_signal();

        info!(address = %addr, "Starting compute worker");

        let grpc_service = WorkerGrpcServer::new(self.service)
            .max_decoding_message_size(self.config.max_message_size)
            .max_encoding_message_size(self.config.max_message_size);

        let server = Server::builder()
            .tcp_keepalive(self.config.tcp_keepalive)
            .add_service(grpc_service)
            .serve_with_shutdown(addr, shutdown_signal(shutdown));

        info!(address = %addr, "Compute worker listening");

        server.await.map_err(|e| {
            error!(error = %e, "Server error");
            Box::new(e) as Box<dyn std::error::Error + Send + Sync>
        })?;

        info!("Compute worker shutdown complete");
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
            info!("Shutdown RPC received, draining in-flight work");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{worker_client::WorkerClient, ShutdownRequest};

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.addr.port(), 8050);
        assert!(config.tcp_keepalive.is_some());
    }

    #[test]
    fn test_config_from_runtime() {
        let worker = WorkerConfig {
            bind_address: "127.0.0.1".to_string(),
            port: 9051,
        };
        let config = ServerConfig::from_runtime(&worker, &NetworkConfig::default()).unwrap();
        assert_eq!(config.addr, "127.0.0.1:9051".parse().unwrap());
    }

    #[tokio::test]
    async fn test_shutdown_rpc_stops_server() {
        let port = portpicker::pick_unused_port().expect("No ports free");
        let addr: SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();

        let handle = tokio::spawn(WorkerServer::new(WorkerService::new()).run_on(addr));
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut client = WorkerClient::connect(format!("http://{}", addr)).await.unwrap();
        let ack = client.shutdown(ShutdownRequest {}).await.unwrap().into_inner();
        assert!(ack.acknowledged);
        drop(client);

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
    }
}
