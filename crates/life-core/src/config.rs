//! Runtime configuration types

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Error, Result};

/// Environment variable naming a JSON config file
pub const CONFIG_ENV: &str = "LIFE_CONFIG";

/// Main runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LifeConfig {
    /// Coordinator settings
    pub coordinator: CoordinatorConfig,

    /// Compute worker settings
    pub worker: WorkerConfig,

    /// Run controller settings
    pub controller: ControllerConfig,

    /// Network settings
    pub network: NetworkConfig,
}

impl LifeConfig {
    /// Load from the file named by `LIFE_CONFIG`, or defaults when unset
    pub fn load() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Load from a JSON file; missing fields fall back to defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::InvalidConfig {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Reject settings the runtime cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.coordinator.worker_addresses.is_empty() {
            return Err(Error::InvalidConfig {
                message: "coordinator.worker_addresses must not be empty".to_string(),
            });
        }
        if self.controller.threads == 0 {
            return Err(Error::InvalidConfig {
                message: "controller.threads must be at least 1".to_string(),
            });
        }
        if self.controller.image_width == 0 || self.controller.image_height == 0 {
            return Err(Error::InvalidConfig {
                message: "controller image dimensions must be non-zero".to_string(),
            });
        }
        if self.controller.poll_interval.is_zero() {
            return Err(Error::InvalidConfig {
                message: "controller.poll_interval must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Address to bind the coordinator server
    pub bind_address: String,

    /// Port for gRPC server
    pub port: u16,

    /// Fixed worker pool, one partition per address, in row order
    pub worker_addresses: Vec<String>,

    /// Upper bound on a single turn; `None` waits forever
    #[serde(with = "optional_millis")]
    pub turn_timeout: Option<Duration>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8030,
            worker_addresses: (0..4).map(|i| format!("127.0.0.1:{}", 8050 + i)).collect(),
            turn_timeout: None,
        }
    }
}

/// Compute worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Address to bind the worker server
    pub bind_address: String,

    /// Port for gRPC server
    pub port: u16,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8050,
        }
    }
}

/// Run controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Coordinator address to connect to
    pub coordinator_address: String,

    /// Number of turns to run
    pub turns: u64,

    /// Threads each worker splits its band across
    pub threads: usize,

    pub image_width: usize,

    pub image_height: usize,

    /// Directory holding `<width>x<height>.pgm` inputs
    pub image_dir: PathBuf,

    /// Directory receiving `<width>x<height>x<turn>.pgm` outputs
    pub output_dir: PathBuf,

    /// Alive-cell polling period
    #[serde(with = "millis")]
    pub poll_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            coordinator_address: "http://127.0.0.1:8030".to_string(),
            turns: 100,
            threads: 8,
            image_width: 512,
            image_height: 512,
            image_dir: PathBuf::from("images"),
            output_dir: PathBuf::from("out"),
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Connection timeout
    #[serde(with = "millis")]
    pub connect_timeout: Duration,

    /// TCP keep-alive interval
    #[serde(with = "millis")]
    pub tcp_keepalive: Duration,

    /// Maximum message size in bytes
    pub max_message_size: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            tcp_keepalive: Duration::from_secs(60),
            max_message_size: 256 * 1024 * 1024, // 256MB
        }
    }
}

/// Durations are written as integer milliseconds
mod millis {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

mod optional_millis {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}
