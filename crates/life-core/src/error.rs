//! Error types for the distributed life runtime

use thiserror::Error;

/// Result type alias using the runtime Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the distributed life runtime
#[derive(Error, Debug)]
pub enum Error {
    // Grid and request errors
    #[error("Invalid grid: {message}")]
    InvalidGrid { message: String },

    #[error("Invalid band rows {start_row}..{end_row}, cols {start_col}..{end_col} for {height}x{width} grid")]
    InvalidBand {
        start_row: usize,
        end_row: usize,
        start_col: usize,
        end_col: usize,
        height: usize,
        width: usize,
    },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    // Lifecycle errors
    #[error("Cannot {operation} while coordinator is {state}")]
    InvalidLifecycle { operation: String, state: String },

    // Worker errors
    #[error("Worker unavailable: {address} - {message}")]
    WorkerUnavailable { address: String, message: String },

    #[error("Worker {slot} ({address}) failed: {message}")]
    WorkerFailed {
        slot: usize,
        address: String,
        message: String,
    },

    #[error("Coordinator unavailable: {address} - {message}")]
    CoordinatorUnavailable { address: String, message: String },

    #[error("Turn {turn} timed out after {timeout_ms}ms")]
    TurnTimeout { turn: u64, timeout_ms: u64 },

    // Configuration errors
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // gRPC errors
    #[error("gRPC error: {0}")]
    Grpc(String),

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    // Channel errors
    #[error("Channel closed: {channel}")]
    ChannelClosed { channel: String },
}

impl Error {
    /// Returns true if retrying the same call could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::InvalidLifecycle { .. } | Error::TurnTimeout { .. } | Error::Grpc(_)
        )
    }

    /// Returns true if this error should bring the process down
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::WorkerUnavailable { .. }
                | Error::CoordinatorUnavailable { .. }
                | Error::InvalidConfig { .. }
                | Error::Internal { .. }
        )
    }

    /// Returns true if the caller sent a malformed request
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Error::InvalidGrid { .. } | Error::InvalidBand { .. } | Error::InvalidArgument { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
