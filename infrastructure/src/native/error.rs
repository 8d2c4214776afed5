//! Error types for the model-runner binding

use thiserror::Error;

/// Result type alias for runner operations
pub type Result<T> = std::result::Result<T, NativeError>;

/// Errors that can occur when communicating with the model runner
#[derive(Error, Debug)]
pub enum NativeError {
    #[error("failed to spawn model runner: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("JSON-RPC error (code {code}): {message}")]
    Rpc { code: i64, message: String },

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("model runner exited, transport closed")]
    TransportClosed,

    #[error("request timeout")]
    Timeout,
}
