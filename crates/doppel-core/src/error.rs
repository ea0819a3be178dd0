use thiserror::Error;

/// Top-level error type for Doppel.
#[derive(Debug, Error)]
pub enum DoppelError {
    /// Error from the messaging transport (send or lookup failure).
    #[error("transport error: {0}")]
    Transport(String),

    /// Error from the generative backend (network, status, payload).
    #[error("backend error: {0}")]
    Backend(String),

    /// Failure to persist the tracked-identity record.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
