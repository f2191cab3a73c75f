use thiserror::Error;

/// Result type for blocksync operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in blocksync operations
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Block not found: {id}")]
    BlockNotFound { id: String },

    #[error("Rank bounds out of order: {prev:?} is not strictly below {next:?}")]
    RankBounds { prev: String, next: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[cfg(feature = "persistence")]
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
