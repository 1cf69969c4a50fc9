//! Error types for filedex

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid path: {0}")]
    Path(String),

    #[error("Storage not initialized")]
    NotInitialized,

    #[error("Scan cancelled")]
    Cancelled,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("State error: {0}")]
    State(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl IndexError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, IndexError::Cancelled)
    }

    /// Message safe to hand to the presentation layer.
    ///
    /// Engine internals (SQL text, OS error codes) never leave the process;
    /// they are logged where they happen and replaced by a generic phrase here.
    pub fn sanitized(&self) -> String {
        match self {
            IndexError::Configuration(msg) => format!("Configuration error: {msg}"),
            IndexError::Path(msg) => format!("Invalid path: {msg}"),
            IndexError::NotInitialized => "Storage is not initialized".to_string(),
            IndexError::Cancelled => "Scan cancelled".to_string(),
            IndexError::Database(_) => "Database operation failed".to_string(),
            IndexError::Io(_) => "File system operation failed".to_string(),
            IndexError::Serialization(_) => "Stored data could not be decoded".to_string(),
            IndexError::State(msg) => msg.clone(),
            IndexError::Other(_) => "Unexpected internal error".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
