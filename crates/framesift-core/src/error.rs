//! Error types for framesift.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// An object query condition that can never be evaluated, e.g. one
    /// without any instance bound.
    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Ingest error: {0}")]
    Ingest(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the error was caused by caller input rather than a backend.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidCondition(_) | Self::InvalidQuery(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
