//! Error types for bloomtree

use crate::store::{BlockKind, Hash};
use thiserror::Error;

/// Result type alias for bloomtree operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in bloomtree operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Index {index} out of bounds for sequence of length {count}")]
    OutOfBounds { index: u64, count: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Block not found: {0}")]
    NotFound(Hash),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Expected a {expected:?} block, found {found:?}")]
    UnexpectedKind { expected: BlockKind, found: BlockKind },

    #[error("Filter '{name}' has mismatched geometry: {left} vs {right}")]
    FilterMismatch {
        name: String,
        left: String,
        right: String,
    },

    #[error("Invalid store file: {0}")]
    InvalidFile(String),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Root not found: {0}")]
    RootNotFound(String),

    #[error("Config error: {0}")]
    Config(String),
}
