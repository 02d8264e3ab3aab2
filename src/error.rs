//! Error types for the agent memory subsystem

use thiserror::Error;

/// Result type alias for memory operations
pub type Result<T> = std::result::Result<T, MemoryError>;

#[derive(Error, Debug)]
pub enum MemoryError {

    // =============================
    // Collaborator Errors
    // =============================

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Text generation error: {0}")]
    Generation(String),

    // =============================
    // Configuration
    // =============================

    #[error("Configuration error: {0}")]
    Config(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}
