//! Error types for Lodestar.

use crate::vector_store::IndexBackend;
use thiserror::Error;

/// Library-level error type for Lodestar operations.
#[derive(Error, Debug)]
pub enum LodestarError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Chunking failed: {0}")]
    Chunking(String),

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Metadata store error: {0}")]
    Metadata(String),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Id {0} is already in use")]
    DuplicateId(u64),

    #[error("Metadata belongs to the {found} backend, but {expected} is configured")]
    BackendMismatch {
        expected: IndexBackend,
        found: IndexBackend,
    },

    #[error("RAG error: {0}")]
    Rag(String),

    #[error("Scrape failed: {0}")]
    Scrape(String),

    #[error("Required tool not found: {0}")]
    ToolNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for Lodestar operations.
pub type Result<T> = std::result::Result<T, LodestarError>;
