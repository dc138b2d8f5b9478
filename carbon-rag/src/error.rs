//! Error types for the `carbon-rag` crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in retrieval operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// An index or embedding batch was requested with no input.
    #[error("Empty input: {0}")]
    EmptyInputError(String),

    /// A vector's dimensionality disagrees with the index it is used against.
    #[error("Dimension mismatch: index holds {expected}-dimensional vectors, got {actual}")]
    DimensionMismatchError {
        /// The dimensionality fixed by the index.
        expected: usize,
        /// The dimensionality of the offending vector.
        actual: usize,
    },

    /// No persisted index exists at the expected location.
    #[error("No persisted index found at {}", path.display())]
    IndexNotFoundError {
        /// The index directory that was checked.
        path: PathBuf,
    },

    /// A persisted index exists but cannot be parsed or fails validation.
    #[error("Persisted index at {} is corrupt: {message}", path.display())]
    IndexCorruptError {
        /// The index directory or file that failed to load.
        path: PathBuf,
        /// A description of the failure.
        message: String,
    },

    /// A source document could not be read or decoded.
    #[error("Failed to load document {}: {message}", path.display())]
    DocumentLoadError {
        /// The file that failed to load.
        path: PathBuf,
        /// A description of the failure.
        message: String,
    },

    /// The external text-generation service failed.
    #[error("Generation service error ({provider}): {message}")]
    GenerationServiceError {
        /// The generation backend that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during document chunking.
    #[error("Chunking error: {0}")]
    ChunkingError(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A filesystem operation failed while writing or reading an index.
    #[error("I/O error at {}: {source}", path.display())]
    IoError {
        /// The path being accessed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl RagError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoError { path: path.into(), source }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::IndexCorruptError { path: path.into(), message: message.into() }
    }
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RagError>;
