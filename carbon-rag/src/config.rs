//! Configuration for the retrieval pipeline.

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// What to do when a persisted index exists but fails to load.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CorruptIndexPolicy {
    /// Surface [`RagError::IndexCorruptError`] to the caller.
    #[default]
    Fail,
    /// Log the corruption and rebuild the index from the document source.
    ///
    /// Documents added incrementally since the last full build are lost.
    Rebuild,
}

/// Configuration parameters for the retrieval pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Maximum number of characters shared by consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of chunks retrieved per query.
    pub top_k: usize,
    /// Upper bound, in characters, of an assembled context string.
    pub max_context_length: usize,
    /// Name of the index directory inside the knowledge base.
    pub index_dir_name: String,
    /// File extensions (without the dot) picked up by the document loader.
    pub file_extensions: Vec<String>,
    /// Recovery policy for a persisted index that fails to load.
    pub corrupt_index_policy: CorruptIndexPolicy,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: 4,
            max_context_length: 2000,
            index_dir_name: "faiss_index".to_string(),
            file_extensions: vec!["txt".to_string()],
            corrupt_index_policy: CorruptIndexPolicy::Fail,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Check that the parameters are mutually consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `top_k == 0` or `max_context_length == 0`
    /// - `index_dir_name` or `file_extensions` is empty
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if self.max_context_length == 0 {
            return Err(RagError::ConfigError(
                "max_context_length must be greater than zero".to_string(),
            ));
        }
        if self.index_dir_name.trim().is_empty() {
            return Err(RagError::ConfigError("index_dir_name must not be empty".to_string()));
        }
        if self.file_extensions.is_empty() {
            return Err(RagError::ConfigError(
                "file_extensions must list at least one extension".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of chunks retrieved per query.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the maximum assembled context length in characters.
    pub fn max_context_length(mut self, length: usize) -> Self {
        self.config.max_context_length = length;
        self
    }

    /// Set the name of the index directory inside the knowledge base.
    pub fn index_dir_name(mut self, name: impl Into<String>) -> Self {
        self.config.index_dir_name = name.into();
        self
    }

    /// Replace the file extensions picked up by the document loader.
    pub fn file_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.file_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Set the recovery policy for a corrupt persisted index.
    pub fn corrupt_index_policy(mut self, policy: CorruptIndexPolicy) -> Self {
        self.config.corrupt_index_policy = policy;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] under the conditions listed on
    /// [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
