//! Data types for documents, chunks, index entries and search results.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Metadata key under which the loader records a document's source path.
pub const SOURCE_METADATA_KEY: &str = "source";

/// A source document containing text content and metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: String,
    /// The text content of the document.
    pub text: String,
    /// Key-value metadata associated with the document.
    pub metadata: HashMap<String, String>,
    /// Optional URI pointing to the original source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
}

impl Document {
    /// Create a document with empty metadata and no source URI.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into(), metadata: HashMap::new(), source_uri: None }
    }

    /// Attach a source path, also recording it under [`SOURCE_METADATA_KEY`].
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        let source = source.into();
        self.metadata.insert(SOURCE_METADATA_KEY.to_string(), source.clone());
        self.source_uri = Some(source);
        self
    }

    /// Insert a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A contiguous segment of a [`Document`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier for the chunk, `{document_id}_{chunk_index}`.
    pub id: String,
    /// The text content of the chunk.
    pub text: String,
    /// Metadata copied unchanged from the parent document.
    pub metadata: HashMap<String, String>,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// Position of this chunk within its parent document.
    pub chunk_index: usize,
}

/// A chunk paired with its embedding, as stored in a
/// [`VectorIndex`](crate::index::VectorIndex).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    /// Identifier assigned by the index, unique and increasing in insertion order.
    ///
    /// Entries that have not been inserted yet carry `0`; the index overwrites it.
    pub id: u64,
    /// The unit-norm embedding of [`IndexEntry::chunk`].
    pub embedding: Vec<f32>,
    /// The chunk payload.
    pub chunk: Chunk,
}

impl IndexEntry {
    /// Pair a chunk with its embedding. The id is assigned on insertion.
    pub fn new(embedding: Vec<f32>, chunk: Chunk) -> Self {
        Self { id: 0, embedding, chunk }
    }
}

/// A retrieved [`Chunk`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// The inner-product similarity score (higher is more relevant).
    pub score: f32,
}
