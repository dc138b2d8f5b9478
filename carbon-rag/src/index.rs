//! Exact nearest-neighbour vector index.
//!
//! [`VectorIndex`] keeps its entries in insertion order and answers queries
//! with an exhaustive inner-product scan. At knowledge-base scale (a few
//! thousand chunks) this is fast and gives exact rankings. Embeddings are
//! expected to be unit-norm, so the score equals cosine similarity.
//!
//! Persistence lives in [`crate::storage`].

use std::cmp::Ordering;

use crate::document::{IndexEntry, SearchResult};
use crate::embedding::dot;
use crate::error::{RagError, Result};

/// An in-memory index of `(embedding, chunk)` entries with a fixed dimensionality.
///
/// # Example
///
/// ```rust,ignore
/// use carbon_rag::VectorIndex;
///
/// let mut index = VectorIndex::build(entries)?;
/// index.add(more_entries)?;
/// let results = index.search(&query_embedding, 4)?;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimensions: usize,
    entries: Vec<IndexEntry>,
    next_id: u64,
}

impl VectorIndex {
    /// Build a fresh index from `entries`.
    ///
    /// The dimensionality is taken from the first entry; entry ids are
    /// assigned in order starting at 1.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmptyInputError`] if `entries` is empty and
    /// [`RagError::DimensionMismatchError`] if the entries disagree on
    /// dimensionality or have empty embeddings.
    pub fn build(entries: Vec<IndexEntry>) -> Result<Self> {
        let Some(first) = entries.first() else {
            return Err(RagError::EmptyInputError(
                "cannot build a vector index from zero entries".to_string(),
            ));
        };
        let dimensions = first.embedding.len();
        if dimensions == 0 {
            return Err(RagError::DimensionMismatchError { expected: 1, actual: 0 });
        }

        let mut index = Self { dimensions, entries: Vec::with_capacity(entries.len()), next_id: 1 };
        index.add(entries)?;
        Ok(index)
    }

    /// Restore an index from persisted parts without reassigning ids.
    pub(crate) fn from_parts(dimensions: usize, entries: Vec<IndexEntry>) -> Self {
        let next_id = entries.iter().map(|e| e.id).max().map_or(1, |max| max + 1);
        Self { dimensions, entries, next_id }
    }

    /// Append entries, assigning each a fresh id.
    ///
    /// The batch is validated before anything is inserted, so a failed call
    /// leaves the index unchanged. Appending is equivalent to building from
    /// the concatenated entry sequence.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DimensionMismatchError`] if any entry's embedding
    /// length differs from [`dimensions`](VectorIndex::dimensions).
    pub fn add(&mut self, entries: Vec<IndexEntry>) -> Result<usize> {
        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != self.dimensions) {
            return Err(RagError::DimensionMismatchError {
                expected: self.dimensions,
                actual: bad.embedding.len(),
            });
        }

        let added = entries.len();
        self.entries.reserve(added);
        for mut entry in entries {
            entry.id = self.next_id;
            self.next_id += 1;
            self.entries.push(entry);
        }
        Ok(added)
    }

    /// Return the `k` entries with the highest inner product to `query`.
    ///
    /// Results are ordered by descending score; ties keep insertion order,
    /// earliest first. Fewer than `k` results are returned only when the
    /// index holds fewer entries.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DimensionMismatchError`] if `query` has the wrong length.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        if query.len() != self.dimensions {
            return Err(RagError::DimensionMismatchError {
                expected: self.dimensions,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (position, dot(&entry.embedding, query)))
            .collect();

        // Stable sort keeps earlier insertions ahead on equal scores.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(position, score)| SearchResult {
                chunk: self.entries[position].chunk.clone(),
                score,
            })
            .collect())
    }

    /// Return the fixed embedding dimensionality of this index.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Return the number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return `true` if the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return the stored entries in insertion order.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }
}
