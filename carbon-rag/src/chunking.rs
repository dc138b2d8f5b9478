//! Document chunking strategies.
//!
//! This module provides the [`Chunker`] trait and two implementations:
//!
//! - [`RecursiveChunker`]: splits on the coarsest natural boundary first
//!   (paragraphs, lines, sentences, words, then characters) and merges the
//!   pieces back into overlapping windows
//! - [`FixedSizeChunker`]: slides a fixed character window with overlap
//!
//! Sizes are measured in characters, never bytes, so multi-byte text is
//! never cut inside a code point.

use std::collections::VecDeque;
use std::ops::Range;

use crate::document::{Chunk, Document};
use crate::error::{RagError, Result};

/// Separators tried by [`RecursiveChunker`], coarsest first.
///
/// The trailing empty separator splits into single characters and guarantees
/// that every chunk fits within `chunk_size`.
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "! ", "? ", " ", ""];

/// A strategy for splitting documents into chunks.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks, in document order.
    ///
    /// Returns an empty `Vec` if the document has empty text.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// Split every document with `chunker`, preserving document order.
pub fn split_documents(chunker: &dyn Chunker, documents: &[Document]) -> Vec<Chunk> {
    documents.iter().flat_map(|document| chunker.chunk(document)).collect()
}

fn validate_window(chunk_size: usize, chunk_overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(RagError::ChunkingError("chunk_size must be greater than zero".to_string()));
    }
    if chunk_overlap >= chunk_size {
        return Err(RagError::ChunkingError(format!(
            "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
        )));
    }
    Ok(())
}

fn make_chunk(document: &Document, chunk_index: usize, text: &str) -> Chunk {
    Chunk {
        id: format!("{}_{chunk_index}", document.id),
        text: text.to_string(),
        metadata: document.metadata.clone(),
        document_id: document.id.clone(),
        chunk_index,
    }
}

/// Splits text into fixed-size character windows with configurable overlap.
///
/// Consecutive windows share exactly `chunk_overlap` characters. Chunk IDs
/// are generated as `{document_id}_{chunk_index}`.
///
/// # Example
///
/// ```rust,ignore
/// use carbon_rag::FixedSizeChunker;
///
/// let chunker = FixedSizeChunker::new(256, 50)?;
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk
    /// * `chunk_overlap`: number of overlapping characters between consecutive chunks
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ChunkingError`] if `chunk_size` is zero or
    /// `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate_window(chunk_size, chunk_overlap)?;
        Ok(Self { chunk_size, chunk_overlap })
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        if document.text.is_empty() {
            return Vec::new();
        }

        let text = &document.text;
        let offsets: Vec<usize> =
            text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();
        let char_count = offsets.len() - 1;
        let step = self.chunk_size - self.chunk_overlap;

        let mut chunks = Vec::new();
        let mut start = 0;
        loop {
            let end = (start + self.chunk_size).min(char_count);
            chunks.push(make_chunk(document, chunks.len(), &text[offsets[start]..offsets[end]]));
            if end == char_count {
                break;
            }
            start += step;
        }

        chunks
    }
}

/// Splits text on natural boundaries, falling back to finer ones.
///
/// The first separator present in the text is used to cut it into pieces
/// (each piece keeps its trailing separator). Pieces that still exceed
/// `chunk_size` are split again with the next separator. Adjacent pieces are
/// then merged greedily into chunks of at most `chunk_size` characters; each
/// new chunk starts with the trailing pieces of the previous one, up to
/// `chunk_overlap` characters. Chunks are trimmed of surrounding whitespace
/// and are always contiguous substrings of the source document.
///
/// # Example
///
/// ```rust,ignore
/// use carbon_rag::RecursiveChunker;
///
/// let chunker = RecursiveChunker::new(1000, 200)?;
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker` using [`DEFAULT_SEPARATORS`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ChunkingError`] if `chunk_size` is zero or
    /// `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate_window(chunk_size, chunk_overlap)?;
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Replace the separator hierarchy, coarsest first.
    ///
    /// A character-level fallback is appended when the list does not end
    /// with the empty separator.
    pub fn with_separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.separators = separators.into_iter().map(Into::into).collect();
        if self.separators.last().is_none_or(|s| !s.is_empty()) {
            self.separators.push(String::new());
        }
        self
    }

    /// Return the maximum chunk size in characters.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Return the maximum overlap between consecutive chunks in characters.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    fn split_range(
        &self,
        text: &str,
        range: Range<usize>,
        separators: &[String],
        out: &mut Vec<Range<usize>>,
    ) {
        let slice = &text[range.clone()];
        let position =
            separators.iter().position(|s| s.is_empty() || slice.contains(s.as_str()));
        let (separator, finer) = match position {
            Some(i) => (separators[i].as_str(), &separators[i + 1..]),
            None => ("", &separators[separators.len()..]),
        };

        let mut pending = Vec::new();
        for piece in split_keeping_separator(slice, range.start, separator) {
            if piece.chars <= self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                self.merge(&pending, out);
                pending.clear();
            }
            if finer.is_empty() {
                out.push(piece.range);
            } else {
                self.split_range(text, piece.range, finer, out);
            }
        }

        if !pending.is_empty() {
            self.merge(&pending, out);
        }
    }

    /// Merge adjacent pieces into windows of at most `chunk_size` characters.
    fn merge(&self, pieces: &[Piece], out: &mut Vec<Range<usize>>) {
        let mut window: VecDeque<&Piece> = VecDeque::new();
        let mut total = 0;

        for piece in pieces {
            if total + piece.chars > self.chunk_size && !window.is_empty() {
                out.push(window_range(&window));
                while total > self.chunk_overlap
                    || (total + piece.chars > self.chunk_size && total > 0)
                {
                    let Some(first) = window.pop_front() else { break };
                    total -= first.chars;
                }
            }
            window.push_back(piece);
            total += piece.chars;
        }

        if !window.is_empty() {
            out.push(window_range(&window));
        }
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        if document.text.is_empty() {
            return Vec::new();
        }

        let text = &document.text;
        let mut ranges = Vec::new();
        self.split_range(text, 0..text.len(), &self.separators, &mut ranges);

        let mut chunks = Vec::new();
        for range in ranges {
            let chunk_text = text[range].trim();
            if chunk_text.is_empty() {
                continue;
            }
            chunks.push(make_chunk(document, chunks.len(), chunk_text));
        }
        chunks
    }
}

/// A byte range of the source text and its length in characters.
#[derive(Debug, Clone, PartialEq)]
struct Piece {
    range: Range<usize>,
    chars: usize,
}

fn window_range(window: &VecDeque<&Piece>) -> Range<usize> {
    match (window.front(), window.back()) {
        (Some(first), Some(last)) => first.range.start..last.range.end,
        _ => 0..0,
    }
}

/// Split `slice` at `separator`, keeping the separator attached to the
/// preceding piece. Ranges are offset by `base` into the enclosing text.
/// An empty separator splits into single characters.
fn split_keeping_separator(slice: &str, base: usize, separator: &str) -> Vec<Piece> {
    if separator.is_empty() {
        return slice
            .char_indices()
            .map(|(i, c)| Piece { range: base + i..base + i + c.len_utf8(), chars: 1 })
            .collect();
    }

    let mut result = Vec::new();
    let mut start = 0;

    while let Some(pos) = slice[start..].find(separator) {
        let end = start + pos + separator.len();
        let chars = slice[start..end].chars().count();
        result.push(Piece { range: base + start..base + end, chars });
        start = end;
    }

    if start < slice.len() {
        let chars = slice[start..].chars().count();
        result.push(Piece { range: base + start..base + slice.len(), chars });
    }

    result
}
