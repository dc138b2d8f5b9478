//! Retrieval pipeline orchestrator.
//!
//! The [`RetrievalPipeline`] owns an [`EmbeddingProvider`], a [`Chunker`] and
//! the [`VectorIndex`] built from a knowledge-base directory. It starts
//! uninitialized; [`load_or_build`](RetrievalPipeline::load_or_build) moves it
//! to the ready state by loading the persisted index or, if none exists,
//! building one from the documents. Query methods perform that step lazily.
//!
//! # Example
//!
//! ```rust,ignore
//! use carbon_rag::{HashingEmbedder, RagConfig, RetrievalPipeline};
//!
//! let pipeline = RetrievalPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(HashingEmbedder::default()))
//!     .knowledge_base("knowledge_base")
//!     .build()?;
//!
//! let context = pipeline.retrieve_context_for("What is Scope 1?", 2000).await;
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::chunking::{Chunker, RecursiveChunker, split_documents};
use crate::config::{CorruptIndexPolicy, RagConfig};
use crate::context::{NO_CONTEXT, assemble_context};
use crate::document::{Chunk, Document, IndexEntry, SearchResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::loader::{LoadReport, load_directory};

/// How the pipeline's index came to be ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrigin {
    /// The index was already in memory; nothing was done.
    AlreadyReady,
    /// The index was restored from its persisted snapshot.
    Loaded,
    /// No snapshot existed; the index was built from the document source.
    Built,
    /// The snapshot was corrupt and the policy allowed a rebuild.
    RebuiltAfterCorruption,
}

/// Result of [`RetrievalPipeline::load_or_build`].
#[derive(Debug)]
pub struct IndexStatus {
    /// How the index became ready.
    pub origin: IndexOrigin,
    /// Number of entries in the ready index.
    pub entry_count: usize,
    /// Source files skipped during a build, empty for loads.
    pub skipped: Vec<RagError>,
}

/// Result of building an index from the document source.
#[derive(Debug)]
pub struct BuildReport {
    /// Number of documents that were read.
    pub document_count: usize,
    /// Number of chunks indexed.
    pub chunk_count: usize,
    /// One [`RagError::DocumentLoadError`] per file that could not be read.
    pub skipped: Vec<RagError>,
}

/// Result of [`RetrievalPipeline::query`]. Never an error.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    /// Retrieved chunks, most similar first.
    pub sources: Vec<SearchResult>,
    /// The assembled context, or [`NO_CONTEXT`].
    pub context: String,
    /// Description of the failure that forced a degraded response, if any.
    pub failure: Option<String>,
}

impl QueryOutcome {
    /// Return `true` if retrieval failed and the outcome is a fallback.
    pub fn is_degraded(&self) -> bool {
        self.failure.is_some()
    }
}

/// The retrieval pipeline orchestrator.
///
/// Construct one via [`RetrievalPipeline::builder()`] at the application's
/// composition root and share it (for example behind an `Arc`). Reads run
/// concurrently; mutations are serialized, applied to a copy of the index,
/// persisted, and only then published to readers.
pub struct RetrievalPipeline {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    chunker: Arc<dyn Chunker>,
    knowledge_base: PathBuf,
    index_dir: PathBuf,
    index: RwLock<Option<VectorIndex>>,
    mutation: Mutex<()>,
}

impl RetrievalPipeline {
    /// Create a new [`RetrievalPipelineBuilder`].
    pub fn builder() -> RetrievalPipelineBuilder {
        RetrievalPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Return the knowledge-base directory documents are loaded from.
    pub fn knowledge_base(&self) -> &Path {
        &self.knowledge_base
    }

    /// Return the directory the index is persisted in.
    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    /// Return `true` once an index is loaded or built.
    pub async fn is_ready(&self) -> bool {
        self.index.read().await.is_some()
    }

    /// Return the number of indexed chunks, or zero when uninitialized.
    pub async fn index_len(&self) -> usize {
        self.index.read().await.as_ref().map_or(0, VectorIndex::len)
    }

    /// Load all documents from the knowledge base.
    ///
    /// The index directory is excluded from the walk.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DocumentLoadError`] if the knowledge-base
    /// directory is missing; unreadable files are reported, not raised.
    pub fn load_documents(&self) -> Result<LoadReport> {
        load_directory(&self.knowledge_base, &self.config.file_extensions, Some(&self.index_dir))
    }

    /// Split documents into chunks with the configured chunker.
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        split_documents(self.chunker.as_ref(), documents)
    }

    /// Build a fresh index from `documents`, persist it, and make it current.
    ///
    /// Returns the number of indexed chunks.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmptyInputError`] if the documents produce no
    /// chunks, or any embedding or storage error.
    pub async fn build_index(&self, documents: &[Document]) -> Result<usize> {
        let _guard = self.mutation.lock().await;
        self.build_index_locked(documents).await
    }

    /// Reload the knowledge base from disk and rebuild the index from it.
    ///
    /// # Errors
    ///
    /// See [`load_documents`](Self::load_documents) and
    /// [`build_index`](Self::build_index).
    pub async fn rebuild_from_source(&self) -> Result<BuildReport> {
        let _guard = self.mutation.lock().await;
        self.rebuild_locked().await
    }

    /// Make the index ready: load the persisted snapshot, or build one from
    /// the knowledge base if none exists.
    ///
    /// A corrupt snapshot is handled according to
    /// [`RagConfig::corrupt_index_policy`].
    ///
    /// # Errors
    ///
    /// - [`RagError::IndexCorruptError`] under [`CorruptIndexPolicy::Fail`]
    /// - [`RagError::EmptyInputError`] if a build finds no content
    /// - any loading, embedding or storage error
    pub async fn load_or_build(&self) -> Result<IndexStatus> {
        let _guard = self.mutation.lock().await;
        self.load_or_build_locked().await
    }

    /// Add documents to the index and persist the result.
    ///
    /// The index is made ready first. If the knowledge base itself holds no
    /// content, the added documents become the index. Returns the number of
    /// chunks added.
    ///
    /// # Errors
    ///
    /// Propagates initialization, embedding and storage errors. On error the
    /// in-memory and persisted index are left unchanged.
    pub async fn add_documents(&self, documents: &[Document]) -> Result<usize> {
        let _guard = self.mutation.lock().await;

        let chunks = self.split_documents(documents);
        if chunks.is_empty() {
            info!(document_count = documents.len(), "no chunks to add");
            return Ok(0);
        }

        match self.load_or_build_locked().await {
            Ok(_) => {}
            Err(RagError::EmptyInputError(_)) => {
                info!("knowledge base is empty, building index from added documents");
                return self.build_index_locked(documents).await;
            }
            Err(e) => return Err(e),
        }

        let entries = self.embed_chunks(chunks).await?;
        let mut next = self.index.read().await.clone().ok_or_else(|| {
            RagError::EmptyInputError("index is not initialized".to_string())
        })?;
        let added = next.add(entries)?;
        next.save(&self.index_dir)?;

        let entry_count = next.len();
        *self.index.write().await = Some(next);
        info!(chunk_count = added, entry_count, "added documents to index");
        Ok(added)
    }

    /// Retrieve the `k` chunks most similar to `query`.
    ///
    /// Initializes the index on first use.
    ///
    /// # Errors
    ///
    /// Propagates initialization and embedding errors, and
    /// [`RagError::DimensionMismatchError`] if the embedder disagrees with
    /// the persisted index.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        if !self.is_ready().await {
            self.load_or_build().await?;
        }

        let query_embedding = self.embedding_provider.embed(query).await?;
        let guard = self.index.read().await;
        let index = guard.as_ref().ok_or_else(|| {
            RagError::EmptyInputError("index is not initialized".to_string())
        })?;
        index.search(&query_embedding, k)
    }

    /// Retrieve sources for `question` and assemble them into a context.
    ///
    /// Uses the configured `top_k` and `max_context_length`. Failures are
    /// logged and reported through [`QueryOutcome::failure`] with the
    /// [`NO_CONTEXT`] sentinel as context.
    pub async fn query(&self, question: &str) -> QueryOutcome {
        match self.search(question, self.config.top_k).await {
            Ok(sources) => {
                let context = assemble_context(&sources, self.config.max_context_length);
                info!(result_count = sources.len(), "query completed");
                QueryOutcome { sources, context, failure: None }
            }
            Err(e) => {
                error!(error = %e, "retrieval failed, returning degraded response");
                QueryOutcome {
                    sources: Vec::new(),
                    context: NO_CONTEXT.to_string(),
                    failure: Some(e.to_string()),
                }
            }
        }
    }

    /// Return a context string of at most `max_length` characters for `query`.
    ///
    /// Never fails: any error is logged and [`NO_CONTEXT`] is returned.
    pub async fn retrieve_context_for(&self, query: &str, max_length: usize) -> String {
        match self.search(query, self.config.top_k).await {
            Ok(results) => assemble_context(&results, max_length),
            Err(e) => {
                error!(error = %e, "context retrieval failed");
                NO_CONTEXT.to_string()
            }
        }
    }

    async fn load_or_build_locked(&self) -> Result<IndexStatus> {
        if let Some(index) = self.index.read().await.as_ref() {
            return Ok(IndexStatus {
                origin: IndexOrigin::AlreadyReady,
                entry_count: index.len(),
                skipped: Vec::new(),
            });
        }

        match VectorIndex::load(&self.index_dir) {
            Ok(index) => {
                let entry_count = index.len();
                *self.index.write().await = Some(index);
                Ok(IndexStatus { origin: IndexOrigin::Loaded, entry_count, skipped: Vec::new() })
            }
            Err(RagError::IndexNotFoundError { path }) => {
                info!(path = %path.display(), "no persisted index, building from documents");
                let report = self.rebuild_locked().await?;
                Ok(IndexStatus {
                    origin: IndexOrigin::Built,
                    entry_count: report.chunk_count,
                    skipped: report.skipped,
                })
            }
            Err(e @ RagError::IndexCorruptError { .. }) => match self.config.corrupt_index_policy {
                CorruptIndexPolicy::Fail => {
                    error!(error = %e, "persisted index is corrupt");
                    Err(e)
                }
                CorruptIndexPolicy::Rebuild => {
                    warn!(error = %e, "persisted index is corrupt, rebuilding from documents");
                    let report = self.rebuild_locked().await?;
                    Ok(IndexStatus {
                        origin: IndexOrigin::RebuiltAfterCorruption,
                        entry_count: report.chunk_count,
                        skipped: report.skipped,
                    })
                }
            },
            Err(e) => Err(e),
        }
    }

    async fn rebuild_locked(&self) -> Result<BuildReport> {
        let report = self.load_documents()?;
        let document_count = report.documents.len();
        let chunk_count = self.build_index_locked(&report.documents).await?;
        Ok(BuildReport { document_count, chunk_count, skipped: report.skipped })
    }

    async fn build_index_locked(&self, documents: &[Document]) -> Result<usize> {
        let chunks = self.split_documents(documents);
        let entries = self.embed_chunks(chunks).await?;
        let index = VectorIndex::build(entries)?;
        index.save(&self.index_dir)?;

        let chunk_count = index.len();
        *self.index.write().await = Some(index);
        info!(document_count = documents.len(), chunk_count, "built vector index");
        Ok(chunk_count)
    }

    async fn embed_chunks(&self, chunks: Vec<Chunk>) -> Result<Vec<IndexEntry>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = self.embedding_provider.embed_batch(&texts).await.inspect_err(|e| {
            error!(chunk_count = chunks.len(), error = %e, "embedding failed");
        })?;
        if embeddings.len() != chunks.len() {
            return Err(RagError::EmbeddingError {
                provider: "pipeline".to_string(),
                message: format!(
                    "provider returned {} embeddings for {} chunks",
                    embeddings.len(),
                    chunks.len()
                ),
            });
        }

        let dimensions = self.embedding_provider.dimensions();
        if let Some(bad) = embeddings.iter().find(|e| e.len() != dimensions) {
            return Err(RagError::DimensionMismatchError {
                expected: dimensions,
                actual: bad.len(),
            });
        }

        Ok(embeddings.into_iter().zip(chunks).map(|(e, c)| IndexEntry::new(e, c)).collect())
    }
}

/// Builder for constructing a [`RetrievalPipeline`].
///
/// `embedding_provider` and `knowledge_base` are required. The config
/// defaults to [`RagConfig::default()`], the chunker to a
/// [`RecursiveChunker`] using the config's chunk size and overlap, and the
/// index directory to `<knowledge_base>/<index_dir_name>`.
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = RetrievalPipeline::builder()
///     .config(RagConfig::builder().top_k(2).build()?)
///     .embedding_provider(Arc::new(embedder))
///     .knowledge_base("knowledge_base")
///     .build()?;
/// ```
#[derive(Default)]
pub struct RetrievalPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    chunker: Option<Arc<dyn Chunker>>,
    knowledge_base: Option<PathBuf>,
    index_dir: Option<PathBuf>,
}

impl RetrievalPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Override the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the knowledge-base directory documents are loaded from.
    pub fn knowledge_base(mut self, path: impl Into<PathBuf>) -> Self {
        self.knowledge_base = Some(path.into());
        self
    }

    /// Override the directory the index is persisted in.
    pub fn index_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.index_dir = Some(path.into());
        self
    }

    /// Build the [`RetrievalPipeline`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required field is missing or
    /// the config is invalid, and [`RagError::ChunkingError`] if the default
    /// chunker rejects the configured window.
    pub fn build(self) -> Result<RetrievalPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let knowledge_base = self
            .knowledge_base
            .ok_or_else(|| RagError::ConfigError("knowledge_base is required".to_string()))?;
        let chunker = match self.chunker {
            Some(chunker) => chunker,
            None => Arc::new(RecursiveChunker::new(config.chunk_size, config.chunk_overlap)?),
        };
        let index_dir =
            self.index_dir.unwrap_or_else(|| knowledge_base.join(&config.index_dir_name));

        Ok(RetrievalPipeline {
            config,
            embedding_provider,
            chunker,
            knowledge_base,
            index_dir,
            index: RwLock::new(None),
            mutation: Mutex::new(()),
        })
    }
}
