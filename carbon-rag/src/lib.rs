//! # carbon-rag
//!
//! Retrieval over a small carbon-accounting knowledge base, producing
//! bounded, citable prompt context for a language model.
//!
//! ## Pipeline
//!
//! documents → [`Chunker`] → chunks → [`EmbeddingProvider`] → vectors →
//! [`VectorIndex`] (persisted under `<knowledge_base>/faiss_index/`).
//!
//! At query time the question is embedded, the index is searched by inner
//! product, and [`assemble_context`] formats the ranked chunks as numbered
//! `[Source i]:` blocks. [`RetrievalPipeline`] orchestrates all of it and
//! [`AnswerComposer`] optionally passes the context to a [`TextGenerator`].
//!
//! ## Features
//!
//! - `openai`: embedding and chat providers for OpenAI-compatible APIs
//!   (including Groq)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use carbon_rag::{HashingEmbedder, RagConfig, RetrievalPipeline};
//!
//! let pipeline = RetrievalPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(HashingEmbedder::default()))
//!     .knowledge_base("knowledge_base")
//!     .build()?;
//!
//! pipeline.load_or_build().await?;
//! let outcome = pipeline.query("What is Scope 1?").await;
//! println!("{}", outcome.context);
//! ```

pub mod answer;
pub mod chunking;
pub mod config;
pub mod context;
pub mod document;
pub mod embedding;
pub mod error;
pub mod hashing;
pub mod index;
pub mod loader;
#[cfg(feature = "openai")]
pub mod openai;
pub mod pipeline;
pub mod storage;

pub use answer::{Answer, AnswerComposer, DEFAULT_PROMPT_TEMPLATE, PromptTemplate, TextGenerator};
pub use chunking::{
    Chunker, DEFAULT_SEPARATORS, FixedSizeChunker, RecursiveChunker, split_documents,
};
pub use config::{CorruptIndexPolicy, RagConfig, RagConfigBuilder};
pub use context::{NO_CONTEXT, assemble_context, source_block};
pub use document::{Chunk, Document, IndexEntry, SOURCE_METADATA_KEY, SearchResult};
pub use embedding::{EmbeddingProvider, l2_norm, l2_normalize};
pub use error::{RagError, Result};
pub use hashing::HashingEmbedder;
pub use index::VectorIndex;
pub use loader::{Discovery, LoadReport, discover_files, load_directory};
pub use pipeline::{
    BuildReport, IndexOrigin, IndexStatus, QueryOutcome, RetrievalPipeline,
    RetrievalPipelineBuilder,
};
pub use storage::MANIFEST_FILE;
