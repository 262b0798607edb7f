//! Semantic retrieval of counterparty paragraphs for template clauses.
//!
//! Paragraph embeddings are computed locally with fastembed-rs, L2-normalized
//! and searched by inner product, which equals cosine similarity on unit
//! vectors.
//!
//! # Architecture
//!
//! - `embeddings`: Embedding provider trait and the fastembed-backed model
//! - `normalize`: L2 normalization of embedding batches
//! - `index`: In-memory exact inner-product index
//! - `retriever`: Query-time retrieval over an indexed document
//! - `storage`: Binary cache of built document indexes
//! - `service`: Per-run clause retrieval service

pub mod embeddings;
mod index;
mod normalize;
mod retriever;
mod service;
mod storage;

pub use embeddings::{EmbeddingError, EmbeddingModel, EmbeddingProvider};
pub use index::{IndexError, SimilarityIndex};
pub use normalize::{l2_norm, normalize, normalize_one};
pub use retriever::{DocumentIndex, RetrievalError};
pub use service::{ClauseRetrievalError, ClauseRetrievalService};
pub use storage::{document_hash, IndexCache, IndexCacheError};

/// Default embedding model (384 dimensions, small enough to download on first run)
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";
