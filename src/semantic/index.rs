//! Exact inner-product index over unit-normalized paragraph vectors.
//!
//! Rows are stored contiguously in insertion order; row `i` corresponds to
//! paragraph `i` of the document the index was built from. Because every
//! row is unit length, the inner product with a normalized query is the
//! cosine similarity.

use crate::semantic::l2_norm;

/// Tolerance on the unit-norm check at build time.
const UNIT_NORM_TOLERANCE: f64 = 1e-4;

/// Errors that can occur during normalization and index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Cannot normalize zero-norm vector at row {row}")]
    DegenerateVector { row: usize },

    #[error("Cannot search an empty index")]
    EmptyIndex,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Search hit from the similarity index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    /// Row of the matching vector (paragraph position)
    pub row: usize,
    /// Cosine similarity score (-1.0 to 1.0)
    pub score: f32,
}

/// Read-only similarity index.
///
/// There is no insert or remove: an index is produced once by
/// [`SimilarityIndex::build`] and a different document needs a new index.
#[derive(Debug, Clone)]
pub struct SimilarityIndex {
    /// Row-major storage, `len * dimensions` floats
    data: Vec<f32>,
    dimensions: usize,
    len: usize,
}

impl SimilarityIndex {
    /// Build an index from unit-normalized vectors.
    ///
    /// An empty batch yields an empty index, which refuses to be searched.
    pub fn build(vectors: Vec<Vec<f32>>) -> Result<Self, IndexError> {
        let dimensions = vectors.first().map(Vec::len).unwrap_or(0);
        if !vectors.is_empty() && dimensions == 0 {
            return Err(IndexError::InvalidArgument(
                "vectors must have at least one dimension".to_string(),
            ));
        }

        let mut data = Vec::with_capacity(vectors.len() * dimensions);

        for (row, vector) in vectors.iter().enumerate() {
            if vector.len() != dimensions {
                return Err(IndexError::DimensionMismatch {
                    expected: dimensions,
                    got: vector.len(),
                });
            }

            let norm = l2_norm(vector);
            if !norm.is_finite() || (norm - 1.0).abs() > UNIT_NORM_TOLERANCE {
                return Err(IndexError::InvalidArgument(format!(
                    "row {row} is not unit-normalized (norm {norm:.6})"
                )));
            }

            data.extend_from_slice(vector);
        }

        Ok(Self {
            data,
            dimensions,
            len: vectors.len(),
        })
    }

    /// Get the embedding dimensions (0 for an empty index).
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Get the number of stored vectors.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate over stored vectors in row order.
    pub fn vectors(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dimensions.max(1)).take(self.len)
    }

    /// Exact top-k search by inner product.
    ///
    /// # Arguments
    /// * `query` - Unit-normalized query vector
    /// * `k` - Maximum number of hits, at least 1
    ///
    /// # Returns
    /// `min(k, len)` hits sorted by score (highest first); equal scores keep
    /// row order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if k == 0 {
            return Err(IndexError::InvalidArgument(
                "k must be at least 1".to_string(),
            ));
        }

        if self.is_empty() {
            return Err(IndexError::EmptyIndex);
        }

        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        let mut hits: Vec<SearchHit> = self
            .vectors()
            .enumerate()
            .map(|(row, v)| SearchHit {
                row,
                score: inner_product(query, v),
            })
            .collect();

        // Stable sort, so ties stay in row order
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);

        Ok(hits)
    }
}

fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
