//! Query-time retrieval: template clause text in, ranked paragraphs out.

use crate::clause::{RetrievalResult, RetrievedClause};
use crate::document::ParagraphCollection;
use crate::semantic::{
    normalize, normalize_one, EmbeddingError, EmbeddingProvider, IndexError, SimilarityIndex,
};

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Index has {index} vectors but the document has {paragraphs} paragraphs")]
    SizeMismatch { index: usize, paragraphs: usize },
}

/// Embed `query`, normalize it like the indexed paragraphs and return the
/// `k` most similar paragraphs with their cosine similarity.
pub fn retrieve<P>(
    query: &str,
    provider: &P,
    index: &SimilarityIndex,
    paragraphs: &ParagraphCollection,
    k: usize,
) -> Result<RetrievalResult, RetrievalError>
where
    P: EmbeddingProvider + ?Sized,
{
    if index.len() != paragraphs.len() {
        return Err(RetrievalError::SizeMismatch {
            index: index.len(),
            paragraphs: paragraphs.len(),
        });
    }

    let query_embedding = normalize_one(&provider.embed(query)?)?;
    let hits = index.search(&query_embedding, k)?;

    let result = hits
        .into_iter()
        .filter_map(|hit| {
            paragraphs.get(hit.row).map(|text| RetrievedClause {
                clause: text.to_string(),
                confidence: hit.score,
            })
        })
        .collect();

    Ok(result)
}

/// A document's paragraphs together with the index built from them.
///
/// Holding both in one value keeps row `i` of the index and paragraph `i`
/// of the collection in step.
#[derive(Debug, Clone)]
pub struct DocumentIndex {
    paragraphs: ParagraphCollection,
    index: SimilarityIndex,
}

impl DocumentIndex {
    /// Embed all paragraphs in one batch, normalize and index them.
    pub fn build<P>(paragraphs: ParagraphCollection, provider: &P) -> Result<Self, RetrievalError>
    where
        P: EmbeddingProvider + ?Sized,
    {
        if paragraphs.is_empty() {
            log::warn!("document has no paragraphs; every retrieval against it will fail");
        }

        log::info!(
            "Computing embeddings for {} document paragraphs with '{}'",
            paragraphs.len(),
            provider.name()
        );
        let embeddings = provider.embed_batch(paragraphs.as_slice())?;

        if embeddings.len() != paragraphs.len() {
            return Err(EmbeddingError::EmbeddingFailed(format!(
                "Expected {} embeddings, provider returned {}",
                paragraphs.len(),
                embeddings.len()
            ))
            .into());
        }

        let index = SimilarityIndex::build(normalize(embeddings)?)?;
        log::info!("Similarity index built with {} vectors", index.len());

        Ok(Self { paragraphs, index })
    }

    /// Pair an existing index with its paragraphs (e.g. loaded from cache).
    pub fn from_parts(
        paragraphs: ParagraphCollection,
        index: SimilarityIndex,
    ) -> Result<Self, RetrievalError> {
        if index.len() != paragraphs.len() {
            return Err(RetrievalError::SizeMismatch {
                index: index.len(),
                paragraphs: paragraphs.len(),
            });
        }

        Ok(Self { paragraphs, index })
    }

    pub fn paragraphs(&self) -> &ParagraphCollection {
        &self.paragraphs
    }

    pub fn index(&self) -> &SimilarityIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn retrieve<P>(
        &self,
        query: &str,
        provider: &P,
        k: usize,
    ) -> Result<RetrievalResult, RetrievalError>
    where
        P: EmbeddingProvider + ?Sized,
    {
        retrieve(query, provider, &self.index, &self.paragraphs, k)
    }
}
