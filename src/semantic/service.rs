//! Clause retrieval service.
//!
//! Ties the pieces together for one run:
//! - Extracts and indexes a counterparty document (or loads it from cache)
//! - Retrieves the top-k paragraphs for each template clause record
//! - Owns the embedding provider it was given; nothing is global

use std::path::{Path, PathBuf};

use crate::clause::ClauseRecord;
use crate::config::RetrievalConfig;
use crate::document::{extract_paragraphs, DocumentError};
use crate::semantic::{
    document_hash, DocumentIndex, EmbeddingProvider, IndexCache, IndexCacheError, RetrievalError,
};

/// Errors that can occur while indexing a document or retrieving clauses.
#[derive(Debug, thiserror::Error)]
pub enum ClauseRetrievalError {
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Index cache error: {0}")]
    Cache(#[from] IndexCacheError),

    #[error("Retrieval failed for {clause_name} / {clause_subname}: {source}")]
    Clause {
        clause_name: String,
        clause_subname: String,
        #[source]
        source: RetrievalError,
    },
}

/// Service for indexing counterparty documents and retrieving template
/// clauses against them.
pub struct ClauseRetrievalService<P: EmbeddingProvider> {
    provider: P,
    config: RetrievalConfig,
    cache: IndexCache,
}

impl<P: EmbeddingProvider> ClauseRetrievalService<P> {
    /// Create a new retrieval service.
    ///
    /// # Arguments
    /// * `provider` - Embedding provider used for paragraphs and queries alike
    /// * `config` - Retrieval configuration
    /// * `base_path` - Base directory for data files (indexes/)
    pub fn new(provider: P, config: RetrievalConfig, base_path: PathBuf) -> Self {
        Self {
            provider,
            config,
            cache: IndexCache::new(base_path.join("indexes")),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn top_k(&self) -> usize {
        self.config.top_k
    }

    /// Extract and index a document.
    ///
    /// With `cache_index` enabled a previously built index for the same
    /// document bytes and model is reused; an unusable cache file is logged
    /// and rebuilt.
    pub fn index_document(&self, path: &Path) -> Result<DocumentIndex, ClauseRetrievalError> {
        if !self.config.cache_index {
            let paragraphs = extract_paragraphs(path)?;
            return Ok(DocumentIndex::build(paragraphs, &self.provider)?);
        }

        if !path.exists() {
            return Err(DocumentError::NotFound(path.to_path_buf()).into());
        }
        let hash = document_hash(&std::fs::read(path).map_err(DocumentError::from)?);
        let model_id = self.provider.model_id_hash();

        if self.cache.exists(&hash) {
            match self.cache.load(&model_id, &hash) {
                Ok(doc) => {
                    log::info!(
                        "Loaded {} cached vectors for {}",
                        doc.len(),
                        path.display()
                    );
                    if doc.is_empty() {
                        log::warn!("cached document has no paragraphs");
                    }
                    return Ok(doc);
                }
                Err(IndexCacheError::ModelMismatch) => {
                    log::warn!("Model changed, rebuilding index for {}", path.display());
                }
                Err(e) => {
                    log::warn!("Ignoring unusable index cache for {}: {}", path.display(), e);
                }
            }
        }

        let paragraphs = extract_paragraphs(path)?;
        let doc = DocumentIndex::build(paragraphs, &self.provider)?;

        match self.cache.save(&doc, &model_id, &hash) {
            Ok(cache_path) => log::debug!("Saved index cache to {}", cache_path.display()),
            Err(e) => log::warn!("Failed to save index cache: {}", e),
        }

        Ok(doc)
    }

    /// Retrieve the configured top-k paragraphs for one record and attach them.
    pub fn retrieve_clause(
        &self,
        doc: &DocumentIndex,
        record: &mut ClauseRecord,
    ) -> Result<(), ClauseRetrievalError> {
        let result = doc
            .retrieve(&record.input_clause, &self.provider, self.config.top_k)
            .map_err(|source| ClauseRetrievalError::Clause {
                clause_name: record.clause_name.clone(),
                clause_subname: record.clause_subname.clone(),
                source,
            })?;

        log::debug!(
            "{} / {}: {} candidates, best {:.4}",
            record.clause_name,
            record.clause_subname,
            result.len(),
            result.first().map(|c| c.confidence).unwrap_or_default()
        );

        record.attach_retrieval(result);
        Ok(())
    }

    /// Retrieve for every record in order, stopping at the first failure.
    pub fn retrieve_all(
        &self,
        doc: &DocumentIndex,
        records: &mut [ClauseRecord],
    ) -> Result<(), ClauseRetrievalError> {
        for record in records.iter_mut() {
            self.retrieve_clause(doc, record)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::IndexError;
    use crate::tests::{write_nda, BagOfWords};

    fn test_config(cache_index: bool) -> RetrievalConfig {
        RetrievalConfig {
            model: "bag-of-words".to_string(),
            top_k: 2,
            download_timeout_secs: 300,
            cache_index,
        }
    }

    #[test]
    fn test_index_document_without_cache() {
        let dir = tempfile::tempdir().unwrap();
        let doc_path = write_nda(dir.path());
        let service =
            ClauseRetrievalService::new(BagOfWords::default(), test_config(false), dir.path().to_path_buf());

        let doc = service.index_document(&doc_path).unwrap();

        assert_eq!(doc.len(), 3);
        assert!(!dir.path().join("indexes").exists());
    }

    #[test]
    fn test_index_document_uses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let doc_path = write_nda(dir.path());
        let service =
            ClauseRetrievalService::new(BagOfWords::default(), test_config(true), dir.path().to_path_buf());

        let first = service.index_document(&doc_path).unwrap();
        assert!(dir.path().join("indexes").read_dir().unwrap().next().is_some());
        let calls_after_build = service.provider().batch_calls();

        let second = service.index_document(&doc_path).unwrap();
        assert_eq!(service.provider().batch_calls(), calls_after_build);
        assert_eq!(first.paragraphs(), second.paragraphs());
    }

    #[test]
    fn test_corrupted_cache_is_rebuilt() {
        use std::io::{Seek, SeekFrom, Write};

        let dir = tempfile::tempdir().unwrap();
        let doc_path = write_nda(dir.path());
        let service =
            ClauseRetrievalService::new(BagOfWords::default(), test_config(true), dir.path().to_path_buf());
        let fresh = service.index_document(&doc_path).unwrap();

        // Overwrite the last float of the last entry with NaN
        let cache_file = dir
            .path()
            .join("indexes")
            .read_dir()
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .path();
        let mut file = std::fs::OpenOptions::new().write(true).open(&cache_file).unwrap();
        let len = file.metadata().unwrap().len();
        file.seek(SeekFrom::Start(len - 4)).unwrap();
        file.write_all(&f32::NAN.to_le_bytes()).unwrap();
        drop(file);

        let rebuilt = service.index_document(&doc_path).unwrap();
        assert_eq!(service.provider().batch_calls(), 2);

        let query = "Either party may end this agreement with notice.";
        let result = rebuilt.retrieve(query, service.provider(), 3).unwrap();
        assert!(result.iter().all(|c| c.confidence.is_finite()));
        assert_eq!(result, fresh.retrieve(query, service.provider(), 3).unwrap());
    }

    #[test]
    fn test_cache_from_other_model_is_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        let doc_path = write_nda(dir.path());

        let first = ClauseRetrievalService::new(
            BagOfWords::named("model-a"),
            test_config(true),
            dir.path().to_path_buf(),
        );
        first.index_document(&doc_path).unwrap();

        let second = ClauseRetrievalService::new(
            BagOfWords::named("model-b"),
            test_config(true),
            dir.path().to_path_buf(),
        );
        let doc = second.index_document(&doc_path).unwrap();
        assert_eq!(doc.len(), 3);
        assert_eq!(second.provider().batch_calls(), 1);
    }

    #[test]
    fn test_missing_document() {
        let dir = tempfile::tempdir().unwrap();
        for cache_index in [true, false] {
            let service = ClauseRetrievalService::new(
                BagOfWords::default(),
                test_config(cache_index),
                dir.path().to_path_buf(),
            );
            let result = service.index_document(&dir.path().join("missing.docx"));
            assert!(matches!(
                result,
                Err(ClauseRetrievalError::Document(DocumentError::NotFound(_)))
            ));
        }
    }

    #[test]
    fn test_retrieve_all() {
        let dir = tempfile::tempdir().unwrap();
        let doc_path = write_nda(dir.path());
        let service =
            ClauseRetrievalService::new(BagOfWords::default(), test_config(false), dir.path().to_path_buf());
        let doc = service.index_document(&doc_path).unwrap();

        let mut records = vec![
            ClauseRecord::new("Governing Law", "1", "This agreement is governed by Swiss law."),
            ClauseRecord::new("Term", "1", "Either party may terminate on notice."),
        ];
        service.retrieve_all(&doc, &mut records).unwrap();

        assert!(records.iter().all(|r| r.retrieved_clauses.len() == 2));
        assert_eq!(
            records[0].best_match().unwrap().clause,
            "Governing law is Switzerland."
        );
        assert_eq!(
            records[1].best_match().unwrap().clause,
            "Either party may terminate with 30 days notice."
        );
    }

    #[test]
    fn test_retrieve_all_surfaces_failing_clause() {
        let dir = tempfile::tempdir().unwrap();
        let doc_path = write_nda(dir.path());
        let service =
            ClauseRetrievalService::new(BagOfWords::default(), test_config(false), dir.path().to_path_buf());
        let doc = service.index_document(&doc_path).unwrap();

        let mut records = vec![
            ClauseRecord::new("Governing Law", "1", "governed by Swiss law"),
            ClauseRecord::new("Broken", "x", "???"),
            ClauseRecord::new("Term", "1", "terminate"),
        ];
        let result = service.retrieve_all(&doc, &mut records);

        match result {
            Err(ClauseRetrievalError::Clause {
                clause_name,
                source: RetrievalError::Index(IndexError::DegenerateVector { .. }),
                ..
            }) => assert_eq!(clause_name, "Broken"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(!records[0].retrieved_clauses.is_empty());
        assert!(records[2].retrieved_clauses.is_empty());
    }
}
