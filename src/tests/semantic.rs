//! Retrieval with a real embedding model.
//!
//! These tests require model download and are marked #[ignore] by default.
//! Run with: cargo test semantic -- --ignored

use crate::document::ParagraphCollection;
use crate::semantic::{l2_norm, DocumentIndex, EmbeddingModel, EmbeddingProvider, IndexCache};

use super::nda_paragraphs;

#[test]
#[ignore = "requires model download (~23MB)"]
fn test_real_model_retrieval_flow() {
    let dir = tempfile::tempdir().unwrap();

    let model = EmbeddingModel::new("all-MiniLM-L6-v2", dir.path().to_path_buf(), None)
        .expect("Failed to initialize embedding model");
    assert_eq!(model.dimensions(), 384);

    let doc = DocumentIndex::build(nda_paragraphs(), &model).expect("Failed to index");
    assert_eq!(doc.index().dimensions(), 384);
    for v in doc.index().vectors() {
        assert!((l2_norm(v) - 1.0).abs() < 1e-4);
    }

    let result = doc
        .retrieve("This agreement is governed by Swiss law.", &model, 2)
        .expect("Retrieval failed");
    assert_eq!(result.len(), 2);
    assert_eq!(result[0].clause, "Governing law is Switzerland.");
    assert!(result[0].confidence <= 1.0 + 1e-5);

    // Cached vectors give the same answer
    let cache = IndexCache::new(dir.path().join("indexes"));
    let hash = [7u8; 32];
    cache.save(&doc, &model.model_id_hash(), &hash).unwrap();
    let loaded = cache.load(&model.model_id_hash(), &hash).unwrap();
    assert_eq!(
        loaded
            .retrieve("This agreement is governed by Swiss law.", &model, 2)
            .unwrap(),
        result
    );
}

#[test]
#[ignore = "requires model download (~23MB)"]
fn test_real_model_dimension_is_stable() {
    let dir = tempfile::tempdir().unwrap();
    let model = EmbeddingModel::new("all-MiniLM-L6-v2", dir.path().to_path_buf(), None).unwrap();

    let texts = ParagraphCollection::from_texts(["short", "a somewhat longer paragraph of text"]);
    let embeddings = model.embed_batch(texts.as_slice()).unwrap();
    assert_eq!(embeddings.len(), 2);
    assert!(embeddings.iter().all(|e| e.len() == model.dimensions()));
}
