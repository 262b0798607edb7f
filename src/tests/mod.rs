//! Shared fixtures and cross-module tests.

mod semantic;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::document::ParagraphCollection;
use crate::semantic::{EmbeddingError, EmbeddingProvider};

const BAG_DIMENSIONS: usize = 4096;

pub const NDA_PARAGRAPHS: [&str; 3] = [
    "Confidentiality obligations survive termination.",
    "Governing law is Switzerland.",
    "Either party may terminate with 30 days notice.",
];

pub fn nda_paragraphs() -> ParagraphCollection {
    ParagraphCollection::from_texts(NDA_PARAGRAPHS)
}

/// Write the NDA as a plain text document (with a blank line to skip).
pub fn write_nda(dir: &Path) -> PathBuf {
    let path = dir.join("nda.txt");
    let text = format!(
        "{}\n\n{}\n{}\n",
        NDA_PARAGRAPHS[0], NDA_PARAGRAPHS[1], NDA_PARAGRAPHS[2]
    );
    std::fs::write(&path, text).unwrap();
    path
}

/// Deterministic bag-of-words embedder for tests that must not download a
/// model. Lowercased alphanumeric tokens are hashed (FNV-1a) into a fixed
/// number of buckets and counted, so paragraphs sharing words with the query
/// score higher. Text without any token embeds to the zero vector.
pub struct BagOfWords {
    name: String,
    fail: bool,
    batch_calls: AtomicUsize,
}

impl Default for BagOfWords {
    fn default() -> Self {
        Self::named("bag-of-words")
    }
}

impl BagOfWords {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fail: false,
            batch_calls: AtomicUsize::new(0),
        }
    }

    /// A provider whose every call fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Number of `embed_batch` calls made so far, single embeds included.
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    fn vectorize(text: &str) -> Vec<f32> {
        let mut v = vec![0.0; BAG_DIMENSIONS];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            v[fnv1a(&token.to_lowercase()) % BAG_DIMENSIONS] += 1.0;
        }
        v
    }
}

impl EmbeddingProvider for BagOfWords {
    fn name(&self) -> &str {
        &self.name
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(EmbeddingError::EmbeddingFailed(
                "provider unavailable".to_string(),
            ));
        }

        Ok(texts.iter().map(|t| Self::vectorize(t)).collect())
    }
}

fn fnv1a(token: &str) -> usize {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in token.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash as usize
}
