//! Embedding providers.
//!
//! [`EmbeddingProvider`] is the seam between the retrieval core and whatever
//! turns text into vectors. [`EmbeddingModel`] is the local fastembed-backed
//! implementation; models are downloaded into `<base>/models` on first use.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use fastembed::{InitOptions, TextEmbedding};

/// Used when the caller does not pass a download timeout
const FALLBACK_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Accepted model names. Lookup ignores case, `-` and `.`.
const SUPPORTED_MODELS: [(&str, fastembed::EmbeddingModel); 6] = [
    ("all-MiniLM-L6-v2", fastembed::EmbeddingModel::AllMiniLML6V2),
    ("all-MiniLM-L6-v2-q", fastembed::EmbeddingModel::AllMiniLML6V2Q),
    ("bge-small-en-v1.5", fastembed::EmbeddingModel::BGESmallENV15),
    ("bge-small-en-v1.5-q", fastembed::EmbeddingModel::BGESmallENV15Q),
    ("bge-base-en-v1.5", fastembed::EmbeddingModel::BGEBaseENV15),
    ("bge-large-en-v1.5", fastembed::EmbeddingModel::BGELargeENV15),
];

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("could not load embedding model: {0}")]
    InitFailed(String),

    #[error("embedding provider failed: {0}")]
    EmbeddingFailed(String),

    #[error("unsupported embedding model: {0}")]
    InvalidModel(String),
}

/// Something that maps text to fixed-dimension vectors.
///
/// Implementations must return exactly one vector per input, in input order,
/// and keep the dimension constant for their lifetime. Errors are returned as
/// they happen; retrying is up to the caller.
pub trait EmbeddingProvider {
    /// Identifier of the underlying model, used to key cached indexes.
    fn name(&self) -> &str;

    /// Embed a batch of texts in one call.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single text as a batch of one.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_batch(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("empty batch result".to_string()))
    }

    /// SHA256 of the model name, stored in index cache headers.
    fn model_id_hash(&self) -> [u8; 32] {
        use sha2::{Digest, Sha256};
        Sha256::digest(self.name().as_bytes()).into()
    }
}

/// Local sentence-embedding model.
///
/// fastembed needs `&mut self` to embed, so the model sits behind a `Mutex`.
pub struct EmbeddingModel {
    inner: Mutex<TextEmbedding>,
    name: String,
    dimensions: usize,
}

impl EmbeddingModel {
    /// Load `model_name`, downloading it into `<cache_dir>/models` if needed.
    pub fn new(
        model_name: &str,
        cache_dir: PathBuf,
        download_timeout: Option<Duration>,
    ) -> Result<Self, EmbeddingError> {
        let variant = lookup_model(model_name)?;

        let models_dir = cache_dir.join("models");
        std::fs::create_dir_all(&models_dir).map_err(|e| {
            EmbeddingError::InitFailed(format!("{}: {e}", models_dir.display()))
        })?;

        log::info!(
            "Loading embedding model '{}' (download timeout {}s)",
            model_name,
            download_timeout
                .unwrap_or(FALLBACK_DOWNLOAD_TIMEOUT)
                .as_secs()
        );

        let mut inner = TextEmbedding::try_new(
            InitOptions::new(variant)
                .with_cache_dir(models_dir)
                .with_show_download_progress(true),
        )
        .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

        // fastembed does not report the output size, so embed once to learn it
        let dimensions = inner
            .embed(vec!["dimension check"], None)
            .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?
            .first()
            .map(Vec::len)
            .ok_or_else(|| EmbeddingError::InitFailed("model returned no embedding".to_string()))?;

        Ok(Self {
            inner: Mutex::new(inner),
            name: model_name.to_string(),
            dimensions,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }
}

fn canonical(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '-' | '.' | '_'))
        .flat_map(char::to_lowercase)
        .collect()
}

fn lookup_model(name: &str) -> Result<fastembed::EmbeddingModel, EmbeddingError> {
    let wanted = canonical(name);

    SUPPORTED_MODELS
        .iter()
        .find(|(known, _)| canonical(known) == wanted)
        .map(|(_, variant)| variant.clone())
        .ok_or_else(|| {
            let known: Vec<&str> = SUPPORTED_MODELS.iter().map(|(n, _)| *n).collect();
            EmbeddingError::InvalidModel(format!("{name} (expected one of {})", known.join(", ")))
        })
}

impl EmbeddingProvider for EmbeddingModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut inner = self
            .inner
            .lock()
            .map_err(|_| EmbeddingError::EmbeddingFailed("model lock poisoned".to_string()))?;

        let embeddings = inner
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;

        if embeddings.len() != texts.len() {
            return Err(EmbeddingError::EmbeddingFailed(format!(
                "{} texts in, {} vectors out",
                texts.len(),
                embeddings.len()
            )));
        }

        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    impl EmbeddingProvider for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    #[test]
    fn test_lookup_is_lenient() {
        assert!(matches!(
            lookup_model("ALL-MiniLM-L6-v2"),
            Ok(fastembed::EmbeddingModel::AllMiniLML6V2)
        ));
        assert!(matches!(
            lookup_model("bgesmallenv15q"),
            Ok(fastembed::EmbeddingModel::BGESmallENV15Q)
        ));
        assert!(matches!(
            lookup_model("nonexistent-model"),
            Err(EmbeddingError::InvalidModel(_))
        ));
    }

    #[test]
    fn test_unknown_model_fails_before_download() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = EmbeddingModel::new("nonexistent-model", temp_dir.path().to_path_buf(), None);
        assert!(matches!(result, Err(EmbeddingError::InvalidModel(_))));
        assert!(!temp_dir.path().join("models").exists());
    }

    #[test]
    fn test_default_embed_is_batch_of_one() {
        let provider = Fixed("fixed");
        assert_eq!(provider.embed("abc").unwrap(), vec![3.0, 1.0]);
    }

    #[test]
    fn test_model_id_hash_depends_on_name() {
        assert_eq!(Fixed("a").model_id_hash(), Fixed("a").model_id_hash());
        assert_ne!(Fixed("a").model_id_hash(), Fixed("b").model_id_hash());
    }

    #[test]
    #[ignore = "requires model download"]
    fn test_load_and_embed() {
        let temp_dir = tempfile::tempdir().unwrap();
        let model =
            EmbeddingModel::new("all-MiniLM-L6-v2", temp_dir.path().to_path_buf(), None).unwrap();
        assert_eq!(model.name(), "all-MiniLM-L6-v2");
        assert_eq!(model.dimensions(), 384);

        let texts = vec![
            "Confidentiality obligations survive termination.".to_string(),
            "Governing law is Switzerland.".to_string(),
        ];
        let embeddings = model.embed_batch(&texts).unwrap();
        assert_eq!(embeddings.len(), 2);
        assert!(embeddings.iter().all(|e| e.len() == 384));
    }
}
