use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::semantic::DEFAULT_MODEL;
use crate::storage::{BackendLocal, StorageManager};

const CONFIG_FILE: &str = "config.yaml";

/// Default number of counterparty paragraphs retrieved per template clause
pub const DEFAULT_TOP_K: usize = 3;
/// Default model download timeout in seconds
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config is malformed: {0}")]
    Malformed(#[from] serde_yml::Error),

    #[error("config file is not valid utf8")]
    NotUtf8,

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Configuration for paragraph embedding and clause retrieval
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RetrievalConfig {
    /// Model name for embeddings (e.g., "all-MiniLM-L6-v2")
    #[serde(default = "default_model")]
    pub model: String,

    /// Number of paragraphs retrieved for every template clause
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Timeout for model download in seconds
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    /// Persist built document indexes under `<base>/indexes`
    #[serde(default = "default_cache_index")]
    pub cache_index: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            top_k: DEFAULT_TOP_K,
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            cache_index: true,
        }
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

fn default_cache_index() -> bool {
    true
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "retrieval.model must not be empty".to_string(),
            ));
        }

        if self.top_k == 0 {
            return Err(ConfigError::Invalid(
                "retrieval.top_k must be a positive integer, got 0".to_string(),
            ));
        }

        if self.download_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "retrieval.download_timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Apply per-invocation overrides, then validate the result.
    pub fn with_overrides(
        mut self,
        top_k: Option<usize>,
        model: Option<String>,
        no_cache: bool,
    ) -> Result<Self, ConfigError> {
        if let Some(top_k) = top_k {
            self.top_k = top_k;
        }
        if let Some(model) = model {
            self.model = model;
        }
        if no_cache {
            self.cache_index = false;
        }

        self.validate()?;
        Ok(self)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: String,
}

impl Config {
    pub fn load_with(base_path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let store = BackendLocal::new(base_path.as_ref())?;

        // create new if does not exist
        if !store.exists(CONFIG_FILE) {
            store.write(
                CONFIG_FILE,
                serde_yml::to_string(&Self::default())?.as_bytes(),
            )?;
        }

        let config_str =
            String::from_utf8(store.read(CONFIG_FILE)?).map_err(|_| ConfigError::NotUtf8)?;
        let mut config: Self = serde_yml::from_str(&config_str)?;

        config.base_path = base_path.as_ref().to_string_lossy().to_string();

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            log::debug!("upgrading {CONFIG_FILE} with new defaults");
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let store = BackendLocal::new(&self.base_path)?;

        let config_str = serde_yml::to_string(&self)?;
        store.write(CONFIG_FILE, config_str.as_bytes())?;
        Ok(())
    }
}
