use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{RagError, RagResult};
use crate::rag::embedder::EmbedderConfig;
use crate::rag::generator::GeneratorConfig;
use crate::rag::index::Metric;

/// Looked up in the working directory when no `--config` is passed.
pub const DEFAULT_CONFIG_FILE: &str = "ragcache.toml";

/// Fills `embedding.api_key` when the config file leaves it unset.
pub const API_KEY_ENV: &str = "RAGCACHE_EMBEDDING_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub cache_dir: PathBuf,
    pub chunking: ChunkingConfig,
    pub embedding: EmbedderConfig,
    pub generation: GeneratorConfig,
    pub retrieval: RetrievalConfig,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("rag_cache"),
            chunking: ChunkingConfig::default(),
            embedding: EmbedderConfig::default(),
            generation: GeneratorConfig::default(),
            retrieval: RetrievalConfig::default(),
        }
    }
}

/// Window geometry in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size: 1000,
            overlap: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub metric: Metric,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            metric: Metric::L2,
        }
    }
}

impl RagConfig {
    pub fn load(path: &Path) -> RagResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| RagError::Config(format!("{}: {}", path.display(), e)))?;
        let mut config = Self::from_toml(&content)
            .map_err(|e| RagError::Config(format!("{}: {}", path.display(), e)))?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else `ragcache.toml` if present, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> RagResult<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        let default_path = Path::new(DEFAULT_CONFIG_FILE);
        if default_path.exists() {
            return Self::load(default_path);
        }

        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    fn apply_env(&mut self) {
        if self.embedding.api_key.is_some() {
            return;
        }
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.embedding.api_key = Some(key);
            }
        }
    }

    pub fn validate(&self) -> RagResult<()> {
        if self.chunking.size == 0 {
            return Err(RagError::InvalidConfiguration(
                "chunking.size must be greater than 0".to_string(),
            ));
        }
        if self.chunking.overlap >= self.chunking.size {
            return Err(RagError::InvalidConfiguration(format!(
                "chunking.overlap ({}) must be smaller than chunking.size ({})",
                self.chunking.overlap, self.chunking.size
            )));
        }
        if self.embedding.batch_size == 0 {
            return Err(RagError::InvalidConfiguration(
                "embedding.batch_size must be greater than 0".to_string(),
            ));
        }
        if self.embedding.dimensions == 0 {
            return Err(RagError::InvalidConfiguration(
                "embedding.dimensions must be greater than 0".to_string(),
            ));
        }
        if self.retrieval.top_k == 0 {
            return Err(RagError::InvalidConfiguration(
                "retrieval.top_k must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RagConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.chunking.size, 1000);
        assert_eq!(config.chunking.overlap, 200);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RagConfig::from_toml(
            r#"
            cache_dir = "/tmp/corpora"

            [chunking]
            size = 400

            [retrieval]
            metric = "inner_product"
            "#,
        )
        .unwrap();

        assert_eq!(config.cache_dir, PathBuf::from("/tmp/corpora"));
        assert_eq!(config.chunking.size, 400);
        assert_eq!(config.chunking.overlap, 200);
        assert_eq!(config.retrieval.metric, Metric::InnerProduct);
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.embedding.model, "nomic-embed-text");
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let mut config = RagConfig::default();
        config.chunking.overlap = config.chunking.size;
        assert!(matches!(
            config.validate(),
            Err(RagError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = RagConfig::default();
        config.embedding.batch_size = 0;
        assert!(matches!(
            config.validate(),
            Err(RagError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_load_reports_path_on_parse_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ragcache.toml");
        fs::write(&path, "[chunking\nsize = 3").unwrap();

        let err = RagConfig::load(&path).unwrap_err();
        assert!(matches!(err, RagError::Config(ref msg) if msg.contains("ragcache.toml")));
    }
}
