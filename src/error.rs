use std::path::PathBuf;

use thiserror::Error;

pub type RagResult<T> = Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Embedding failed at chunk {index}: {reason}")]
    EmbeddingFailure { index: usize, reason: String },

    #[error("Dimension mismatch at vector {index}: expected {expected}, found {found}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("Embedding model mismatch: corpus was built with '{expected}', query uses '{found}'")]
    ModelMismatch { expected: String, found: String },

    #[error("Corrupt cache for corpus '{corpus}': {reason}")]
    CorruptCache { corpus: String, reason: String },

    #[error("Cache for corpus '{0}' is being written by another process")]
    CacheLocked(String),

    #[error("Cached corpus '{0}' disappeared while loading; build it again from sources")]
    CacheMiss(String),

    #[error("Pipeline not ready: build or load a corpus before asking questions")]
    PipelineNotReady,

    #[error("Unsupported format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("Failed to load {}: {reason}", path.display())]
    LoadError { path: PathBuf, reason: String },

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RagError {
    pub(crate) fn corrupt(corpus: &str, reason: impl Into<String>) -> Self {
        RagError::CorruptCache {
            corpus: corpus.to_string(),
            reason: reason.into(),
        }
    }
}
