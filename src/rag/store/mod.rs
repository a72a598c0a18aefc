mod bundle;
mod codec;
mod types;

pub use bundle::{validate_corpus_name, BundlePaths, CacheBundle, PersistenceManager};
pub use types::{
    Chunk, ChunkTable, CorpusMetadata, Document, EmbeddedChunk, RetrievedChunk, SourceRecord,
};
