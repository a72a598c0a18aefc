pub mod chunker;
pub mod embedder;
pub mod generator;
pub mod index;
pub mod loader;
pub mod pipeline;
pub mod retriever;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use chunker::Chunker;
pub use embedder::{create_embedder, BatchEmbedder, Embedder, EmbedderConfig};
pub use generator::{build_prompt, create_generator, Generator, GeneratorConfig};
pub use index::{Metric, Neighbor, VectorIndex};
pub use loader::{collect_sources, load_source};
pub use pipeline::{
    Answer, BuildOptions, BuildOutcome, CorpusInfo, PipelineManager, PipelineOptions, PipelineState,
};
pub use retriever::Retriever;
pub use store::{
    CacheBundle, Chunk, ChunkTable, CorpusMetadata, Document, EmbeddedChunk, PersistenceManager,
    RetrievedChunk, SourceRecord,
};
