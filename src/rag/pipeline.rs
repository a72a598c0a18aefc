use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{ChunkingConfig, RagConfig};
use crate::error::{RagError, RagResult};

use super::chunker::Chunker;
use super::embedder::{BatchEmbedder, Embedder};
use super::generator::Generator;
use super::index::{Metric, VectorIndex};
use super::loader::{collect_sources, load_source};
use super::retriever::Retriever;
use super::store::{
    validate_corpus_name, CacheBundle, ChunkTable, CorpusMetadata, Document, PersistenceManager,
    RetrievedChunk, SourceRecord,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Uninitialized,
    Building,
    Loading,
    Ready,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Ignore an existing bundle and rebuild from `sources`.
    pub force_rebuild: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    Built,
    Loaded,
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    pub context: Vec<RetrievedChunk>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CorpusInfo {
    pub corpus_name: String,
    pub sources: Vec<String>,
    pub chunk_count: usize,
    pub embedding_model: String,
    pub embedding_dim: usize,
    pub metric: Metric,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub built_at: DateTime<Utc>,
}

impl From<&CorpusMetadata> for CorpusInfo {
    fn from(meta: &CorpusMetadata) -> Self {
        Self {
            corpus_name: meta.corpus_name.clone(),
            sources: meta.source_ids().into_iter().map(str::to_string).collect(),
            chunk_count: meta.chunk_count,
            embedding_model: meta.embedding_model.clone(),
            embedding_dim: meta.embedding_dim,
            metric: meta.metric,
            chunk_size: meta.chunk_size,
            chunk_overlap: meta.chunk_overlap,
            built_at: meta.build_timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub chunking: ChunkingConfig,
    pub batch_size: usize,
    pub metric: Metric,
    pub top_k: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from(&RagConfig::default())
    }
}

impl From<&RagConfig> for PipelineOptions {
    fn from(config: &RagConfig) -> Self {
        Self {
            chunking: config.chunking,
            batch_size: config.embedding.batch_size,
            metric: config.retrieval.metric,
            top_k: config.retrieval.top_k,
        }
    }
}

/// One corpus session: build or load once, then answer questions.
///
/// The corpus is only assigned on the transition to
/// [`PipelineState::Ready`] and is read-only afterwards; a different or
/// rebuilt corpus needs a new manager.
pub struct PipelineManager {
    store: PersistenceManager,
    embedder: BatchEmbedder,
    generator: Arc<dyn Generator>,
    chunker: Chunker,
    metric: Metric,
    top_k: usize,
    state: PipelineState,
    corpus: Option<CacheBundle>,
}

impl PipelineManager {
    pub fn new(
        store: PersistenceManager,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        options: PipelineOptions,
    ) -> RagResult<Self> {
        if options.top_k == 0 {
            return Err(RagError::InvalidConfiguration(
                "top_k must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            store,
            embedder: BatchEmbedder::new(embedder, options.batch_size)?,
            generator,
            chunker: Chunker::from_config(&options.chunking)?,
            metric: options.metric,
            top_k: options.top_k,
            state: PipelineState::Uninitialized,
            corpus: None,
        })
    }

    pub fn from_config(
        config: &RagConfig,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> RagResult<Self> {
        Self::new(
            PersistenceManager::new(&config.cache_dir),
            embedder,
            generator,
            PipelineOptions::from(config),
        )
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn store(&self) -> &PersistenceManager {
        &self.store
    }

    /// Reuse the cached bundle when `sources` is empty and one exists,
    /// otherwise chunk, embed, index and save `sources` as `corpus_name`,
    /// replacing any previous bundle.
    pub async fn build_pipeline(
        &mut self,
        sources: &[Document],
        corpus_name: &str,
        options: BuildOptions,
    ) -> RagResult<BuildOutcome> {
        if self.state != PipelineState::Uninitialized {
            return Err(RagError::InvalidArgument(format!(
                "pipeline is {:?}; create a new PipelineManager to build another corpus",
                self.state
            )));
        }
        validate_corpus_name(corpus_name)?;

        match self.transition(sources, corpus_name, options).await {
            Ok((bundle, outcome)) => {
                info!(
                    corpus = %corpus_name,
                    chunks = bundle.metadata.chunk_count,
                    outcome = ?outcome,
                    "Pipeline ready"
                );
                self.corpus = Some(bundle);
                self.state = PipelineState::Ready;
                Ok(outcome)
            }
            Err(e) => {
                self.state = PipelineState::Uninitialized;
                Err(e)
            }
        }
    }

    /// Load every path (directories are walked) and build from them.
    pub async fn build_from_paths(
        &mut self,
        paths: &[PathBuf],
        corpus_name: &str,
        options: BuildOptions,
    ) -> RagResult<BuildOutcome> {
        let documents = collect_sources(paths)?
            .iter()
            .map(|path| load_source(path))
            .collect::<RagResult<Vec<_>>>()?;
        self.build_pipeline(&documents, corpus_name, options).await
    }

    async fn transition(
        &mut self,
        sources: &[Document],
        corpus_name: &str,
        options: BuildOptions,
    ) -> RagResult<(CacheBundle, BuildOutcome)> {
        if !options.force_rebuild && sources.is_empty() && self.store.exists(corpus_name) {
            let bundle = self.load_cached(corpus_name)?;
            return Ok((bundle, BuildOutcome::Loaded));
        }

        self.state = PipelineState::Building;
        info!(
            corpus = %corpus_name,
            sources = sources.len(),
            force = options.force_rebuild,
            batch = self.embedder.batch_size(),
            "Building corpus"
        );
        let bundle = self.build_bundle(sources, corpus_name).await?;
        self.store.save(&bundle)?;
        Ok((bundle, BuildOutcome::Built))
    }

    /// A miss here means the bundle went away after `exists` saw it; with
    /// no sources to rebuild from, that is reported rather than replaced
    /// by an empty corpus.
    fn load_cached(&mut self, corpus_name: &str) -> RagResult<CacheBundle> {
        self.state = PipelineState::Loading;
        info!(corpus = %corpus_name, "Loading cached corpus");

        self.store.load(corpus_name)?.ok_or_else(|| {
            warn!(corpus = %corpus_name, "Cached corpus vanished before load");
            RagError::CacheMiss(corpus_name.to_string())
        })
    }

    async fn build_bundle(&self, sources: &[Document], corpus_name: &str) -> RagResult<CacheBundle> {
        if sources.is_empty() {
            warn!(corpus = %corpus_name, "No sources given, building an empty corpus");
        }

        let mut chunks = Vec::new();
        let mut records = Vec::with_capacity(sources.len());
        for doc in sources {
            let doc_chunks = self.chunker.chunk(&doc.source_id, &doc.text, chunks.len());
            debug!(source = %doc.source_id, chunks = doc_chunks.len(), "Chunked source");
            records.push(SourceRecord {
                source_id: doc.source_id.clone(),
                content_hash: hash_content(&doc.text),
                chunk_count: doc_chunks.len(),
            });
            chunks.extend(doc_chunks);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_all(&texts).await.map_err(|e| match e {
            RagError::EmbeddingFailure { index, reason } => {
                let source = chunks
                    .get(index)
                    .map(|c| c.source_id.as_str())
                    .unwrap_or("<unknown>");
                RagError::EmbeddingFailure {
                    index,
                    reason: format!("{} (source {})", reason, source),
                }
            }
            other => other,
        })?;

        let dim = self.embedder.dimensions();
        let table = ChunkTable::from_parts(chunks, embeddings, dim)?;
        let vectors: Vec<&[f32]> = table.embeddings().collect();
        let index = VectorIndex::build_with_dim(self.metric, dim, &vectors)?;

        let metadata = CorpusMetadata {
            corpus_name: corpus_name.to_string(),
            build_id: Uuid::new_v4(),
            sources: records,
            chunk_count: table.len(),
            embedding_dim: dim,
            embedding_model: self.embedder.model_id().to_string(),
            metric: self.metric,
            chunk_size: self.chunker.size(),
            chunk_overlap: self.chunker.overlap(),
            build_timestamp: Utc::now(),
        };

        Ok(CacheBundle {
            table,
            index,
            metadata,
        })
    }

    pub async fn retrieve(&self, question: &str, k: usize) -> RagResult<Vec<RetrievedChunk>> {
        let corpus = self.ready_corpus()?;
        Retriever::new(&self.embedder, corpus)
            .retrieve(question, k)
            .await
    }

    /// Retrieve the configured `top_k` chunks and generate an answer.
    pub async fn ask(&self, question: &str) -> RagResult<Answer> {
        self.ask_with_k(question, self.top_k).await
    }

    pub async fn ask_with_k(&self, question: &str, k: usize) -> RagResult<Answer> {
        let context = self.retrieve(question, k).await?;
        let passages: Vec<String> = context.iter().map(|r| r.chunk.text.clone()).collect();

        let answer = self
            .generator
            .generate(question, &passages)
            .await
            .map_err(|e| RagError::Generation(e.to_string()))?;

        Ok(Answer { answer, context })
    }

    pub fn info(&self) -> RagResult<CorpusInfo> {
        self.ready_corpus()
            .map(|corpus| CorpusInfo::from(&corpus.metadata))
    }

    fn ready_corpus(&self) -> RagResult<&CacheBundle> {
        match (&self.state, &self.corpus) {
            (PipelineState::Ready, Some(corpus)) => Ok(corpus),
            _ => Err(RagError::PipelineNotReady),
        }
    }
}

fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::testing::FakeEmbedder;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct EchoGenerator;

    #[async_trait]
    impl Generator for EchoGenerator {
        async fn generate(&self, question: &str, context: &[String]) -> anyhow::Result<String> {
            Ok(format!("{} [{}]", question, context.len()))
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl Generator for FailingGenerator {
        async fn generate(&self, _question: &str, _context: &[String]) -> anyhow::Result<String> {
            Err(anyhow::anyhow!("model offline"))
        }
    }

    fn options() -> PipelineOptions {
        PipelineOptions {
            chunking: ChunkingConfig {
                size: 10,
                overlap: 2,
            },
            batch_size: 4,
            metric: Metric::L2,
            top_k: 2,
        }
    }

    fn manager(dir: &TempDir, generator: Arc<dyn Generator>) -> PipelineManager {
        PipelineManager::new(
            PersistenceManager::new(dir.path()),
            Arc::new(FakeEmbedder::new("fake", 16)),
            generator,
            options(),
        )
        .unwrap()
    }

    fn docs() -> Vec<Document> {
        vec![
            Document::new("a.txt", "alpha beta gamma delta epsilon"),
            Document::new("b.txt", "zeta eta theta"),
        ]
    }

    #[test]
    fn test_hash_content() {
        let h1 = hash_content("hello");
        let h2 = hash_content("hello");
        let h3 = hash_content("world");

        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
        assert_eq!(h1.len(), 16);
    }

    #[test]
    fn test_info_carries_metadata() {
        let meta = CorpusMetadata {
            corpus_name: "demo".to_string(),
            build_id: Uuid::nil(),
            sources: vec![SourceRecord {
                source_id: "a.txt".to_string(),
                content_hash: hash_content("a"),
                chunk_count: 2,
            }],
            chunk_count: 2,
            embedding_dim: 4,
            embedding_model: "fake".to_string(),
            metric: Metric::Cosine,
            chunk_size: 10,
            chunk_overlap: 2,
            build_timestamp: Utc::now(),
        };

        let info = CorpusInfo::from(&meta);
        assert_eq!(info.sources, vec!["a.txt"]);
        assert_eq!(info.metric, Metric::Cosine);
        assert_eq!(info.chunk_count, 2);
    }

    #[tokio::test]
    async fn test_build_sets_ready_and_records_sources() {
        let dir = TempDir::new().unwrap();
        let mut pipeline = manager(&dir, Arc::new(EchoGenerator));
        assert_eq!(pipeline.state(), PipelineState::Uninitialized);

        let outcome = pipeline
            .build_pipeline(&docs(), "demo", BuildOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome, BuildOutcome::Built);
        assert_eq!(pipeline.state(), PipelineState::Ready);
        let info = pipeline.info().unwrap();
        assert_eq!(info.sources, vec!["a.txt", "b.txt"]);
        assert_eq!(info.embedding_model, "fake");
        assert_eq!(info.chunk_size, 10);
        assert!(pipeline.store().exists("demo"));
    }

    #[tokio::test]
    async fn test_chunk_ids_continue_across_sources() {
        let dir = TempDir::new().unwrap();
        let mut pipeline = manager(&dir, Arc::new(EchoGenerator));
        pipeline
            .build_pipeline(&docs(), "demo", BuildOptions::default())
            .await
            .unwrap();

        let corpus = pipeline.ready_corpus().unwrap();
        for (position, chunk) in corpus.table.chunks().enumerate() {
            assert_eq!(chunk.chunk_id, position);
        }
        let per_source: usize = corpus.metadata.sources.iter().map(|s| s.chunk_count).sum();
        assert_eq!(per_source, corpus.table.len());
    }

    #[tokio::test]
    async fn test_ask_before_build_is_not_ready() {
        let dir = TempDir::new().unwrap();
        let pipeline = manager(&dir, Arc::new(EchoGenerator));

        assert!(matches!(
            pipeline.ask("anything").await,
            Err(RagError::PipelineNotReady)
        ));
        assert!(matches!(pipeline.info(), Err(RagError::PipelineNotReady)));
    }

    #[tokio::test]
    async fn test_ask_uses_top_k_context() {
        let dir = TempDir::new().unwrap();
        let mut pipeline = manager(&dir, Arc::new(EchoGenerator));
        pipeline
            .build_pipeline(&docs(), "demo", BuildOptions::default())
            .await
            .unwrap();

        let answer = pipeline.ask("theta").await.unwrap();
        assert_eq!(answer.context.len(), 2);
        assert_eq!(answer.answer, "theta [2]");
    }

    #[tokio::test]
    async fn test_generator_error_is_wrapped() {
        let dir = TempDir::new().unwrap();
        let mut pipeline = manager(&dir, Arc::new(FailingGenerator));
        pipeline
            .build_pipeline(&docs(), "demo", BuildOptions::default())
            .await
            .unwrap();

        let err = pipeline.ask("alpha").await.unwrap_err();
        assert!(matches!(err, RagError::Generation(ref msg) if msg.contains("model offline")));
    }

    #[tokio::test]
    async fn test_second_build_rejected_once_ready() {
        let dir = TempDir::new().unwrap();
        let mut pipeline = manager(&dir, Arc::new(EchoGenerator));
        pipeline
            .build_pipeline(&docs(), "demo", BuildOptions::default())
            .await
            .unwrap();

        let err = pipeline
            .build_pipeline(&docs(), "other", BuildOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::InvalidArgument(_)));
        assert_eq!(pipeline.info().unwrap().corpus_name, "demo");
    }

    #[tokio::test]
    async fn test_failed_build_returns_to_uninitialized() {
        let dir = TempDir::new().unwrap();
        let mut pipeline = PipelineManager::new(
            PersistenceManager::new(dir.path()),
            Arc::new(FakeEmbedder::new("fake", 16).poisoned("theta")),
            Arc::new(EchoGenerator),
            options(),
        )
        .unwrap();

        let err = pipeline
            .build_pipeline(&docs(), "demo", BuildOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, RagError::EmbeddingFailure { ref reason, .. } if reason.contains("b.txt")));
        assert_eq!(pipeline.state(), PipelineState::Uninitialized);
        assert!(!pipeline.store().exists("demo"));
    }

    #[tokio::test]
    async fn test_invalid_corpus_name_rejected() {
        let dir = TempDir::new().unwrap();
        let mut pipeline = manager(&dir, Arc::new(EchoGenerator));

        let result = pipeline
            .build_pipeline(&docs(), "../escape", BuildOptions::default())
            .await;
        assert!(matches!(result, Err(RagError::InvalidArgument(_))));
        assert_eq!(pipeline.state(), PipelineState::Uninitialized);
    }

    #[test]
    fn test_zero_top_k_rejected() {
        let dir = TempDir::new().unwrap();
        let mut opts = options();
        opts.top_k = 0;

        let result = PipelineManager::new(
            PersistenceManager::new(dir.path()),
            Arc::new(FakeEmbedder::new("fake", 16)),
            Arc::new(EchoGenerator),
            opts,
        );
        assert!(matches!(result, Err(RagError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_vanished_cache_is_reported_not_rebuilt() {
        let dir = TempDir::new().unwrap();
        let mut pipeline = manager(&dir, Arc::new(EchoGenerator));

        let err = pipeline.load_cached("demo").unwrap_err();

        assert!(matches!(err, RagError::CacheMiss(ref corpus) if corpus == "demo"));
        assert!(!pipeline.store().exists("demo"));
        assert!(pipeline.store().list().unwrap().is_empty());
    }
}
