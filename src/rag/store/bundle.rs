use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{RagError, RagResult};
use crate::rag::index::VectorIndex;

use super::codec::{self, EMBEDDINGS_MAGIC, INDEX_MAGIC};
use super::types::{Chunk, ChunkTable, CorpusMetadata};

const METADATA_SUFFIX: &str = "_metadata.json";

/// Everything needed to answer queries for one corpus.
#[derive(Debug, Clone)]
pub struct CacheBundle {
    pub table: ChunkTable,
    pub index: VectorIndex,
    pub metadata: CorpusMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundlePaths {
    pub documents: PathBuf,
    pub embeddings: PathBuf,
    pub index: PathBuf,
    pub metadata: PathBuf,
}

impl BundlePaths {
    fn under(dir: &Path, corpus: &str) -> Self {
        Self {
            documents: dir.join(format!("{}_documents.json", corpus)),
            embeddings: dir.join(format!("{}_embeddings.bin", corpus)),
            index: dir.join(format!("{}_index.bin", corpus)),
            metadata: dir.join(format!("{}{}", corpus, METADATA_SUFFIX)),
        }
    }

    pub fn all(&self) -> [&Path; 4] {
        [
            &self.documents,
            &self.embeddings,
            &self.index,
            &self.metadata,
        ]
    }
}

#[derive(Serialize, Deserialize)]
struct DocumentsFile {
    build_id: Uuid,
    chunks: Vec<Chunk>,
}

/// Stores one bundle of four artifacts per corpus under `cache_dir`.
///
/// Saves are staged in a private directory and moved into place with the
/// metadata file last, so `load` only ever sees complete bundles. Writers
/// for the same corpus are serialized with an advisory file lock.
#[derive(Debug, Clone)]
pub struct PersistenceManager {
    cache_dir: PathBuf,
}

impl PersistenceManager {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn paths(&self, corpus: &str) -> BundlePaths {
        BundlePaths::under(&self.cache_dir, corpus)
    }

    /// True when all four artifacts are on disk. Does not read them.
    pub fn exists(&self, corpus: &str) -> bool {
        validate_corpus_name(corpus).is_ok()
            && self.paths(corpus).all().iter().all(|p| p.is_file())
    }

    pub fn save(&self, bundle: &CacheBundle) -> RagResult<()> {
        let corpus = bundle.metadata.corpus_name.as_str();
        validate_corpus_name(corpus)?;
        check_consistency(bundle).map_err(RagError::InvalidArgument)?;

        fs::create_dir_all(&self.cache_dir)?;
        let _lock = WriteLock::acquire(&self.cache_dir, corpus)?;

        let staging_dir = self
            .cache_dir
            .join(format!(".{}.staging-{}", corpus, bundle.metadata.build_id));
        let result = self
            .write_staged(&staging_dir, bundle)
            .and_then(|staged| self.publish(corpus, &staged));
        let _ = fs::remove_dir_all(&staging_dir);
        result?;

        info!(
            corpus = %corpus,
            chunks = bundle.metadata.chunk_count,
            dim = bundle.metadata.embedding_dim,
            dir = %self.cache_dir.display(),
            "Saved corpus bundle"
        );
        Ok(())
    }

    /// `Ok(None)` is a cache miss: at least one artifact is absent.
    pub fn load(&self, corpus: &str) -> RagResult<Option<CacheBundle>> {
        validate_corpus_name(corpus)?;
        let paths = self.paths(corpus);

        if let Some(missing) = paths.all().iter().find(|p| !p.is_file()) {
            debug!(corpus = %corpus, missing = %missing.display(), "Cache miss");
            return Ok(None);
        }

        let metadata: CorpusMetadata = serde_json::from_slice(&fs::read(&paths.metadata)?)
            .map_err(|e| RagError::corrupt(corpus, format!("metadata: {}", e)))?;
        let documents: DocumentsFile = serde_json::from_slice(&fs::read(&paths.documents)?)
            .map_err(|e| RagError::corrupt(corpus, format!("documents: {}", e)))?;
        let embeddings = codec::decode(EMBEDDINGS_MAGIC, &fs::read(&paths.embeddings)?)
            .map_err(|e| RagError::corrupt(corpus, format!("embeddings: {}", e)))?;
        let index_matrix = codec::decode(INDEX_MAGIC, &fs::read(&paths.index)?)
            .map_err(|e| RagError::corrupt(corpus, format!("index: {}", e)))?;

        if metadata.corpus_name != corpus {
            return Err(RagError::corrupt(
                corpus,
                format!("metadata names corpus '{}'", metadata.corpus_name),
            ));
        }
        if documents.build_id != metadata.build_id
            || embeddings.build_id != metadata.build_id
            || index_matrix.build_id != metadata.build_id
        {
            return Err(RagError::corrupt(
                corpus,
                "artifacts belong to different builds",
            ));
        }

        if embeddings.rows != metadata.chunk_count || index_matrix.rows != metadata.chunk_count {
            return Err(RagError::corrupt(
                corpus,
                format!(
                    "chunk_count {} but {} embedding rows and {} index rows",
                    metadata.chunk_count, embeddings.rows, index_matrix.rows
                ),
            ));
        }
        if embeddings.dim != metadata.embedding_dim || index_matrix.dim != metadata.embedding_dim {
            return Err(RagError::corrupt(
                corpus,
                format!(
                    "embedding_dim {} but embeddings have {} and index has {}",
                    metadata.embedding_dim, embeddings.dim, index_matrix.dim
                ),
            ));
        }

        let metric = codec::metric_from_tag(index_matrix.tag).ok_or_else(|| {
            RagError::corrupt(corpus, format!("unknown index metric tag {}", index_matrix.tag))
        })?;
        let index_rows: Vec<&[f32]> = (0..index_matrix.rows).map(|i| index_matrix.row(i)).collect();
        let index = VectorIndex::build_with_dim(metric, index_matrix.dim, &index_rows)
            .map_err(|e| RagError::corrupt(corpus, format!("index: {}", e)))?;

        if documents.chunks.len() != embeddings.rows {
            return Err(RagError::corrupt(
                corpus,
                format!(
                    "{} chunks but {} embedding rows",
                    documents.chunks.len(),
                    embeddings.rows
                ),
            ));
        }
        let vectors = (0..embeddings.rows)
            .map(|i| embeddings.row(i).to_vec())
            .collect();
        let table = ChunkTable::from_parts(documents.chunks, vectors, embeddings.dim)
            .map_err(|e| RagError::corrupt(corpus, e.to_string()))?;

        let bundle = CacheBundle {
            table,
            index,
            metadata,
        };
        check_consistency(&bundle).map_err(|reason| RagError::corrupt(corpus, reason))?;

        info!(
            corpus = %corpus,
            chunks = bundle.metadata.chunk_count,
            model = %bundle.metadata.embedding_model,
            "Loaded corpus bundle from cache"
        );
        Ok(Some(bundle))
    }

    /// Names of corpora with a finished bundle, sorted.
    pub fn list(&self) -> RagResult<Vec<String>> {
        let entries = match fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if let Some(corpus) = file_name.strip_suffix(METADATA_SUFFIX) {
                if self.exists(corpus) {
                    names.push(corpus.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }

    /// Delete a bundle. Returns whether anything was removed.
    pub fn remove(&self, corpus: &str) -> RagResult<bool> {
        validate_corpus_name(corpus)?;
        if !self.cache_dir.is_dir() {
            return Ok(false);
        }

        let _lock = WriteLock::acquire(&self.cache_dir, corpus)?;
        let paths = self.paths(corpus);

        // Metadata first so a partial removal reads as a miss.
        let mut removed = false;
        for path in [
            &paths.metadata,
            &paths.documents,
            &paths.embeddings,
            &paths.index,
        ] {
            removed |= remove_if_exists(path)?;
        }

        if removed {
            info!(corpus = %corpus, "Removed corpus bundle");
        }
        Ok(removed)
    }

    /// Total bytes of the bundle's artifacts on disk.
    pub fn disk_usage(&self, corpus: &str) -> RagResult<u64> {
        let mut total = 0;
        for path in self.paths(corpus).all() {
            match fs::metadata(path) {
                Ok(meta) => total += meta.len(),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(total)
    }

    fn write_staged(&self, staging_dir: &Path, bundle: &CacheBundle) -> RagResult<BundlePaths> {
        fs::create_dir_all(staging_dir)?;
        let corpus = bundle.metadata.corpus_name.as_str();
        let build_id = bundle.metadata.build_id;
        let staged = BundlePaths::under(staging_dir, corpus);

        let documents = DocumentsFile {
            build_id,
            chunks: bundle.table.chunks().cloned().collect(),
        };
        fs::write(&staged.documents, serde_json::to_vec(&documents)?)?;

        fs::write(
            &staged.embeddings,
            codec::encode(
                EMBEDDINGS_MAGIC,
                build_id,
                0,
                bundle.table.dim(),
                bundle.table.embeddings(),
            ),
        )?;

        fs::write(
            &staged.index,
            codec::encode(
                INDEX_MAGIC,
                build_id,
                codec::metric_tag(bundle.index.metric()),
                bundle.index.dim(),
                bundle.index.vectors(),
            ),
        )?;

        fs::write(&staged.metadata, serde_json::to_vec_pretty(&bundle.metadata)?)?;

        Ok(staged)
    }

    fn publish(&self, corpus: &str, staged: &BundlePaths) -> RagResult<()> {
        let target = self.paths(corpus);

        // Hide the previous bundle before any data artifact is replaced.
        remove_if_exists(&target.metadata)?;

        fs::rename(&staged.documents, &target.documents)?;
        fs::rename(&staged.embeddings, &target.embeddings)?;
        fs::rename(&staged.index, &target.index)?;
        fs::rename(&staged.metadata, &target.metadata)?;
        Ok(())
    }
}

/// Corpus names become file name prefixes: ASCII letters, digits, `-`, `_`
/// and `.`, not starting with `.`.
pub fn validate_corpus_name(name: &str) -> RagResult<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(RagError::InvalidArgument(format!(
            "invalid corpus name '{}': use letters, digits, '-', '_' or '.'",
            name
        )))
    }
}

fn check_consistency(bundle: &CacheBundle) -> Result<(), String> {
    let meta = &bundle.metadata;
    let (chunks, vectors) = (bundle.table.len(), bundle.index.len());

    if chunks != meta.chunk_count || vectors != meta.chunk_count {
        return Err(format!(
            "chunk_count {} but {} chunks and {} index entries",
            meta.chunk_count, chunks, vectors
        ));
    }
    if bundle.table.dim() != meta.embedding_dim || bundle.index.dim() != meta.embedding_dim {
        return Err(format!(
            "embedding_dim {} but embeddings have {} and index has {}",
            meta.embedding_dim,
            bundle.table.dim(),
            bundle.index.dim()
        ));
    }
    if bundle.index.metric() != meta.metric {
        return Err(format!(
            "metadata metric {} but index built with {}",
            meta.metric,
            bundle.index.metric()
        ));
    }
    Ok(())
}

fn remove_if_exists(path: &Path) -> RagResult<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Exclusive advisory lock on `<corpus>.lock`, released on drop.
struct WriteLock {
    file: File,
}

impl WriteLock {
    fn acquire(cache_dir: &Path, corpus: &str) -> RagResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(cache_dir.join(format!("{}.lock", corpus)))?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(Self { file }),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                Err(RagError::CacheLocked(corpus.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
