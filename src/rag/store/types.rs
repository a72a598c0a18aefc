use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RagError, RagResult};
use crate::rag::index::Metric;

/// Extracted text of one source, as handed over by a loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub source_id: String,
    pub text: String,
}

impl Document {
    pub fn new(source_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            text: text.into(),
        }
    }
}

/// A window of a document's text. Offsets count characters, not bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: usize,
    pub source_id: String,
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// Chunks and their embeddings stored row by row, keyed by `chunk_id`.
///
/// Row `i` always holds chunk `i` together with its embedding, so the two
/// sequences cannot drift apart. The only constructor checks that every
/// chunk id equals its position and every vector has the table dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkTable {
    rows: Vec<EmbeddedChunk>,
    dim: usize,
}

impl ChunkTable {
    pub fn empty(dim: usize) -> Self {
        Self {
            rows: Vec::new(),
            dim,
        }
    }

    pub fn from_parts(chunks: Vec<Chunk>, embeddings: Vec<Vec<f32>>, dim: usize) -> RagResult<Self> {
        if chunks.len() != embeddings.len() {
            return Err(RagError::EmbeddingFailure {
                index: chunks.len().min(embeddings.len()),
                reason: format!(
                    "{} chunks but {} embeddings",
                    chunks.len(),
                    embeddings.len()
                ),
            });
        }

        let mut rows = Vec::with_capacity(chunks.len());
        for (position, (chunk, embedding)) in chunks.into_iter().zip(embeddings).enumerate() {
            if chunk.chunk_id != position {
                return Err(RagError::InvalidArgument(format!(
                    "chunk at position {} has chunk_id {}",
                    position, chunk.chunk_id
                )));
            }
            if embedding.len() != dim {
                return Err(RagError::DimensionMismatch {
                    index: position,
                    expected: dim,
                    found: embedding.len(),
                });
            }
            rows.push(EmbeddedChunk { chunk, embedding });
        }

        Ok(Self { rows, dim })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn get(&self, chunk_id: usize) -> Option<&EmbeddedChunk> {
        self.rows.get(chunk_id)
    }

    pub fn chunks(&self) -> impl ExactSizeIterator<Item = &Chunk> {
        self.rows.iter().map(|row| &row.chunk)
    }

    pub fn embeddings(&self) -> impl ExactSizeIterator<Item = &[f32]> {
        self.rows.iter().map(|row| row.embedding.as_slice())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub source_id: String,
    pub content_hash: String,
    pub chunk_count: usize,
}

/// Describes a built corpus. Written last during a save, so its presence
/// marks a finished bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusMetadata {
    pub corpus_name: String,
    pub build_id: Uuid,
    pub sources: Vec<SourceRecord>,
    pub chunk_count: usize,
    pub embedding_dim: usize,
    pub embedding_model: String,
    pub metric: Metric,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub build_timestamp: DateTime<Utc>,
}

impl CorpusMetadata {
    pub fn source_ids(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.source_id.as_str()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub score: f32,
    pub source_id: String,
}

impl RetrievedChunk {
    pub fn new(chunk: Chunk, score: f32) -> Self {
        let source_id = chunk.source_id.clone();
        Self {
            chunk,
            score,
            source_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: usize, text: &str) -> Chunk {
        Chunk {
            chunk_id: id,
            source_id: "a.txt".to_string(),
            text: text.to_string(),
            start_offset: 0,
            end_offset: text.chars().count(),
        }
    }

    #[test]
    fn test_table_rows_pair_chunk_with_embedding() {
        let table = ChunkTable::from_parts(
            vec![chunk(0, "first"), chunk(1, "second")],
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            2,
        )
        .unwrap();

        assert_eq!(table.len(), 2);
        let row = table.get(1).unwrap();
        assert_eq!(row.chunk.text, "second");
        assert_eq!(row.embedding, vec![0.0, 1.0]);
        assert!(table.get(2).is_none());
    }

    #[test]
    fn test_table_rejects_count_mismatch() {
        let err = ChunkTable::from_parts(vec![chunk(0, "a"), chunk(1, "b")], vec![vec![1.0]], 1)
            .unwrap_err();
        assert!(matches!(err, RagError::EmbeddingFailure { index: 1, .. }));
    }

    #[test]
    fn test_table_rejects_out_of_order_ids() {
        let err = ChunkTable::from_parts(vec![chunk(1, "a")], vec![vec![1.0]], 1).unwrap_err();
        assert!(matches!(err, RagError::InvalidArgument(_)));
    }

    #[test]
    fn test_table_rejects_wrong_dimension() {
        let err = ChunkTable::from_parts(
            vec![chunk(0, "a"), chunk(1, "b")],
            vec![vec![1.0, 2.0], vec![1.0]],
            2,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            RagError::DimensionMismatch {
                index: 1,
                expected: 2,
                found: 1
            }
        ));
    }
}
