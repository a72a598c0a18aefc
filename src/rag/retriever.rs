use tracing::debug;

use crate::error::{RagError, RagResult};

use super::embedder::BatchEmbedder;
use super::store::{CacheBundle, RetrievedChunk};

/// Top-k lookup over a ready corpus.
pub struct Retriever<'a> {
    embedder: &'a BatchEmbedder,
    corpus: &'a CacheBundle,
}

impl<'a> Retriever<'a> {
    pub fn new(embedder: &'a BatchEmbedder, corpus: &'a CacheBundle) -> Self {
        Self { embedder, corpus }
    }

    /// Chunks most similar to `query`, best first, in index order.
    pub async fn retrieve(&self, query: &str, k: usize) -> RagResult<Vec<RetrievedChunk>> {
        if k == 0 {
            return Err(RagError::InvalidArgument(
                "k must be greater than 0".to_string(),
            ));
        }

        let built_with = &self.corpus.metadata.embedding_model;
        if self.embedder.model_id() != built_with.as_str() {
            return Err(RagError::ModelMismatch {
                expected: built_with.clone(),
                found: self.embedder.model_id().to_string(),
            });
        }

        if self.corpus.table.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed_query(query).await?;
        let neighbors = self.corpus.index.search(&query_vector, k)?;

        let results = neighbors
            .into_iter()
            .map(|neighbor| {
                self.corpus
                    .table
                    .get(neighbor.id)
                    .map(|row| RetrievedChunk::new(row.chunk.clone(), neighbor.score))
                    .ok_or_else(|| {
                        RagError::corrupt(
                            &self.corpus.metadata.corpus_name,
                            format!("index returned unknown chunk id {}", neighbor.id),
                        )
                    })
            })
            .collect::<RagResult<Vec<_>>>()?;

        debug!(
            corpus = %self.corpus.metadata.corpus_name,
            k,
            returned = results.len(),
            "Retrieved chunks"
        );
        Ok(results)
    }
}
