use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{RagError, RagResult};

use super::Embedder;

/// Runs an [`Embedder`] over bounded batches and validates what comes back.
///
/// Output always has one vector of `dimensions()` finite values per input,
/// in input order. A batch that fails or returns the wrong number of
/// vectors is retried text by text so the failure can be pinned to a
/// single chunk index.
#[derive(Clone)]
pub struct BatchEmbedder {
    inner: Arc<dyn Embedder>,
    batch_size: usize,
}

impl BatchEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, batch_size: usize) -> RagResult<Self> {
        if batch_size == 0 {
            return Err(RagError::InvalidConfiguration(
                "embedding batch size must be greater than 0".to_string(),
            ));
        }
        Ok(Self { inner, batch_size })
    }

    pub fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    pub fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub async fn embed_all(&self, texts: &[String]) -> RagResult<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());

        for (batch_no, batch) in texts.chunks(self.batch_size).enumerate() {
            let offset = batch_no * self.batch_size;
            debug!(offset, size = batch.len(), "Embedding batch");

            match self.inner.embed_batch(batch).await {
                Ok(batch_vectors) if batch_vectors.len() == batch.len() => {
                    for (i, vector) in batch_vectors.into_iter().enumerate() {
                        vectors.push(self.normalize(offset + i, vector)?);
                    }
                }
                Ok(batch_vectors) => {
                    warn!(
                        offset,
                        expected = batch.len(),
                        returned = batch_vectors.len(),
                        "Embedding batch misaligned, retrying one by one"
                    );
                    self.embed_individually(batch, offset, &mut vectors).await?;
                }
                Err(e) => {
                    warn!(offset, error = %e, "Embedding batch failed, retrying one by one");
                    self.embed_individually(batch, offset, &mut vectors).await?;
                }
            }
        }

        Ok(vectors)
    }

    pub async fn embed_query(&self, text: &str) -> RagResult<Vec<f32>> {
        let mut vectors = self.inner.embed_batch(&[text.to_string()]).await.map_err(|e| {
            RagError::EmbeddingFailure {
                index: 0,
                reason: format!("query: {}", e),
            }
        })?;
        if vectors.len() != 1 {
            return Err(RagError::EmbeddingFailure {
                index: 0,
                reason: format!("query: model returned {} vectors", vectors.len()),
            });
        }
        self.normalize(0, vectors.remove(0))
    }

    async fn embed_individually(
        &self,
        batch: &[String],
        offset: usize,
        vectors: &mut Vec<Vec<f32>>,
    ) -> RagResult<()> {
        for (i, text) in batch.iter().enumerate() {
            let index = offset + i;
            let mut single = self
                .inner
                .embed_batch(std::slice::from_ref(text))
                .await
                .map_err(|e| RagError::EmbeddingFailure {
                    index,
                    reason: e.to_string(),
                })?;
            if single.len() != 1 {
                return Err(RagError::EmbeddingFailure {
                    index,
                    reason: format!("model returned {} vectors for one text", single.len()),
                });
            }
            vectors.push(self.normalize(index, single.remove(0))?);
        }
        Ok(())
    }

    fn normalize(&self, index: usize, vector: Vec<f32>) -> RagResult<Vec<f32>> {
        let expected = self.dimensions();
        if vector.len() != expected {
            return Err(RagError::EmbeddingFailure {
                index,
                reason: format!(
                    "model returned {} values, expected {}",
                    vector.len(),
                    expected
                ),
            });
        }
        if let Some(pos) = vector.iter().position(|v| !v.is_finite()) {
            return Err(RagError::EmbeddingFailure {
                index,
                reason: format!("non-finite value at position {}", pos),
            });
        }
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::testing::FakeEmbedder;
    use anyhow::Result;
    use async_trait::async_trait;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_output_aligned_with_input() {
        let fake = Arc::new(FakeEmbedder::new("fake", 8));
        let embedder = BatchEmbedder::new(fake.clone(), 2).unwrap();
        let inputs = texts(&["alpha", "beta", "gamma", "delta", "epsilon"]);

        let vectors = embedder.embed_all(&inputs).await.unwrap();

        assert_eq!(vectors.len(), inputs.len());
        for (text, vector) in inputs.iter().zip(&vectors) {
            assert_eq!(vector, &fake.vector_for(text));
        }
        assert_eq!(fake.batch_calls(), 3);
    }

    #[tokio::test]
    async fn test_failure_names_offending_chunk() {
        let fake = Arc::new(FakeEmbedder::new("fake", 8).poisoned("BAD"));
        let embedder = BatchEmbedder::new(fake, 4).unwrap();
        let inputs = texts(&["ok", "fine", "good", "BAD chunk", "later"]);

        let err = embedder.embed_all(&inputs).await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingFailure { index: 3, .. }));
    }

    #[tokio::test]
    async fn test_misaligned_batch_recovered_one_by_one() {
        let fake = Arc::new(FakeEmbedder::new("fake", 4).truncating());
        let embedder = BatchEmbedder::new(fake.clone(), 3).unwrap();
        let inputs = texts(&["one", "two", "three"]);

        let vectors = embedder.embed_all(&inputs).await.unwrap();

        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors[2], fake.vector_for("three"));
        // One batch call plus three single-text retries.
        assert_eq!(fake.batch_calls(), 4);
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_calls() {
        let fake = Arc::new(FakeEmbedder::new("fake", 4));
        let embedder = BatchEmbedder::new(fake.clone(), 3).unwrap();
        assert!(embedder.embed_all(&[]).await.unwrap().is_empty());
        assert_eq!(fake.batch_calls(), 0);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let fake = Arc::new(FakeEmbedder::new("fake", 4));
        assert!(matches!(
            BatchEmbedder::new(fake, 0),
            Err(RagError::InvalidConfiguration(_))
        ));
    }

    struct BrokenEmbedder {
        output: Vec<f32>,
    }

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| self.output.clone()).collect())
        }

        fn dimensions(&self) -> usize {
            3
        }

        fn model_id(&self) -> &str {
            "broken"
        }
    }

    #[tokio::test]
    async fn test_wrong_dimension_is_never_padded() {
        let embedder = BatchEmbedder::new(
            Arc::new(BrokenEmbedder {
                output: vec![1.0, 2.0],
            }),
            8,
        )
        .unwrap();

        let err = embedder.embed_all(&texts(&["a", "b"])).await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingFailure { index: 0, .. }));
    }

    #[tokio::test]
    async fn test_non_finite_values_rejected() {
        let embedder = BatchEmbedder::new(
            Arc::new(BrokenEmbedder {
                output: vec![1.0, f32::NAN, 0.0],
            }),
            8,
        )
        .unwrap();

        let err = embedder.embed_query("question").await.unwrap_err();
        assert!(
            matches!(err, RagError::EmbeddingFailure { ref reason, .. } if reason.contains("non-finite"))
        );
    }
}
