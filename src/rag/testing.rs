use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::embedder::Embedder;

/// Deterministic embedder: buckets character codes into `dim` slots.
pub(crate) struct FakeEmbedder {
    model: String,
    dim: usize,
    poison: Option<String>,
    truncate_batches: bool,
    batch_calls: AtomicUsize,
}

impl FakeEmbedder {
    pub(crate) fn new(model: &str, dim: usize) -> Self {
        Self {
            model: model.to_string(),
            dim,
            poison: None,
            truncate_batches: false,
            batch_calls: AtomicUsize::new(0),
        }
    }

    /// Fail every batch that contains `marker`.
    pub(crate) fn poisoned(mut self, marker: &str) -> Self {
        self.poison = Some(marker.to_string());
        self
    }

    /// Drop the last vector of multi-text batches.
    pub(crate) fn truncating(mut self) -> Self {
        self.truncate_batches = true;
        self
    }

    pub(crate) fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dim];
        for c in text.chars() {
            vector[c as usize % self.dim] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(marker) = &self.poison {
            if texts.iter().any(|t| t.contains(marker.as_str())) {
                return Err(anyhow!("model rejected input"));
            }
        }

        let mut vectors: Vec<Vec<f32>> = texts.iter().map(|t| self.vector_for(t)).collect();
        if self.truncate_batches && vectors.len() > 1 {
            vectors.pop();
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dim
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
