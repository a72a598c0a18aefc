use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{RagError, RagResult};

/// Similarity measure, fixed when an index is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Squared Euclidean distance, smaller is closer.
    #[default]
    L2,
    /// Dot product, larger is closer.
    InnerProduct,
    /// Cosine similarity, larger is closer.
    Cosine,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::L2 => "l2",
            Metric::InnerProduct => "inner_product",
            Metric::Cosine => "cosine",
        }
    }

    pub fn higher_is_closer(&self) -> bool {
        !matches!(self, Metric::L2)
    }

    fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::L2 => euclidean_distance_squared(a, b),
            Metric::InnerProduct => dot(a, b),
            Metric::Cosine => cosine_similarity(a, b),
        }
    }

    /// Best-first ordering, ties broken by ascending id.
    fn rank(&self, a: &Neighbor, b: &Neighbor) -> Ordering {
        let by_score = if self.higher_is_closer() {
            b.score.total_cmp(&a.score)
        } else {
            a.score.total_cmp(&b.score)
        };
        by_score.then_with(|| a.id.cmp(&b.id))
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "l2" | "euclidean" => Ok(Metric::L2),
            "inner_product" | "ip" | "dot" => Ok(Metric::InnerProduct),
            "cosine" => Ok(Metric::Cosine),
            other => Err(RagError::InvalidConfiguration(format!(
                "unknown metric '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    /// Position the vector was added at, equal to its `chunk_id`.
    pub id: usize,
    /// Distance for [`Metric::L2`], similarity otherwise.
    pub score: f32,
}

/// Exact nearest-neighbor index over a dense row-major matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorIndex {
    metric: Metric,
    dim: usize,
    data: Vec<f32>,
}

impl VectorIndex {
    pub fn new(metric: Metric, dim: usize) -> Self {
        Self {
            metric,
            dim,
            data: Vec::new(),
        }
    }

    /// Build over `embeddings`, taking the dimension from the first vector.
    pub fn build<V: AsRef<[f32]>>(metric: Metric, embeddings: &[V]) -> RagResult<Self> {
        let dim = embeddings.first().map(|v| v.as_ref().len()).unwrap_or(0);
        Self::build_with_dim(metric, dim, embeddings)
    }

    /// Build over `embeddings`, requiring every vector to have length `dim`.
    pub fn build_with_dim<V: AsRef<[f32]>>(
        metric: Metric,
        dim: usize,
        embeddings: &[V],
    ) -> RagResult<Self> {
        let mut data = Vec::with_capacity(dim * embeddings.len());
        for (index, vector) in embeddings.iter().enumerate() {
            let vector = vector.as_ref();
            if vector.len() != dim {
                return Err(RagError::DimensionMismatch {
                    index,
                    expected: dim,
                    found: vector.len(),
                });
            }
            data.extend_from_slice(vector);
        }
        Ok(Self { metric, dim, data })
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored vectors in id order.
    pub fn vectors(&self) -> impl ExactSizeIterator<Item = &[f32]> {
        self.data.chunks_exact(self.dim.max(1)).take(self.len())
    }

    /// Up to `k` nearest entries, best first. `k` beyond the index size
    /// returns every entry.
    pub fn search(&self, query: &[f32], k: usize) -> RagResult<Vec<Neighbor>> {
        if k == 0 {
            return Err(RagError::InvalidArgument(
                "k must be greater than 0".to_string(),
            ));
        }
        if self.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != self.dim {
            return Err(RagError::DimensionMismatch {
                index: 0,
                expected: self.dim,
                found: query.len(),
            });
        }

        let mut neighbors: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dim)
            .enumerate()
            .map(|(id, vector)| Neighbor {
                id,
                score: self.metric.score(query, vector),
            })
            .collect();

        let metric = self.metric;
        if k < neighbors.len() {
            neighbors.select_nth_unstable_by(k - 1, |a, b| metric.rank(a, b));
            neighbors.truncate(k);
        }
        neighbors.sort_by(|a, b| metric.rank(a, b));

        Ok(neighbors)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn euclidean_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}
