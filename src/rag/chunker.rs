use crate::config::ChunkingConfig;
use crate::error::{RagError, RagResult};

use super::store::Chunk;

/// Fixed-size sliding window over characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    size: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(size: usize, overlap: usize) -> RagResult<Self> {
        if size == 0 {
            return Err(RagError::InvalidConfiguration(
                "chunk size must be greater than 0".to_string(),
            ));
        }
        if overlap >= size {
            return Err(RagError::InvalidConfiguration(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                overlap, size
            )));
        }
        Ok(Self { size, overlap })
    }

    pub fn from_config(config: &ChunkingConfig) -> RagResult<Self> {
        Self::new(config.size, config.overlap)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Distance between the starts of consecutive windows.
    pub fn stride(&self) -> usize {
        self.size - self.overlap
    }

    /// Split one text into windows, numbering them from `first_id`.
    ///
    /// The last window is clipped to the remaining text. Empty text yields
    /// no chunks.
    pub fn chunk(&self, source_id: &str, text: &str, first_id: usize) -> Vec<Chunk> {
        // Byte position of every char boundary, so windows can be sliced
        // by character count without splitting a code point.
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let char_len = boundaries.len() - 1;

        let mut chunks = Vec::new();
        let mut start = 0;

        while start < char_len {
            let end = (start + self.size).min(char_len);
            chunks.push(Chunk {
                chunk_id: first_id + chunks.len(),
                source_id: source_id.to_string(),
                text: text[boundaries[start]..boundaries[end]].to_string(),
                start_offset: start,
                end_offset: end,
            });

            if end == char_len {
                break;
            }
            start += self.stride();
        }

        chunks
    }
}
