//! In-memory nearest-neighbour index over chunk embeddings.
//!
//! The index is brute force: a query scores every entry with the index's
//! [`Metric`] and returns the best `k`. Corpora here are the chunks of a
//! handful of uploaded PDFs, so exact search is both fast enough and
//! deterministic.
//!
//! Ordering is descending by score; ties keep original chunk order (the
//! sort is stable over insertion order). Asking for more results than
//! there are entries returns every entry.
//!
//! The type is `Serialize`/`Deserialize` so the app crate can persist it
//! to disk and reload it for later requests; call [`VectorIndex::validate`]
//! after deserializing untrusted data.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::embedding::Metric;
use crate::models::Chunk;

#[derive(Debug, Error, PartialEq)]
pub enum IndexError {
    #[error("cannot build an index from zero chunks")]
    Empty,
    #[error("got {chunks} chunks but {embeddings} embeddings")]
    LengthMismatch { chunks: usize, embeddings: usize },
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("k must be >= 1")]
    InvalidK,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// A retrieved chunk with its similarity score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorIndex {
    dims: usize,
    #[serde(default)]
    metric: Metric,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Pair each chunk with its embedding.
    ///
    /// All vectors must share one non-zero dimension, and there must be
    /// exactly one embedding per chunk.
    pub fn build(
        chunks: Vec<Chunk>,
        embeddings: Vec<Vec<f32>>,
        metric: Metric,
    ) -> Result<Self, IndexError> {
        if chunks.len() != embeddings.len() {
            return Err(IndexError::LengthMismatch {
                chunks: chunks.len(),
                embeddings: embeddings.len(),
            });
        }
        let dims = match embeddings.first() {
            Some(v) => v.len(),
            None => return Err(IndexError::Empty),
        };

        let entries = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, vector)| IndexEntry { chunk, vector })
            .collect();
        let index = Self {
            dims,
            metric,
            entries,
        };
        index.validate()?;
        Ok(index)
    }

    /// Check that the index is non-empty and every vector has `dims` components.
    pub fn validate(&self) -> Result<(), IndexError> {
        if self.entries.is_empty() || self.dims == 0 {
            return Err(IndexError::Empty);
        }
        for entry in &self.entries {
            if entry.vector.len() != self.dims {
                return Err(IndexError::DimensionMismatch {
                    expected: self.dims,
                    actual: entry.vector.len(),
                });
            }
        }
        Ok(())
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return up to `k` entries ordered by descending similarity to `query`.
    pub fn query(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        if k == 0 {
            return Err(IndexError::InvalidK);
        }
        if query.len() != self.dims {
            return Err(IndexError::DimensionMismatch {
                expected: self.dims,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let score = self.metric.score(query, &e.vector);
                (i, if score.is_nan() { f32::NEG_INFINITY } else { score })
            })
            .collect();
        // Stable: equal scores keep insertion order. NaN scores rank last.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| ScoredChunk {
                chunk: self.entries[i].chunk.clone(),
                score,
            })
            .collect())
    }

    /// Like [`query`](Self::query) but drops the scores.
    pub fn top_k(&self, query: &[f32], k: usize) -> Result<Vec<Chunk>, IndexError> {
        Ok(self
            .query(query, k)?
            .into_iter()
            .map(|s| s.chunk)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::split_units;
    use crate::models::DocumentUnit;

    fn chunks(n: usize) -> Vec<Chunk> {
        let units: Vec<DocumentUnit> = (0..n)
            .map(|i| DocumentUnit::new(format!("chunk {}", i), "a.pdf", Some(i)))
            .collect();
        split_units(&units, 500, 50)
    }

    #[test]
    fn returns_descending_similarity() {
        let index = VectorIndex::build(
            chunks(3),
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]],
            Metric::Cosine,
        )
        .unwrap();
        let hits = index.query(&[0.0, 1.0], 3).unwrap();
        let texts: Vec<&str> = hits.iter().map(|h| h.chunk.text.as_str()).collect();
        assert_eq!(texts, ["chunk 1", "chunk 2", "chunk 0"]);
        assert!(hits[0].score >= hits[1].score && hits[1].score >= hits[2].score);
    }

    #[test]
    fn k_larger_than_corpus_returns_everything() {
        let index = VectorIndex::build(
            chunks(3),
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]],
            Metric::Cosine,
        )
        .unwrap();
        assert_eq!(index.top_k(&[1.0, 0.0], 10).unwrap().len(), 3);
    }

    #[test]
    fn ties_keep_original_order() {
        let index = VectorIndex::build(
            chunks(4),
            vec![vec![1.0, 0.0]; 4],
            Metric::Cosine,
        )
        .unwrap();
        let hits = index.top_k(&[1.0, 0.0], 4).unwrap();
        let order: Vec<usize> = hits.iter().map(|c| c.chunk_index).collect();
        assert_eq!(order, [0, 1, 2, 3]);
    }

    #[test]
    fn nan_vectors_rank_last() {
        let index = VectorIndex::build(
            chunks(3),
            vec![vec![f32::NAN, 0.0], vec![0.0, 1.0], vec![1.0, 0.0]],
            Metric::Cosine,
        )
        .unwrap();
        let hits = index.top_k(&[1.0, 0.0], 3).unwrap();
        let order: Vec<usize> = hits.iter().map(|c| c.chunk_index).collect();
        assert_eq!(order, [2, 1, 0]);
    }

    #[test]
    fn zero_k_is_rejected() {
        let index = VectorIndex::build(chunks(1), vec![vec![1.0]], Metric::Cosine).unwrap();
        assert_eq!(index.query(&[1.0], 0), Err(IndexError::InvalidK));
    }

    #[test]
    fn build_validates_shapes() {
        assert_eq!(
            VectorIndex::build(chunks(2), vec![vec![1.0]], Metric::Cosine),
            Err(IndexError::LengthMismatch {
                chunks: 2,
                embeddings: 1
            })
        );
        assert_eq!(
            VectorIndex::build(chunks(2), vec![vec![1.0, 0.0], vec![1.0]], Metric::Cosine),
            Err(IndexError::DimensionMismatch {
                expected: 2,
                actual: 1
            })
        );
        assert_eq!(
            VectorIndex::build(Vec::new(), Vec::new(), Metric::Cosine),
            Err(IndexError::Empty)
        );
    }

    #[test]
    fn query_dimension_must_match() {
        let index = VectorIndex::build(chunks(1), vec![vec![1.0, 0.0]], Metric::Cosine).unwrap();
        assert!(matches!(
            index.query(&[1.0], 1),
            Err(IndexError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn survives_json_roundtrip() {
        let index = VectorIndex::build(
            chunks(2),
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            Metric::InnerProduct,
        )
        .unwrap();
        let json = serde_json::to_string(&index).unwrap();
        let restored: VectorIndex = serde_json::from_str(&json).unwrap();
        restored.validate().unwrap();
        assert_eq!(restored, index);
    }
}
