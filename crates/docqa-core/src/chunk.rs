//! Fixed-size character chunker with overlap.
//!
//! Splits [`DocumentUnit`]s into [`Chunk`]s of at most `chunk_size`
//! characters, where consecutive chunks of the same unit share exactly
//! `chunk_overlap` characters. Splitting counts Unicode scalar values,
//! not bytes or tokens, so multi-byte text never splits inside a character.
//!
//! # Algorithm
//!
//! 1. Resolve parameters via [`ChunkParams::resolve`]. Invalid values fall
//!    back to the defaults (500 / 50) with a warning; they never fail.
//! 2. For each unit in input order, skip it if it has no non-whitespace text.
//! 3. Emit windows `[start, start + chunk_size)` with
//!    `start += chunk_size - chunk_overlap` until a window reaches the end
//!    of the unit. The final window may be shorter.
//! 4. Every chunk carries a copy of its unit's metadata.
//!
//! # Example
//!
//! ```rust
//! use docqa_core::chunk::split_units;
//! use docqa_core::models::DocumentUnit;
//!
//! let units = vec![DocumentUnit::new("abcdefghij", "a.pdf", Some(0))];
//! let chunks = split_units(&units, 4, 1);
//! let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
//! assert_eq!(texts, ["abcd", "defg", "ghij"]);
//! ```

use sha2::{Digest, Sha256};

use crate::models::{Chunk, DocumentUnit};

pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

/// Validated chunking parameters: `chunk_size > 0` and `chunk_overlap < chunk_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkParams {
    /// Validate raw (possibly negative) values from config or a call site.
    ///
    /// Falls back to [`ChunkParams::default`] and logs a warning when
    /// `chunk_size <= 0`, `chunk_overlap < 0`, or `chunk_overlap >= chunk_size`.
    pub fn resolve(chunk_size: i64, chunk_overlap: i64) -> Self {
        if chunk_size <= 0 || chunk_overlap < 0 || chunk_overlap >= chunk_size {
            tracing::warn!(
                chunk_size,
                chunk_overlap,
                "invalid chunk parameters, falling back to {}/{}",
                DEFAULT_CHUNK_SIZE,
                DEFAULT_CHUNK_OVERLAP
            );
            return Self::default();
        }
        Self {
            chunk_size: chunk_size as usize,
            chunk_overlap: chunk_overlap as usize,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }
}

/// Split units into overlapping chunks. See the module docs for the algorithm.
pub fn split_units(units: &[DocumentUnit], chunk_size: i64, chunk_overlap: i64) -> Vec<Chunk> {
    split_with(units, ChunkParams::resolve(chunk_size, chunk_overlap))
}

/// Split units with already-validated parameters.
pub fn split_with(units: &[DocumentUnit], params: ChunkParams) -> Vec<Chunk> {
    let step = params.chunk_size - params.chunk_overlap;
    let mut chunks = Vec::new();

    for unit in units {
        if unit.text.trim().is_empty() {
            continue;
        }

        let chars: Vec<char> = unit.text.chars().collect();
        let mut start = 0;
        loop {
            let end = (start + params.chunk_size).min(chars.len());
            let text: String = chars[start..end].iter().collect();
            chunks.push(make_chunk(chunks.len(), text, unit));
            if end == chars.len() {
                break;
            }
            start += step;
        }
    }

    chunks
}

fn make_chunk(index: usize, text: String, unit: &DocumentUnit) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        chunk_index: index,
        text,
        hash,
        metadata: unit.metadata.clone(),
    }
}
