//! Core data models shared by the loader, chunker, index, and pipelines.
//!
//! [`DocumentUnit`]s are produced by the loader (one per PDF page) and
//! consumed only by the chunker. [`Chunk`]s are the unit of embedding and
//! retrieval; they are recomputed on every request and never persisted
//! except inside a serialized vector index.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metadata key holding the originating file path of a unit or chunk.
pub const META_SOURCE: &str = "source";
/// Metadata key holding the 0-based page number within the source file.
pub const META_PAGE: &str = "page";

/// Provenance metadata attached to units and inherited by their chunks.
pub type Metadata = BTreeMap<String, String>;

/// One page (or whole text file) of extracted text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentUnit {
    pub text: String,
    pub metadata: Metadata,
}

impl DocumentUnit {
    /// Build a unit whose `source` metadata is `source`, plus an optional page number.
    pub fn new(text: impl Into<String>, source: impl Into<String>, page: Option<usize>) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert(META_SOURCE.to_string(), source.into());
        if let Some(page) = page {
            metadata.insert(META_PAGE.to_string(), page.to_string());
        }
        Self {
            text: text.into(),
            metadata,
        }
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata.get(META_SOURCE).map(String::as_str)
    }
}

/// A bounded-length window of a unit's text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Position in the overall chunk sequence of one split call.
    pub chunk_index: usize,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
    /// Inherited unchanged from the parent [`DocumentUnit`].
    pub metadata: Metadata,
}

impl Chunk {
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(META_SOURCE).map(String::as_str)
    }
}

/// Result of the question-answering pipeline.
///
/// `references` holds one basename per distinct source surfaced by
/// retrieval, in first-retrieval order. `contexts` holds every retrieved
/// chunk text, undeduplicated, in retrieval order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResult {
    pub answer: String,
    pub references: Vec<String>,
    pub contexts: Vec<String>,
}
