//! Error taxonomy for the RAG pipelines and their collaborators.
//!
//! Each variant maps to one failure class callers must distinguish:
//! client input errors (`SourceNotFound`, `InvalidRequest`), a corpus that
//! yielded no text (`EmptyCorpus`), upstream provider failures
//! (`EmbeddingProvider`, `Generation`), and local infrastructure errors.

use docqa_core::index::IndexError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Debug, Error)]
pub enum RagError {
    /// A requested source identifier does not resolve to a stored file.
    #[error("source not found: {0}")]
    SourceNotFound(String),

    /// Loading and chunking produced no usable text.
    #[error("no documents were loaded: {0}")]
    EmptyCorpus(String),

    #[error("embedding provider failed: {0}")]
    EmbeddingProvider(String),

    /// Every configured chat backend failed.
    #[error("generation failed: {0}")]
    Generation(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("vector index error: {0}")]
    Index(#[from] IndexError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl RagError {
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::EmbeddingProvider(message.into())
    }

    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation(message.into())
    }

    /// Stable machine-readable code for this error class.
    pub fn code(&self) -> &'static str {
        match self {
            RagError::SourceNotFound(_) => "source_not_found",
            RagError::EmptyCorpus(_) => "empty_corpus",
            RagError::EmbeddingProvider(_) => "embedding_error",
            RagError::Generation(_) => "generation_error",
            RagError::InvalidRequest(_) => "bad_request",
            RagError::Index(_) => "index_error",
            RagError::Io(_) => "io_error",
            RagError::Storage(_) => "storage_error",
        }
    }

    /// True for failures of an external embedding or chat provider.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            RagError::EmbeddingProvider(_) | RagError::Generation(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct_per_class() {
        assert_eq!(RagError::SourceNotFound("S1".into()).code(), "source_not_found");
        assert_eq!(RagError::EmptyCorpus("x".into()).code(), "empty_corpus");
        assert_eq!(RagError::Index(IndexError::InvalidK).code(), "index_error");
    }

    #[test]
    fn upstream_classification() {
        assert!(RagError::embedding("timeout").is_upstream());
        assert!(RagError::generation("503").is_upstream());
        assert!(!RagError::InvalidRequest("blank".into()).is_upstream());
    }

    #[test]
    fn message_includes_detail() {
        let err = RagError::SourceNotFound("abc".into());
        assert_eq!(err.to_string(), "source not found: abc");
    }
}
