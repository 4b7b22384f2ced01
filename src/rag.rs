//! The two RAG pipelines: summarization and grounded question answering.
//!
//! # Summarization
//!
//! `loading → chunking → generating`: every chunk of every file is
//! stuffed into the summary prompt; there is no retrieval step. When
//! `[index].persist_summaries` is on, the chunks are also embedded and the
//! resulting index is written to disk so later questions can reuse it.
//!
//! # Question answering
//!
//! `resolving → indexing → retrieving → generating`:
//!
//! 1. Validate the request (non-blank question, at least one source) and
//!    resolve the model name before any expensive work.
//! 2. Resolve every source id to a file; one unknown id fails the request.
//! 3. Load, chunk, embed, and build a per-request [`VectorIndex`], or
//!    reload a persisted one when the request names it and it was built
//!    from the same set of sources.
//! 4. Embed the question and take the top-k chunks.
//! 5. Stuff the retrieved texts into the QA prompt and generate.
//! 6. Derive deduplicated references and raw contexts from the retrieval.
//!
//! Steps run strictly in order; the first error aborts the request.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use docqa_core::chunk::split_units;
use docqa_core::index::VectorIndex;
use docqa_core::models::{AnswerResult, Chunk};
use docqa_core::prompt::{format_context, stuff_context, QA_PROMPT, SUMMARY_PROMPT};
use docqa_core::references::{collect_contexts, collect_references};
use serde::Deserialize;

use crate::config::Config;
use crate::embedding::{embed_batched, embed_query, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::index_store;
use crate::llm::LlmRouter;
use crate::loader::load_documents;
use crate::storage::SourceResolver;

/// Tunables the pipelines read from configuration.
#[derive(Debug, Clone)]
pub struct RagSettings {
    pub chunk_size: i64,
    pub chunk_overlap: i64,
    pub top_k: usize,
    pub batch_size: usize,
    pub index_dir: PathBuf,
    pub persist_summaries: bool,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            top_k: 3,
            batch_size: 64,
            index_dir: PathBuf::from("./vectorstore"),
            persist_summaries: false,
        }
    }
}

impl RagSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_size: config.chunking.chunk_size,
            chunk_overlap: config.chunking.chunk_overlap,
            top_k: config.retrieval.top_k,
            batch_size: config.embedding.batch_size,
            index_dir: config.index.dir.clone(),
            persist_summaries: config.index.persist_summaries,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QaRequest {
    pub question: String,
    pub source_ids: Vec<String>,
    #[serde(default)]
    pub llm_model: String,
    /// A persisted index to answer from instead of rebuilding one.
    #[serde(skip)]
    pub persisted_index: Option<PersistedIndex>,
}

/// A summary's saved index together with the sources it was built from.
#[derive(Debug, Clone)]
pub struct PersistedIndex {
    pub path: PathBuf,
    pub source_ids: Vec<String>,
}

impl PersistedIndex {
    /// True when the index covers exactly `source_ids`, in any order.
    pub fn covers(&self, source_ids: &[String]) -> bool {
        let built: BTreeSet<&str> = self.source_ids.iter().map(String::as_str).collect();
        let requested: BTreeSet<&str> = source_ids.iter().map(String::as_str).collect();
        built == requested
    }
}

#[derive(Debug, Clone)]
pub struct SummaryOutput {
    pub markdown: String,
    /// Set when the summary's chunks were indexed and persisted.
    pub index_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Loading,
    Chunking,
    Resolving,
    Indexing,
    Retrieving,
    Generating,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Loading => "loading",
            Stage::Chunking => "chunking",
            Stage::Resolving => "resolving",
            Stage::Indexing => "indexing",
            Stage::Retrieving => "retrieving",
            Stage::Generating => "generating",
        };
        f.write_str(name)
    }
}

pub struct RagPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<LlmRouter>,
    resolver: Arc<dyn SourceResolver>,
    settings: RagSettings,
}

impl RagPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<LlmRouter>,
        resolver: Arc<dyn SourceResolver>,
        settings: RagSettings,
    ) -> Self {
        Self {
            embedder,
            llm,
            resolver,
            settings,
        }
    }

    /// Resolve every id in order; the first miss fails the whole batch.
    pub async fn resolve_sources(&self, source_ids: &[String]) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::with_capacity(source_ids.len());
        for id in source_ids {
            paths.push(self.resolver.resolve(id).await?);
        }
        Ok(paths)
    }

    async fn load_chunks(&self, paths: &[PathBuf]) -> Result<Vec<Chunk>> {
        tracing::info!(stage = %Stage::Loading, files = paths.len(), "loading documents");
        let units = load_documents(paths).await?;

        tracing::info!(stage = %Stage::Chunking, units = units.len(), "splitting documents");
        let chunks = split_units(&units, self.settings.chunk_size, self.settings.chunk_overlap);
        if chunks.is_empty() {
            return Err(RagError::EmptyCorpus(format!(
                "{} file(s) produced no chunks",
                paths.len()
            )));
        }
        Ok(chunks)
    }

    async fn build_index(&self, chunks: Vec<Chunk>) -> Result<VectorIndex> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_batched(self.embedder.as_ref(), &texts, self.settings.batch_size).await?;
        Ok(VectorIndex::build(chunks, vectors, self.embedder.metric())?)
    }

    /// Reload a persisted index if it is readable and matches the embedder.
    async fn reuse_index(&self, path: &Path) -> Option<VectorIndex> {
        match index_store::load(path).await {
            Ok(index) if self.embedder.dims() == 0 || index.dims() == self.embedder.dims() => {
                tracing::info!(path = %path.display(), entries = index.len(), "reusing persisted index");
                Some(index)
            }
            Ok(index) => {
                tracing::warn!(
                    path = %path.display(),
                    index_dims = index.dims(),
                    embedder_dims = self.embedder.dims(),
                    "persisted index does not match embedder, rebuilding"
                );
                None
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "persisted index unusable, rebuilding");
                None
            }
        }
    }

    /// Summarize `paths` into structured markdown notes.
    pub async fn summarize(&self, paths: &[PathBuf], llm_model: &str) -> Result<SummaryOutput> {
        let model = self.llm.resolve_model(llm_model).to_string();
        let chunks = self.load_chunks(paths).await?;

        tracing::info!(stage = %Stage::Generating, chunks = chunks.len(), model = %model, "generating summary");
        let context = format_context(&chunks);
        let markdown = self
            .llm
            .generate(&SUMMARY_PROMPT.format(&context), &model)
            .await?;

        let index_path = if self.settings.persist_summaries {
            self.persist_summary_index(chunks).await
        } else {
            None
        };

        Ok(SummaryOutput {
            markdown,
            index_path,
        })
    }

    async fn persist_summary_index(&self, chunks: Vec<Chunk>) -> Option<PathBuf> {
        let path = index_store::new_index_path(&self.settings.index_dir);
        let result: Result<()> = async {
            let index = self.build_index(chunks).await?;
            index_store::persist(&index, &path).await
        }
        .await;
        match result {
            Ok(()) => Some(path),
            Err(e) => {
                tracing::warn!(error = %e, "summary index not persisted");
                None
            }
        }
    }

    /// Answer `request.question` from the requested sources.
    pub async fn answer(&self, request: &QaRequest) -> Result<AnswerResult> {
        if request.question.trim().is_empty() {
            return Err(RagError::InvalidRequest("question must not be empty".into()));
        }
        if request.source_ids.is_empty() {
            return Err(RagError::InvalidRequest("source_ids must not be empty".into()));
        }
        let model = self.llm.resolve_model(&request.llm_model).to_string();

        tracing::info!(stage = %Stage::Resolving, sources = request.source_ids.len(), "resolving sources");
        let paths = self.resolve_sources(&request.source_ids).await?;

        tracing::info!(stage = %Stage::Indexing, "preparing vector index");
        let reused = match &request.persisted_index {
            Some(saved) if saved.covers(&request.source_ids) => self.reuse_index(&saved.path).await,
            Some(saved) => {
                tracing::warn!(
                    path = %saved.path.display(),
                    indexed = ?saved.source_ids,
                    requested = ?request.source_ids,
                    "persisted index covers other sources, rebuilding"
                );
                None
            }
            None => None,
        };
        let index = match reused {
            Some(index) => index,
            None => {
                let chunks = self.load_chunks(&paths).await?;
                self.build_index(chunks).await?
            }
        };

        tracing::info!(stage = %Stage::Retrieving, top_k = self.settings.top_k, "retrieving context");
        let query = embed_query(self.embedder.as_ref(), &request.question).await?;
        let retrieved = index.top_k(&query, self.settings.top_k)?;

        tracing::info!(stage = %Stage::Generating, chunks = retrieved.len(), model = %model, "generating answer");
        let messages = stuff_context(QA_PROMPT.format(&request.question), &format_context(&retrieved));
        let answer = self.llm.generate(&messages, &model).await?;

        Ok(AnswerResult {
            answer,
            references: collect_references(&retrieved),
            contexts: collect_contexts(&retrieved),
        })
    }
}
