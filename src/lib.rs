//! # docqa
//!
//! Document question answering over uploaded PDFs.
//!
//! ```text
//! upload ──▶ FileStorage + sources table
//!                │
//!   /qa ──▶ resolve ─▶ load ─▶ chunk ─▶ embed ─▶ VectorIndex ─▶ top-k ─▶ LLM
//!                                                                   │
//!                                     answer + references + contexts ◀┘
//!
//!   /process ──▶ background task: load ─▶ chunk ─▶ LLM ─▶ summaries table
//! ```
//!
//! Pure logic (chunking, the vector index, prompts, reference
//! extraction) lives in the `docqa-core` crate; this crate adds I/O.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and env overrides |
//! | [`error`] | Typed pipeline errors |
//! | [`loader`] | PDF / text files → per-page units |
//! | [`embedding`] | Embedding providers |
//! | [`llm`] | Chat backends and model routing with fallback |
//! | [`rag`] | Summarization and QA pipelines |
//! | [`index_store`] | Vector index persistence |
//! | [`tasks`] | Background task store |
//! | [`storage`] | Uploaded files and source resolution |
//! | [`sources`], [`summaries`], [`notes`], [`history`] | SQLite records |
//! | [`server`] | HTTP API |
//! | [`db`], [`migrate`] | Connection and schema |

pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod history;
pub mod index_store;
pub mod llm;
pub mod loader;
pub mod migrate;
pub mod notes;
pub mod rag;
pub mod server;
pub mod sources;
pub mod storage;
pub mod summaries;
pub mod tasks;
