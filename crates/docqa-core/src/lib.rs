//! # docqa core
//!
//! Shared, I/O-free logic for docqa: document models, the character
//! chunker, vector utilities and the in-memory [`index::VectorIndex`],
//! prompt templates, and reference extraction for answers.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem access. The
//! `docqa` application crate owns loading, providers, persistence, and the
//! pipelines that compose these pieces.

pub mod chunk;
pub mod embedding;
pub mod index;
pub mod models;
pub mod prompt;
pub mod references;
