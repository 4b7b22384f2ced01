//! TOML configuration with environment overrides.
//!
//! Every section except `[db]` is optional and falls back to the defaults
//! listed on each field. Chunking values are deliberately not validated
//! here: out-of-range values fall back to the defaults inside the chunker
//! with a warning, so a bad override never prevents startup.
//!
//! Environment overrides (applied after parsing): `DOCQA_CHUNK_SIZE`,
//! `DOCQA_CHUNK_OVERLAP`, `DOCQA_TOP_K`. API credentials are never read
//! from the file; providers look up `GEMINI_API_KEY` / `OPENAI_API_KEY`.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub tasks: TasksConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
        }
    }
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./uploaded_sources")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: i64,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: i64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> i64 {
    500
}
fn default_chunk_overlap() -> i64 {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL override for the hosted providers (tests, proxies).
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout_secs(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    3
}
fn default_embedding_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// Model used when a request names a model outside the allow-list.
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default)]
    pub primary: PrimaryLlmConfig,
    #[serde(default)]
    pub secondary: SecondaryLlmConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            primary: PrimaryLlmConfig::default(),
            secondary: SecondaryLlmConfig::default(),
        }
    }
}

fn default_model() -> String {
    "gemini2".to_string()
}

/// Hosted chat-completion backend (Gemini).
#[derive(Debug, Deserialize, Clone)]
pub struct PrimaryLlmConfig {
    #[serde(default = "default_model")]
    pub name: String,
    #[serde(default = "default_gemini_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_primary_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for PrimaryLlmConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            model: default_gemini_model(),
            temperature: default_temperature(),
            timeout_secs: default_primary_timeout_secs(),
            url: None,
        }
    }
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_primary_timeout_secs() -> u64 {
    60
}

/// Self-hosted text-generation-inference endpoint.
#[derive(Debug, Deserialize, Clone)]
pub struct SecondaryLlmConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_secondary_name")]
    pub name: String,
    #[serde(default = "default_tgi_url")]
    pub url: String,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_stop")]
    pub stop: Vec<String>,
    #[serde(default = "default_secondary_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SecondaryLlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: default_secondary_name(),
            url: default_tgi_url(),
            max_new_tokens: default_max_new_tokens(),
            temperature: default_temperature(),
            stop: default_stop(),
            timeout_secs: default_secondary_timeout_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_secondary_name() -> String {
    "llama4".to_string()
}
fn default_tgi_url() -> String {
    "http://localhost:8080/".to_string()
}
fn default_max_new_tokens() -> u32 {
    512
}
fn default_stop() -> Vec<String> {
    vec!["\n\n".to_string()]
}
fn default_secondary_timeout_secs() -> u64 {
    120
}

impl LlmConfig {
    /// Model names accepted as-is; anything else is coerced to `default_model`.
    pub fn allowed_models(&self) -> Vec<&str> {
        let mut names = vec![self.primary.name.as_str()];
        if self.secondary.enabled {
            names.push(self.secondary.name.as_str());
        }
        names
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_dir")]
    pub dir: PathBuf,
    /// Build and persist a vector index alongside every generated summary.
    #[serde(default)]
    pub persist_summaries: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: default_index_dir(),
            persist_summaries: false,
        }
    }
}

fn default_index_dir() -> PathBuf {
    PathBuf::from("./vectorstore")
}

#[derive(Debug, Deserialize, Clone)]
pub struct TasksConfig {
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_max_entries() -> usize {
    1024
}
fn default_ttl_secs() -> u64 {
    3600
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config = parse_config(&content)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate(&config)?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

/// Apply `DOCQA_*` overrides using `lookup` to read variables.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("DOCQA_CHUNK_SIZE") {
        config.chunking.chunk_size = v
            .trim()
            .parse()
            .with_context(|| format!("DOCQA_CHUNK_SIZE is not an integer: {}", v))?;
    }
    if let Some(v) = lookup("DOCQA_CHUNK_OVERLAP") {
        config.chunking.chunk_overlap = v
            .trim()
            .parse()
            .with_context(|| format!("DOCQA_CHUNK_OVERLAP is not an integer: {}", v))?;
    }
    if let Some(v) = lookup("DOCQA_TOP_K") {
        config.retrieval.top_k = v
            .trim()
            .parse()
            .with_context(|| format!("DOCQA_TOP_K is not a non-negative integer: {}", v))?;
    }
    Ok(())
}

pub fn validate(config: &Config) -> Result<()> {
    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "gemini" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, gemini, or local.",
            other
        ),
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    let llm = &config.llm;
    if llm.secondary.enabled && llm.secondary.name == llm.primary.name {
        bail!(
            "llm.primary.name and llm.secondary.name must differ (both '{}')",
            llm.primary.name
        );
    }
    if !llm.allowed_models().contains(&llm.default_model.as_str()) {
        bail!(
            "llm.default_model '{}' is not one of the configured models: {}",
            llm.default_model,
            llm.allowed_models().join(", ")
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const MINIMAL: &str = "[db]\npath = \"./data/docqa.sqlite\"\n";

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = parse_config(MINIMAL).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.chunking.chunk_size, 500);
        assert_eq!(cfg.chunking.chunk_overlap, 50);
        assert_eq!(cfg.retrieval.top_k, 3);
        assert_eq!(cfg.embedding.provider, "local");
        assert_eq!(cfg.llm.default_model, "gemini2");
        assert_eq!(cfg.llm.allowed_models(), ["gemini2", "llama4"]);
        assert_eq!(cfg.llm.secondary.timeout_secs, 120);
        assert_eq!(cfg.server.bind, "127.0.0.1:8000");
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = parse_config(MINIMAL).unwrap();
        let env: HashMap<&str, &str> = [
            ("DOCQA_CHUNK_SIZE", "200"),
            ("DOCQA_CHUNK_OVERLAP", "-3"),
            ("DOCQA_TOP_K", "5"),
        ]
        .into_iter()
        .collect();
        apply_env_overrides(&mut cfg, |k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.chunking.chunk_size, 200);
        assert_eq!(cfg.chunking.chunk_overlap, -3);
        assert_eq!(cfg.retrieval.top_k, 5);
    }

    #[test]
    fn non_numeric_override_is_an_error() {
        let mut cfg = parse_config(MINIMAL).unwrap();
        let err = apply_env_overrides(&mut cfg, |k| {
            (k == "DOCQA_TOP_K").then(|| "many".to_string())
        });
        assert!(err.is_err());
    }

    #[test]
    fn zero_top_k_rejected() {
        let cfg = parse_config(&format!("{}[retrieval]\ntop_k = 0\n", MINIMAL)).unwrap();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn unknown_embedding_provider_rejected() {
        let cfg = parse_config(&format!("{}[embedding]\nprovider = \"magic\"\n", MINIMAL)).unwrap();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn disabling_secondary_shrinks_allow_list() {
        let cfg = parse_config(&format!("{}[llm.secondary]\nenabled = false\n", MINIMAL)).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.llm.allowed_models(), ["gemini2"]);
    }

    #[test]
    fn default_model_must_be_allowed() {
        let cfg = parse_config(&format!("{}[llm]\ndefault_model = \"gpt\"\n", MINIMAL)).unwrap();
        assert!(validate(&cfg).is_err());
    }
}
