//! On-disk persistence for [`VectorIndex`] as JSON.
//!
//! The file holds the dimension, metric, and every (chunk, vector) pair,
//! so a reloaded index answers queries exactly like the one that was
//! saved.

use std::path::{Path, PathBuf};

use docqa_core::index::VectorIndex;
use uuid::Uuid;

use crate::error::Result;

/// Write `index` to `path`, creating parent directories. The write goes to
/// a temporary sibling first and is renamed into place.
pub async fn persist(index: &VectorIndex, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let bytes = serde_json::to_vec(index).map_err(std::io::Error::from)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    tracing::debug!(path = %path.display(), entries = index.len(), "persisted vector index");
    Ok(())
}

/// Read and validate an index written by [`persist`].
pub async fn load(path: &Path) -> Result<VectorIndex> {
    let bytes = tokio::fs::read(path).await?;
    let index: VectorIndex = serde_json::from_slice(&bytes).map_err(std::io::Error::from)?;
    index.validate()?;
    Ok(index)
}

/// Fresh `<uuid>.json` path under `dir`.
pub fn new_index_path(dir: &Path) -> PathBuf {
    dir.join(format!("{}.json", Uuid::new_v4()))
}
