//! Uploaded-file storage and source-id resolution.
//!
//! [`FileStorage`] writes uploads into one flat directory, keeping the
//! client's filename so that answer references read naturally. Name
//! collisions are resolved by appending ` (1)`, ` (2)`, … to the stem.
//!
//! [`SourceResolver`] is the seam the QA pipeline uses to turn a source id
//! into a readable path; [`SqliteSourceResolver`] is the production
//! implementation backed by the `sources` table.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::SqlitePool;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::error::{RagError, Result};
use crate::sources;

#[async_trait]
pub trait SourceResolver: Send + Sync {
    /// Map `source_id` to an existing file, or fail with [`RagError::SourceNotFound`].
    async fn resolve(&self, source_id: &str) -> Result<PathBuf>;
}

#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Write `bytes` under a collision-free version of `filename`.
    pub async fn save(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.root).await?;
        let name = sanitize_filename(filename);
        let (path, mut file) = self.create_unique(&name).await?;
        let written = async {
            file.write_all(bytes).await?;
            file.flush().await
        }
        .await;
        if let Err(e) = written {
            drop(file);
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e.into());
        }
        tracing::info!(path = %path.display(), bytes = bytes.len(), "stored upload");
        Ok(path)
    }

    /// Remove a stored file; a file that is already gone is not an error.
    pub async fn remove(&self, path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "stored file already missing");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Claim the first free name among `name`, `stem (1).ext`, `stem (2).ext`, …
    ///
    /// `create_new` makes the claim atomic, so concurrent uploads of the
    /// same name never share a file.
    async fn create_unique(&self, name: &str) -> Result<(PathBuf, tokio::fs::File)> {
        let (stem, ext) = split_name(name);
        let mut n = 0usize;
        loop {
            let candidate = match (n, ext) {
                (0, _) => self.root.join(name),
                (_, Some(ext)) => self.root.join(format!("{} ({}).{}", stem, n, ext)),
                (_, None) => self.root.join(format!("{} ({})", stem, n)),
            };
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
                .await
            {
                Ok(file) => return Ok((candidate, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => n += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Reduce a client-supplied name to a bare file name.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if base.is_empty() || base == "." || base == ".." {
        "upload".to_string()
    } else {
        base.to_string()
    }
}

fn split_name(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(dot) if dot > 0 => (&name[..dot], Some(&name[dot + 1..])),
        _ => (name, None),
    }
}

/// Resolves ids through the `sources` table, then checks the file exists.
#[derive(Clone)]
pub struct SqliteSourceResolver {
    pool: SqlitePool,
}

impl SqliteSourceResolver {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SourceResolver for SqliteSourceResolver {
    async fn resolve(&self, source_id: &str) -> Result<PathBuf> {
        let record = sources::get_source(&self.pool, source_id)
            .await?
            .ok_or_else(|| RagError::SourceNotFound(source_id.to_string()))?;
        let path = PathBuf::from(&record.stored_path);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::warn!(source_id, path = %path.display(), "source row has no file");
            return Err(RagError::SourceNotFound(source_id.to_string()));
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn collisions_get_numbered() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());

        let first = storage.save("report.pdf", b"1").await.unwrap();
        let second = storage.save("report.pdf", b"2").await.unwrap();
        let third = storage.save("report.pdf", b"3").await.unwrap();

        assert_eq!(first.file_name().unwrap(), "report.pdf");
        assert_eq!(second.file_name().unwrap(), "report (1).pdf");
        assert_eq!(third.file_name().unwrap(), "report (2).pdf");
        assert_eq!(std::fs::read(&first).unwrap(), b"1");
    }

    #[tokio::test]
    async fn concurrent_saves_never_share_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());

        let (a, b) = tokio::join!(storage.save("r.pdf", b"AAAA"), storage.save("r.pdf", b"BBBB"));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_ne!(a, b);
        let mut contents = vec![std::fs::read(&a).unwrap(), std::fs::read(&b).unwrap()];
        contents.sort();
        assert_eq!(contents, [b"AAAA".to_vec(), b"BBBB".to_vec()]);
    }

    #[tokio::test]
    async fn remove_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        let path = storage.save("a.txt", b"x").await.unwrap();
        storage.remove(&path).await.unwrap();
        storage.remove(&path).await.unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn names_are_reduced_to_basename() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\docs\\paper.pdf"), "paper.pdf");
        assert_eq!(sanitize_filename(".."), "upload");
        assert_eq!(split_name("archive.tar.gz"), ("archive.tar", Some("gz")));
        assert_eq!(split_name(".hidden"), (".hidden", None));
    }
}
