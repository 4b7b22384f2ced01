//! Document loader: files on disk → per-page [`DocumentUnit`]s.
//!
//! PDFs produce one unit per page (`page` metadata is the 0-based page
//! index); `.txt` and `.md` files produce a single unit. Every unit's
//! `source` metadata is the path string it was loaded from.
//!
//! Failures are per file: a missing, unreadable, corrupt or unsupported
//! file is logged and skipped so the rest of the batch still loads. Only
//! when nothing at all yields text does the caller get
//! [`RagError::EmptyCorpus`].

use std::path::{Path, PathBuf};

use docqa_core::models::DocumentUnit;

use crate::error::{RagError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Pdf,
    Text,
}

fn detect_kind(path: &Path, bytes: &[u8]) -> Option<FileKind> {
    if bytes.starts_with(b"%PDF") {
        return Some(FileKind::Pdf);
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("pdf") => Some(FileKind::Pdf),
        Some("txt") | Some("md") => Some(FileKind::Text),
        _ => None,
    }
}

/// Extract the text of every page of a PDF held in memory.
pub fn extract_pdf_pages(bytes: &[u8]) -> std::result::Result<Vec<String>, String> {
    pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| e.to_string())
}

/// Load one file; `Err` carries the reason it was skipped.
async fn load_file(path: &Path) -> std::result::Result<Vec<DocumentUnit>, String> {
    if !path.exists() {
        return Err("file does not exist".to_string());
    }
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| format!("read failed: {}", e))?;
    let source = path.display().to_string();

    match detect_kind(path, &bytes) {
        Some(FileKind::Pdf) => {
            let pages = tokio::task::spawn_blocking(move || extract_pdf_pages(&bytes))
                .await
                .map_err(|e| format!("PDF extraction task failed: {}", e))?
                .map_err(|e| format!("PDF extraction failed: {}", e))?;
            Ok(pages
                .into_iter()
                .enumerate()
                .map(|(page, text)| DocumentUnit::new(text, source.clone(), Some(page)))
                .collect())
        }
        Some(FileKind::Text) => {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            Ok(vec![DocumentUnit::new(text, source, None)])
        }
        None => Err("unsupported file type".to_string()),
    }
}

/// Load every path in order, skipping the ones that fail.
pub async fn load_documents(paths: &[PathBuf]) -> Result<Vec<DocumentUnit>> {
    let mut units = Vec::new();
    let mut skipped = 0usize;

    for path in paths {
        match load_file(path).await {
            Ok(loaded) => {
                tracing::debug!(path = %path.display(), pages = loaded.len(), "loaded document");
                units.extend(loaded);
            }
            Err(reason) => {
                skipped += 1;
                tracing::warn!(path = %path.display(), %reason, "skipping document");
            }
        }
    }

    if !units.iter().any(|u| !u.text.trim().is_empty()) {
        return Err(RagError::EmptyCorpus(format!(
            "none of {} file(s) produced any text ({} skipped)",
            paths.len(),
            skipped
        )));
    }

    Ok(units)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_core::models::META_PAGE;

    #[tokio::test]
    async fn missing_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("notes.md");
        std::fs::write(&good, "# Heading\nSome text").unwrap();
        let missing = dir.path().join("gone.pdf");

        let units = load_documents(&[missing, good.clone()]).await.unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].source(), Some(good.display().to_string().as_str()));
        assert!(!units[0].metadata.contains_key(META_PAGE));
    }

    #[tokio::test]
    async fn corrupt_pdf_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("broken.pdf");
        std::fs::write(&bad, b"%PDF-1.4 this is not really a pdf").unwrap();
        let good = dir.path().join("a.txt");
        std::fs::write(&good, "plain").unwrap();

        let units = load_documents(&[bad, good]).await.unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].text, "plain");
    }

    #[tokio::test]
    async fn nothing_loaded_is_empty_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let blank = dir.path().join("blank.txt");
        std::fs::write(&blank, "   \n").unwrap();
        let unsupported = dir.path().join("image.png");
        std::fs::write(&unsupported, [0x89, b'P', b'N', b'G']).unwrap();

        let err = load_documents(&[blank, unsupported]).await.unwrap_err();
        assert!(matches!(err, RagError::EmptyCorpus(_)));
    }

    #[test]
    fn kind_detection_prefers_magic_bytes() {
        assert_eq!(detect_kind(Path::new("x.bin"), b"%PDF-1.7"), Some(FileKind::Pdf));
        assert_eq!(detect_kind(Path::new("X.TXT"), b"hello"), Some(FileKind::Text));
        assert_eq!(detect_kind(Path::new("x.docx"), b"PK"), None);
    }
}
