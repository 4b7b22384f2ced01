//! Reference and context extraction from retrieved chunks.

use std::path::Path;

use crate::models::Chunk;

/// Reduce a source path to its file name; falls back to the raw string.
pub fn source_label(source: &str) -> String {
    Path::new(source)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| source.to_string())
}

/// Distinct source basenames in first-retrieval order.
///
/// Comparison is case-sensitive. Chunks without a `source` entry are
/// labelled `Source {n}` by their 1-based retrieval position.
pub fn collect_references(chunks: &[Chunk]) -> Vec<String> {
    let mut refs: Vec<String> = Vec::new();
    for (i, chunk) in chunks.iter().enumerate() {
        let label = match chunk.source() {
            Some(source) => source_label(source),
            None => format!("Source {}", i + 1),
        };
        if !refs.contains(&label) {
            refs.push(label);
        }
    }
    refs
}

/// Raw chunk texts in retrieval order, duplicates kept.
pub fn collect_contexts(chunks: &[Chunk]) -> Vec<String> {
    chunks.iter().map(|c| c.text.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::split_units;
    use crate::models::DocumentUnit;

    fn retrieved(sources: &[&str]) -> Vec<Chunk> {
        let units: Vec<DocumentUnit> = sources
            .iter()
            .enumerate()
            .map(|(i, s)| DocumentUnit::new(format!("text {}", i), *s, Some(0)))
            .collect();
        split_units(&units, 500, 50)
    }

    #[test]
    fn dedup_keeps_first_occurrence_order() {
        let chunks = retrieved(&["/up/A.pdf", "/up/B.pdf", "/up/A.pdf", "/up/C.pdf"]);
        assert_eq!(collect_references(&chunks), ["A.pdf", "B.pdf", "C.pdf"]);
        assert_eq!(
            collect_contexts(&chunks),
            ["text 0", "text 1", "text 2", "text 3"]
        );
    }

    #[test]
    fn dedup_is_case_sensitive() {
        let chunks = retrieved(&["/up/a.pdf", "/up/A.pdf", "/other/a.pdf"]);
        assert_eq!(collect_references(&chunks), ["a.pdf", "A.pdf"]);
    }

    #[test]
    fn missing_source_gets_positional_label() {
        let mut chunks = retrieved(&["x.pdf", "y.pdf"]);
        chunks[1].metadata.clear();
        assert_eq!(collect_references(&chunks), ["x.pdf", "Source 2"]);
    }

    #[test]
    fn label_without_directory() {
        assert_eq!(source_label("plain.pdf"), "plain.pdf");
        assert_eq!(source_label("/a/b/c.pdf"), "c.pdf");
    }
}
