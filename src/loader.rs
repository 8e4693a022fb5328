//! Corpus directory loader.
//!
//! Enumerates a directory for supported documents (PDF plus plain
//! `.txt`/`.md`), extracts their text, and returns them in a
//! deterministic order. A file that cannot be read or parsed is logged
//! and skipped; one bad document never aborts the rest of the ingest.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use tracing::warn;
use walkdir::WalkDir;

/// A document's extracted text, before chunking.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    /// Path relative to the corpus root.
    pub path: String,
    pub title: String,
    pub text: String,
}

const INCLUDE_GLOBS: &[&str] = &["**/*.pdf", "**/*.txt", "**/*.md"];

/// Scan `root` and extract text from every supported file.
/// Returns documents sorted by relative path.
pub fn load_corpus(root: &Path) -> Result<Vec<LoadedDocument>> {
    if !root.is_dir() {
        bail!("Corpus directory does not exist: {}", root.display());
    }

    let include_set = build_globset(INCLUDE_GLOBS)?;
    let mut documents = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if !include_set.is_match(&rel_str) {
            continue;
        }

        match load_file(path) {
            Ok(text) if !text.trim().is_empty() => {
                let title = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| rel_str.clone());
                documents.push(LoadedDocument {
                    path: rel_str,
                    title,
                    text,
                });
            }
            Ok(_) => {
                warn!(path = %rel_str, "skipping document with no extractable text");
            }
            Err(e) => {
                warn!(path = %rel_str, error = %e, "skipping unreadable document");
            }
        }
    }

    // Deterministic ordering keeps re-ingest results stable.
    documents.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(documents)
}

fn load_file(path: &Path) -> Result<String> {
    let is_pdf = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);

    if is_pdf {
        let bytes = std::fs::read(path)?;
        let text = pdf_extract::extract_text_from_mem(&bytes)
            .map_err(|e| anyhow::anyhow!("PDF extraction failed: {}", e))?;
        Ok(text)
    } else {
        Ok(std::fs::read_to_string(path)?)
    }
}

fn build_globset(patterns: &[&str]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn missing_directory_is_an_error() {
        let err = load_corpus(Path::new("/nonexistent/docchat-corpus")).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn loads_text_files_in_path_order() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.txt"), "second document").unwrap();
        fs::write(tmp.path().join("a.md"), "first document").unwrap();
        fs::write(tmp.path().join("ignored.csv"), "not a corpus file").unwrap();

        let docs = load_corpus(tmp.path()).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].path, "a.md");
        assert_eq!(docs[1].path, "b.txt");
        assert_eq!(docs[0].text, "first document");
    }

    #[test]
    fn bad_pdf_is_skipped_not_fatal() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("broken.pdf"), b"not a pdf").unwrap();
        fs::write(tmp.path().join("ok.txt"), "survives the bad sibling").unwrap();

        let docs = load_corpus(tmp.path()).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].path, "ok.txt");
    }

    #[test]
    fn empty_files_are_skipped() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("empty.txt"), "   \n").unwrap();

        let docs = load_corpus(tmp.path()).unwrap();
        assert!(docs.is_empty());
    }
}
