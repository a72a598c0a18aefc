use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{RagError, RagResult};

use super::store::Document;

/// Plain-text formats read directly. Everything else needs an external
/// extractor.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "text", "md", "markdown", "rst"];

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Read one source file. The path as given becomes the `source_id`.
pub fn load_source(path: &Path) -> RagResult<Document> {
    if !is_supported(path) {
        return Err(RagError::UnsupportedFormat(path.to_path_buf()));
    }

    let text = fs::read_to_string(path).map_err(|e| RagError::LoadError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    Ok(Document::new(path.display().to_string(), text))
}

/// Expand directories into the supported files beneath them, sorted.
/// Files named explicitly are kept as-is so unsupported ones still fail
/// loudly in [`load_source`]. An entry the walk cannot read, such as a
/// dangling symlink, is a [`RagError::LoadError`].
pub fn collect_sources(paths: &[PathBuf]) -> RagResult<Vec<PathBuf>> {
    let mut sources = Vec::new();

    for path in paths {
        if !path.is_dir() {
            sources.push(path.clone());
            continue;
        }

        let mut found = Vec::new();
        for entry in WalkDir::new(path).follow_links(true) {
            let entry = entry.map_err(|e| RagError::LoadError {
                path: e.path().unwrap_or(path.as_path()).to_path_buf(),
                reason: e.to_string(),
            })?;
            if entry.file_type().is_file() && is_supported(entry.path()) {
                found.push(entry.into_path());
            }
        }
        found.sort();
        sources.extend(found);
    }

    Ok(sources)
}
