//! Knowledge-base document loader.
//!
//! Walks a directory recursively and reads every file whose extension is in
//! the configured list as UTF-8 text. A file that cannot be read does not
//! abort the walk; it is reported in [`LoadReport::skipped`].

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use walkdir::WalkDir;

use crate::document::Document;
use crate::error::{RagError, Result};

/// Outcome of loading a knowledge-base directory.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Documents read successfully, ordered by path.
    pub documents: Vec<Document>,
    /// One [`RagError::DocumentLoadError`] per file that could not be loaded.
    pub skipped: Vec<RagError>,
}

impl LoadReport {
    /// Return the number of files that could not be loaded.
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

/// Files found under a knowledge-base root.
#[derive(Debug, Default)]
pub struct Discovery {
    /// Matching files, sorted by path.
    pub files: Vec<PathBuf>,
    /// One [`RagError::DocumentLoadError`] per entry the walk could not read,
    /// such as an unreadable directory or a symlink loop.
    pub errors: Vec<RagError>,
}

/// Discover candidate files under `root`, sorted by path.
///
/// Symlinks are followed. `excluded` (typically the index directory) is not
/// descended into. Entries the walk cannot read are returned in
/// [`Discovery::errors`] rather than aborting the walk.
///
/// # Errors
///
/// Returns [`RagError::DocumentLoadError`] if `root` does not exist or is
/// not a directory.
pub fn discover_files(
    root: impl AsRef<Path>,
    extensions: &[String],
    excluded: Option<&Path>,
) -> Result<Discovery> {
    let root = root.as_ref();
    if !root.is_dir() {
        return Err(RagError::DocumentLoadError {
            path: root.to_path_buf(),
            message: "knowledge base directory does not exist".to_string(),
        });
    }

    let mut discovery = Discovery::default();
    let walker = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| excluded.is_none_or(|dir| entry.path() != dir));

    for entry in walker {
        match entry {
            Ok(entry) if entry.file_type().is_file() && has_extension(entry.path(), extensions) => {
                discovery.files.push(entry.into_path());
            }
            Ok(_) => {}
            Err(e) => discovery.errors.push(RagError::DocumentLoadError {
                path: e.path().unwrap_or(root).to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    discovery.files.sort();
    Ok(discovery)
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|wanted| wanted.eq_ignore_ascii_case(ext)))
}

/// Load every matching file under `root` as a [`Document`].
///
/// Document ids are the file paths relative to `root`; each document's
/// metadata records the full path under
/// [`SOURCE_METADATA_KEY`](crate::document::SOURCE_METADATA_KEY).
///
/// # Errors
///
/// Fails only if `root` itself is unusable; per-file failures are collected
/// in the returned report.
pub fn load_directory(
    root: impl AsRef<Path>,
    extensions: &[String],
    excluded: Option<&Path>,
) -> Result<LoadReport> {
    let root = root.as_ref();
    let mut report = LoadReport::default();

    let discovery = discover_files(root, extensions, excluded)?;
    for e in discovery.errors {
        warn!(path = %root.display(), error = %e, "skipping unreadable directory entry");
        report.skipped.push(e);
    }

    for path in discovery.files {
        match load_file(root, &path) {
            Ok(document) => report.documents.push(document),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable document");
                report.skipped.push(e);
            }
        }
    }

    info!(
        path = %root.display(),
        document_count = report.documents.len(),
        skipped_count = report.skipped_count(),
        "loaded knowledge base"
    );
    Ok(report)
}

fn load_file(root: &Path, path: &Path) -> Result<Document> {
    let text = fs::read_to_string(path).map_err(|e| RagError::DocumentLoadError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let id = path.strip_prefix(root).unwrap_or(path).to_string_lossy().replace('\\', "/");
    Ok(Document::new(id, text).with_source(path.to_string_lossy()))
}
