use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::IngestError;

/// Extensions accepted for upload, compared case-insensitively.
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf"];

pub fn is_allowed(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            ALLOWED_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
        .unwrap_or(false)
}

/// Recursively collect every PDF under `root`.
///
/// An empty directory yields an empty list. A missing root, or a root that is
/// not a directory, is [`IngestError::NotFound`].
pub fn find_pdf_files(root: impl AsRef<Path>) -> Result<Vec<PathBuf>, IngestError> {
    let root = root.as_ref();
    if !root.is_dir() {
        return Err(IngestError::NotFound(format!(
            "folder does not exist or is not a directory: {}",
            root.display()
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                // Unreadable subdirectories are skipped, not fatal.
                warn!(error = %e, "[DISCOVER] Skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if is_allowed(entry.path()) {
            debug!(path = %entry.path().display(), "[DISCOVER] Found eligible file");
            files.push(entry.into_path());
        }
    }

    files.sort();
    info!(root = %root.display(), count = files.len(), "[DISCOVER] Discovery complete");
    Ok(files)
}
