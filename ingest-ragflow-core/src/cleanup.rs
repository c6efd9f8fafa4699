use std::path::Path;
use tracing::{info, warn};

/// Delete each named file from `folder` once its document has parsed.
///
/// Returns `false` only when `folder` is not a directory. Missing files and
/// failed removals are logged and do not stop the remaining removals.
pub fn remove_processed_files(folder: impl AsRef<Path>, file_names: &[String]) -> bool {
    let folder = folder.as_ref();
    if !folder.is_dir() {
        warn!(folder = %folder.display(), "[CLEANUP] Folder does not exist or is not a directory");
        return false;
    }

    for name in file_names {
        let path = folder.join(name);
        if !path.exists() {
            info!(path = %path.display(), "[CLEANUP] File already gone, skipping");
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => info!(path = %path.display(), "[CLEANUP] Removed processed file"),
            Err(e) => warn!(path = %path.display(), error = %e, "[CLEANUP] Could not remove file"),
        }
    }
    true
}
