//! Download the deposited file of every item in a collection, or of every item
//! in the repository.
//!
//! Same fan-out shape as the upload dispatcher: one task per item, a semaphore
//! bounding in-flight downloads, tagged results collected from the join handles.
//! Files land in `output_dir` under their repository file name; a later
//! download with the same name overwrites the earlier one.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use regex::Regex;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::contract::{Item, Repository, Session};
use crate::error::IngestError;
use crate::progress::{ProgressEvent, ProgressReporter};

#[derive(Debug, Clone)]
pub struct HarvestOptions {
    pub output_dir: PathBuf,
    pub concurrency: usize,
    /// Keep a file already present under the target name instead of downloading it again.
    pub skip_existing: bool,
}

#[derive(Debug)]
pub enum DownloadOutcome {
    Saved { path: PathBuf, bytes: usize },
    AlreadyPresent { path: PathBuf },
    Skipped { reason: String },
    Failed { error: IngestError },
}

#[derive(Debug)]
pub struct DownloadResult {
    pub item_id: String,
    pub outcome: DownloadOutcome,
}

impl DownloadResult {
    /// Local file for this item, whether downloaded now or kept from an earlier run.
    pub fn local_path(&self) -> Option<&Path> {
        match &self.outcome {
            DownloadOutcome::Saved { path, .. } | DownloadOutcome::AlreadyPresent { path } => {
                Some(path)
            }
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, DownloadOutcome::Failed { .. })
    }
}

/// Replace characters that cannot appear in a file name and strip leading dots.
pub fn sanitize_file_name(name: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    let unsafe_chars =
        UNSAFE.get_or_init(|| Regex::new(r#"[/\\:*?"<>|\x00-\x1f]"#).expect("static pattern"));
    let cleaned = unsafe_chars.replace_all(name.trim(), "_");
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "downloaded_file".to_string()
    } else {
        cleaned.to_string()
    }
}

/// List a collection and download each item's primary bitstream.
///
/// Failing to list the collection is fatal; everything after that is recorded per item.
pub async fn harvest_collection<R>(
    repo: Arc<R>,
    session: &Session,
    collection_id: &str,
    options: &HarvestOptions,
    progress: Arc<dyn ProgressReporter>,
) -> Result<Vec<DownloadResult>, IngestError>
where
    R: Repository + ?Sized + 'static,
{
    tokio::fs::create_dir_all(&options.output_dir)
        .await
        .map_err(|e| IngestError::io(&options.output_dir, e))?;

    info!(collection_id, "[HARVEST] Listing collection items");
    let items = repo.list_items(collection_id, session).await?;
    info!(collection_id, items = items.len(), "[HARVEST] Items found");

    Ok(harvest_items(repo, session, items, options, progress).await)
}

/// List up to `limit` items across the whole repository and download each one's primary bitstream.
///
/// Repository listings carry no bitstreams, so every item is fetched again before
/// its download. Failing to list is fatal; a failed item fetch is recorded per item.
pub async fn harvest_repository_items<R>(
    repo: Arc<R>,
    session: &Session,
    limit: Option<usize>,
    options: &HarvestOptions,
    progress: Arc<dyn ProgressReporter>,
) -> Result<Vec<DownloadResult>, IngestError>
where
    R: Repository + ?Sized + 'static,
{
    tokio::fs::create_dir_all(&options.output_dir)
        .await
        .map_err(|e| IngestError::io(&options.output_dir, e))?;

    info!(?limit, "[HARVEST] Listing repository items");
    let items = repo.list_repository_items(session, limit).await?;
    info!(items = items.len(), "[HARVEST] Items found");

    Ok(fan_out(repo, session, items, options, progress, true).await)
}

/// Download the primary bitstream of items whose bitstreams are already expanded.
pub async fn harvest_items<R>(
    repo: Arc<R>,
    session: &Session,
    items: Vec<Item>,
    options: &HarvestOptions,
    progress: Arc<dyn ProgressReporter>,
) -> Vec<DownloadResult>
where
    R: Repository + ?Sized + 'static,
{
    fan_out(repo, session, items, options, progress, false).await
}

async fn fan_out<R>(
    repo: Arc<R>,
    session: &Session,
    items: Vec<Item>,
    options: &HarvestOptions,
    progress: Arc<dyn ProgressReporter>,
    fetch_item: bool,
) -> Vec<DownloadResult>
where
    R: Repository + ?Sized + 'static,
{
    let total = items.len();
    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let session = Arc::new(session.clone());
    let attempted = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::with_capacity(total);

    for item in items {
        let repo = Arc::clone(&repo);
        let semaphore = Arc::clone(&semaphore);
        let session = Arc::clone(&session);
        let attempted = Arc::clone(&attempted);
        let progress = Arc::clone(&progress);
        let output_dir = options.output_dir.clone();
        let skip_existing = options.skip_existing;
        let item_id = item.id.clone();

        let handle = tokio::spawn(async move {
            let outcome = match semaphore.acquire_owned().await {
                Ok(permit) => {
                    let outcome = match expanded(&*repo, &session, &item, fetch_item).await {
                        Ok(full) => {
                            download_item(&*repo, &session, &full, &output_dir, skip_existing).await
                        }
                        Err(error) => {
                            warn!(item_id = %item.id, error = %error, "[HARVEST] Could not fetch item");
                            DownloadOutcome::Failed { error }
                        }
                    };
                    drop(permit);
                    outcome
                }
                Err(e) => DownloadOutcome::Failed {
                    error: IngestError::Network(format!("download pool closed: {e}")),
                },
            };
            let n = attempted.fetch_add(1, Ordering::SeqCst) + 1;
            progress.report(ProgressEvent::Downloaded {
                attempted: n,
                total,
                item_id: item.id,
            });
            outcome
        });
        handles.push((item_id, handle));
    }

    let mut results = Vec::with_capacity(total);
    for (item_id, handle) in handles {
        let outcome = handle.await.unwrap_or_else(|join_err| {
            error!(item_id = %item_id, error = %join_err, "[HARVEST][ERROR] Download task aborted");
            DownloadOutcome::Failed {
                error: IngestError::Network(format!("download task aborted: {join_err}")),
            }
        });
        results.push(DownloadResult { item_id, outcome });
    }

    let failed = results.iter().filter(|r| r.is_failure()).count();
    info!(total, failed, "[HARVEST] Download complete");
    results
}

async fn expanded<R>(
    repo: &R,
    session: &Session,
    item: &Item,
    fetch_item: bool,
) -> Result<Item, IngestError>
where
    R: Repository + ?Sized,
{
    if fetch_item {
        repo.get_item(&item.id, session).await
    } else {
        Ok(item.clone())
    }
}

async fn download_item<R>(
    repo: &R,
    session: &Session,
    item: &Item,
    output_dir: &Path,
    skip_existing: bool,
) -> DownloadOutcome
where
    R: Repository + ?Sized,
{
    let Some(bitstream) = item.primary_bitstream() else {
        debug!(item_id = %item.id, "[HARVEST] No bitstreams found for item");
        return DownloadOutcome::Skipped {
            reason: "no bitstreams found for this item".to_string(),
        };
    };

    let file_name = sanitize_file_name(bitstream.file_name());
    let path = output_dir.join(&file_name);
    if skip_existing && path.exists() {
        info!(path = %path.display(), "[HARVEST] File already exists, skipping download");
        return DownloadOutcome::AlreadyPresent { path };
    }

    let bytes = match repo.download_bitstream(&bitstream.id, session).await {
        Ok(bytes) => bytes,
        Err(error) => {
            warn!(item_id = %item.id, bitstream_id = %bitstream.id, error = %error, "[HARVEST] Download failed");
            return DownloadOutcome::Failed { error };
        }
    };

    // Write next to the target and rename so a crash never leaves a truncated file under the real name.
    // The temp name carries the item id: items sharing a file name must not share a temp file.
    let partial = output_dir.join(format!("{file_name}.{}.part", sanitize_file_name(&item.id)));
    if let Err(e) = tokio::fs::write(&partial, &bytes).await {
        error!(path = %partial.display(), error = %e, "[HARVEST][ERROR] Failed to write file");
        return DownloadOutcome::Failed {
            error: IngestError::io(&partial, e),
        };
    }
    if let Err(e) = tokio::fs::rename(&partial, &path).await {
        error!(path = %path.display(), error = %e, "[HARVEST][ERROR] Failed to move file into place");
        return DownloadOutcome::Failed {
            error: IngestError::io(&path, e),
        };
    }

    info!(path = %path.display(), bytes = bytes.len(), "[HARVEST] Saved bitstream");
    DownloadOutcome::Saved {
        path,
        bytes: bytes.len(),
    }
}
