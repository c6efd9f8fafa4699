//! High-level pipelines: folder → knowledge base, and repository → knowledge base.
//!
//! Both pipelines end in the same stages:
//!   - dispatch every eligible file with bounded concurrency ([`Dispatcher`])
//!   - trigger parsing for the documents that uploaded and poll them to a
//!     terminal state ([`Monitor`])
//!   - optionally delete local files whose documents parsed
//!
//! # Error Handling
//! Only setup failures return `Err`: a missing root folder, or a repository
//! listing that fails. Per-file and per-document failures are collected into
//! the [`IngestReport`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::cleanup::remove_processed_files;
use crate::config::PipelineOptions;
use crate::contract::{Dataset, KnowledgeBase, Repository, Session};
use crate::discovery::{find_pdf_files, is_allowed};
use crate::dispatcher::{upload_name, Dispatcher};
use crate::error::IngestError;
use crate::harvest::{harvest_collection, harvest_repository_items, DownloadResult, HarvestOptions};
use crate::monitor::Monitor;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::report::IngestReport;

/// Upload `files`, monitor parsing of the successful uploads, then clean up if asked.
pub async fn upload_files<K>(
    kb: Arc<K>,
    dataset: &Dataset,
    files: Vec<PathBuf>,
    options: &PipelineOptions,
    progress: Arc<dyn ProgressReporter>,
) -> IngestReport
where
    K: KnowledgeBase + ?Sized + 'static,
{
    let dispatcher = Dispatcher::new(options.max_tasks);
    let uploads = dispatcher
        .dispatch_with_progress(Arc::clone(&kb), dataset, files, Arc::clone(&progress))
        .await;

    let ids = uploads
        .iter()
        .filter_map(|u| u.document_id().cloned())
        .collect();

    let monitor = Monitor::new(options.poll_interval).with_max_wait(options.max_wait);
    let parsing = monitor
        .run_with_progress(&*kb, dataset, ids, &*progress)
        .await;

    let report = IngestReport {
        downloads: Vec::new(),
        uploads,
        parsing,
    };

    if options.cleanup {
        cleanup_parsed(&report);
    }
    report
}

/// Discover every PDF under `root` and run [`upload_files`] on them.
pub async fn upload_folder<K>(
    kb: Arc<K>,
    dataset: &Dataset,
    root: &Path,
    options: &PipelineOptions,
    progress: Arc<dyn ProgressReporter>,
) -> Result<IngestReport, IngestError>
where
    K: KnowledgeBase + ?Sized + 'static,
{
    info!(root = %root.display(), dataset = %dataset.name, "[INGEST] Starting folder upload");
    let files = find_pdf_files(root)?;
    progress.report(ProgressEvent::Discovered { total: files.len() });
    if files.is_empty() {
        warn!(root = %root.display(), "[INGEST] No PDF files found, nothing to upload");
        return Ok(IngestReport::default());
    }
    Ok(upload_files(kb, dataset, files, options, progress).await)
}

/// Harvest each collection into `folder`, then upload and monitor the resulting PDFs.
///
/// Files already present in `folder` are reused rather than downloaded again.
#[allow(clippy::too_many_arguments)]
pub async fn ingest_collections<R, K>(
    repo: Arc<R>,
    session: &Session,
    kb: Arc<K>,
    dataset: &Dataset,
    collection_ids: &[String],
    folder: &Path,
    options: &PipelineOptions,
    progress: Arc<dyn ProgressReporter>,
) -> Result<IngestReport, IngestError>
where
    R: Repository + ?Sized + 'static,
    K: KnowledgeBase + ?Sized + 'static,
{
    info!(
        collections = collection_ids.len(),
        folder = %folder.display(),
        dataset = %dataset.name,
        "[INGEST] Starting repository ingest"
    );
    let harvest_options = HarvestOptions {
        output_dir: folder.to_path_buf(),
        concurrency: options.max_tasks,
        skip_existing: true,
    };

    let mut downloads = Vec::new();
    for collection_id in collection_ids {
        let results = harvest_collection(
            Arc::clone(&repo),
            session,
            collection_id,
            &harvest_options,
            Arc::clone(&progress),
        )
        .await
        .inspect_err(|e| {
            error!(collection_id = %collection_id, error = %e, "[INGEST][ERROR] Could not harvest collection");
        })?;
        downloads.extend(results);
    }

    Ok(upload_harvested(kb, dataset, downloads, options, progress).await)
}

/// Harvest up to `limit` items from the whole repository into `folder`, then
/// upload and monitor the resulting PDFs.
#[allow(clippy::too_many_arguments)]
pub async fn ingest_repository_items<R, K>(
    repo: Arc<R>,
    session: &Session,
    kb: Arc<K>,
    dataset: &Dataset,
    limit: Option<usize>,
    folder: &Path,
    options: &PipelineOptions,
    progress: Arc<dyn ProgressReporter>,
) -> Result<IngestReport, IngestError>
where
    R: Repository + ?Sized + 'static,
    K: KnowledgeBase + ?Sized + 'static,
{
    info!(?limit, folder = %folder.display(), dataset = %dataset.name, "[INGEST] Starting repository item ingest");
    let harvest_options = HarvestOptions {
        output_dir: folder.to_path_buf(),
        concurrency: options.max_tasks,
        skip_existing: true,
    };
    let downloads = harvest_repository_items(repo, session, limit, &harvest_options, Arc::clone(&progress))
        .await
        .inspect_err(|e| error!(error = %e, "[INGEST][ERROR] Could not list repository items"))?;

    Ok(upload_harvested(kb, dataset, downloads, options, progress).await)
}

async fn upload_harvested<K>(
    kb: Arc<K>,
    dataset: &Dataset,
    downloads: Vec<DownloadResult>,
    options: &PipelineOptions,
    progress: Arc<dyn ProgressReporter>,
) -> IngestReport
where
    K: KnowledgeBase + ?Sized + 'static,
{
    // Two items can share a file name; upload the surviving file once.
    let files: Vec<PathBuf> = downloads
        .iter()
        .filter_map(|d| d.local_path())
        .filter(|p| is_allowed(p))
        .map(Path::to_path_buf)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    progress.report(ProgressEvent::Discovered { total: files.len() });
    info!(files = files.len(), "[INGEST] Harvest complete, uploading");

    let mut report = if files.is_empty() {
        warn!("[INGEST] No PDF files harvested, nothing to upload");
        IngestReport::default()
    } else {
        upload_files(kb, dataset, files, options, progress).await
    };
    report.downloads = downloads;
    report
}

/// Remove local files whose documents parsed successfully. Returns `false` if any folder was missing.
pub fn cleanup_parsed(report: &IngestReport) -> bool {
    let mut by_folder: BTreeMap<PathBuf, Vec<String>> = BTreeMap::new();
    for path in report.parsed_paths() {
        let folder = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        by_folder.entry(folder).or_default().push(upload_name(&path));
    }

    let mut all_ok = true;
    for (folder, names) in by_folder {
        info!(folder = %folder.display(), files = names.len(), "[INGEST] Removing parsed files");
        all_ok &= remove_processed_files(&folder, &names);
    }
    all_ok
}
