//! Bounded-parallel upload of local files to a knowledge-base dataset.
//!
//! Every file gets its own tokio task; a semaphore keeps at most
//! `concurrency` of them between "read started" and "upload returned".
//! Each task hands back a tagged [`UploadOutcome`] through its join handle, so
//! one failing file never aborts its siblings. Results are collected only
//! after every task has finished.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::contract::{Dataset, DocumentId, KnowledgeBase};
use crate::error::IngestError;
use crate::progress::{NoProgress, ProgressEvent, ProgressReporter};
use crate::reader::read_binary_file_async;

/// Outcome of one upload attempt.
#[derive(Debug)]
pub enum UploadOutcome {
    Succeeded { document_id: DocumentId },
    Failed { error: IngestError },
}

/// One entry per attempted file. Correlate by `path`, not by position.
#[derive(Debug)]
pub struct UploadResult {
    pub path: PathBuf,
    pub outcome: UploadOutcome,
}

impl UploadResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, UploadOutcome::Succeeded { .. })
    }

    pub fn document_id(&self) -> Option<&DocumentId> {
        match &self.outcome {
            UploadOutcome::Succeeded { document_id } => Some(document_id),
            UploadOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&IngestError> {
        match &self.outcome {
            UploadOutcome::Failed { error } => Some(error),
            UploadOutcome::Succeeded { .. } => None,
        }
    }

    /// Basename sent to the knowledge base as the document name.
    pub fn file_name(&self) -> String {
        upload_name(&self.path)
    }
}

pub(crate) fn upload_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub struct Dispatcher {
    concurrency: usize,
    attempted: Arc<AtomicUsize>,
}

impl Dispatcher {
    /// `concurrency` is clamped to at least one worker.
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            attempted: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Files attempted so far across every `dispatch` call on this dispatcher.
    pub fn attempted(&self) -> usize {
        self.attempted.load(Ordering::SeqCst)
    }

    /// Shared handle to the attempted counter, for observing a dispatch in flight.
    pub fn attempted_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.attempted)
    }

    pub async fn dispatch<K>(
        &self,
        kb: Arc<K>,
        dataset: &Dataset,
        files: Vec<PathBuf>,
    ) -> Vec<UploadResult>
    where
        K: KnowledgeBase + ?Sized + 'static,
    {
        self.dispatch_with_progress(kb, dataset, files, Arc::new(NoProgress))
            .await
    }

    /// Upload every file and return exactly one [`UploadResult`] per input path.
    pub async fn dispatch_with_progress<K>(
        &self,
        kb: Arc<K>,
        dataset: &Dataset,
        files: Vec<PathBuf>,
        progress: Arc<dyn ProgressReporter>,
    ) -> Vec<UploadResult>
    where
        K: KnowledgeBase + ?Sized + 'static,
    {
        let total = files.len();
        info!(
            total,
            concurrency = self.concurrency,
            dataset = %dataset.name,
            "[DISPATCH] Starting upload batch"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let dataset = Arc::new(dataset.clone());
        let mut handles = Vec::with_capacity(total);

        for path in files {
            let kb = Arc::clone(&kb);
            let semaphore = Arc::clone(&semaphore);
            let dataset = Arc::clone(&dataset);
            let attempted = Arc::clone(&self.attempted);
            let progress = Arc::clone(&progress);
            let task_path = path.clone();

            let handle = tokio::spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(permit) => {
                        let outcome = upload_one(&*kb, &dataset, &task_path).await;
                        drop(permit);
                        outcome
                    }
                    Err(e) => UploadOutcome::Failed {
                        error: IngestError::Remote(format!("upload pool closed: {e}")),
                    },
                };
                let n = attempted.fetch_add(1, Ordering::SeqCst) + 1;
                progress.report(ProgressEvent::Uploaded {
                    attempted: n,
                    total,
                    path: task_path,
                });
                outcome
            });
            handles.push((path, handle));
        }

        let mut results = Vec::with_capacity(total);
        for (path, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(join_err) => {
                    // The remote side may hold a document we can no longer track.
                    error!(
                        path = %path.display(),
                        error = %join_err,
                        "[DISPATCH][ERROR] Upload task aborted; remote state unknown, reconcile manually"
                    );
                    UploadOutcome::Failed {
                        error: IngestError::Remote(format!("upload task aborted: {join_err}")),
                    }
                }
            };
            results.push(UploadResult { path, outcome });
        }

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        info!(
            total,
            succeeded,
            failed = total - succeeded,
            "[DISPATCH] Upload batch complete"
        );
        results
    }
}

async fn upload_one<K>(kb: &K, dataset: &Dataset, path: &Path) -> UploadOutcome
where
    K: KnowledgeBase + ?Sized,
{
    let content = match read_binary_file_async(path).await {
        Ok(content) => content,
        Err(error) => {
            warn!(path = %path.display(), error = %error, "[DISPATCH] Could not read file, skipping");
            return UploadOutcome::Failed { error };
        }
    };

    let filename = upload_name(path);
    debug!(file = %filename, size = content.len(), "[DISPATCH][UPLOAD] Uploading file");
    match kb.upload_document(dataset, &filename, content).await {
        Ok(document_id) => {
            info!(file = %filename, document_id = %document_id, "[DISPATCH][UPLOAD] Upload succeeded");
            UploadOutcome::Succeeded { document_id }
        }
        Err(error) => {
            error!(file = %filename, error = %error, "[DISPATCH][ERROR][UPLOAD] Upload failed");
            UploadOutcome::Failed { error }
        }
    }
}
