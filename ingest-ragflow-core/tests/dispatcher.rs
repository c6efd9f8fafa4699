use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ingest_ragflow_core::contract::{
    Dataset, DocumentId, DocumentStatus, KnowledgeBase, MockKnowledgeBase,
};
use ingest_ragflow_core::dispatcher::{Dispatcher, UploadOutcome};
use ingest_ragflow_core::error::IngestError;
use ingest_ragflow_core::progress::{ProgressEvent, ProgressReporter};
use tempfile::{tempdir, TempDir};

fn dataset() -> Dataset {
    Dataset {
        id: "ds-1".to_string(),
        name: "test_knowledge".to_string(),
    }
}

fn write_pdfs(dir: &TempDir, names: &[&str]) -> Vec<PathBuf> {
    names
        .iter()
        .map(|name| {
            let path = dir.path().join(name);
            fs::write(&path, format!("%PDF-{name}")).unwrap();
            path
        })
        .collect()
}

/// Knowledge base that records peak concurrency and hands out fresh ids.
#[derive(Default)]
struct SlowKnowledgeBase {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    uploaded: Mutex<Vec<String>>,
}

#[async_trait]
impl KnowledgeBase for SlowKnowledgeBase {
    async fn upload_document(
        &self,
        _dataset: &Dataset,
        filename: &str,
        _content: Vec<u8>,
    ) -> Result<DocumentId, IngestError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.uploaded.lock().unwrap().push(filename.to_string());
        Ok(DocumentId(uuid::Uuid::new_v4().to_string()))
    }

    async fn trigger_parse(&self, _: &Dataset, _: &[DocumentId]) -> Result<(), IngestError> {
        Ok(())
    }

    async fn query_status(
        &self,
        _: &Dataset,
        _: &DocumentId,
    ) -> Result<Option<DocumentStatus>, IngestError> {
        Ok(None)
    }
}

#[derive(Default)]
struct RecordingProgress {
    attempted: Mutex<Vec<usize>>,
}

impl ProgressReporter for RecordingProgress {
    fn report(&self, event: ProgressEvent) {
        if let ProgressEvent::Uploaded { attempted, .. } = event {
            self.attempted.lock().unwrap().push(attempted);
        }
    }
}

#[tokio::test]
async fn quota_failure_is_isolated_to_one_file() {
    let dir = tempdir().unwrap();
    let files = write_pdfs(&dir, &["a.pdf", "b.pdf", "c.pdf"]);

    let mut kb = MockKnowledgeBase::new();
    kb.expect_upload_document()
        .times(3)
        .returning(|_, filename, _| {
            if filename == "c.pdf" {
                Err(IngestError::Remote("quota exceeded".to_string()))
            } else {
                Ok(DocumentId(format!("doc-{filename}")))
            }
        });

    let results = Dispatcher::new(2)
        .dispatch(Arc::new(kb), &dataset(), files)
        .await;

    assert_eq!(results.len(), 3);
    assert_eq!(results.iter().filter(|r| r.is_success()).count(), 2);
    let failed: Vec<_> = results.iter().filter(|r| !r.is_success()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].file_name(), "c.pdf");
    assert!(failed[0].error().unwrap().to_string().contains("quota"));

    let a = results.iter().find(|r| r.file_name() == "a.pdf").unwrap();
    assert_eq!(a.document_id(), Some(&DocumentId::from("doc-a.pdf")));
}

#[tokio::test]
async fn unreadable_files_fail_without_upload_and_without_stopping_others() {
    let dir = tempdir().unwrap();
    let mut files = write_pdfs(&dir, &["a.pdf", "b.pdf"]);
    files.push(dir.path().join("missing-1.pdf"));
    files.push(dir.path().join("missing-2.pdf"));

    let mut kb = MockKnowledgeBase::new();
    kb.expect_upload_document()
        .times(2)
        .returning(|_, filename, _| Ok(DocumentId(filename.to_string())));

    let results = Dispatcher::new(3)
        .dispatch(Arc::new(kb), &dataset(), files.clone())
        .await;

    assert_eq!(results.len(), files.len());
    let io_failures = results
        .iter()
        .filter(|r| matches!(r.outcome, UploadOutcome::Failed { error: IngestError::Io { .. } }))
        .count();
    assert_eq!(io_failures, 2);
    assert_eq!(results.iter().filter(|r| r.is_success()).count(), 2);

    let returned: HashSet<_> = results.iter().map(|r| r.path.clone()).collect();
    let expected: HashSet<_> = files.into_iter().collect();
    assert_eq!(returned, expected);
}

#[tokio::test]
async fn every_file_unreadable_never_calls_the_knowledge_base() {
    let dir = tempdir().unwrap();
    let files: Vec<PathBuf> = (0..4)
        .map(|i| dir.path().join(format!("gone-{i}.pdf")))
        .collect();

    let mut kb = MockKnowledgeBase::new();
    kb.expect_upload_document().never();

    let results = Dispatcher::new(2)
        .dispatch(Arc::new(kb), &dataset(), files)
        .await;

    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|r| !r.is_success()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn in_flight_uploads_never_exceed_concurrency() {
    let dir = tempdir().unwrap();
    let names: Vec<String> = (0..12).map(|i| format!("f{i}.pdf")).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let files = write_pdfs(&dir, &name_refs);

    let kb = Arc::new(SlowKnowledgeBase::default());
    let results = Dispatcher::new(3)
        .dispatch(Arc::clone(&kb), &dataset(), files)
        .await;

    assert_eq!(results.len(), 12);
    assert!(results.iter().all(|r| r.is_success()));
    let peak = kb.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak concurrency was {peak}");
    assert!(peak >= 1);
    assert_eq!(kb.in_flight.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn dispatching_the_same_files_twice_creates_new_documents() {
    let dir = tempdir().unwrap();
    let files = write_pdfs(&dir, &["a.pdf", "b.pdf"]);
    let kb = Arc::new(SlowKnowledgeBase::default());
    let dispatcher = Dispatcher::new(2);

    let first = dispatcher
        .dispatch(Arc::clone(&kb), &dataset(), files.clone())
        .await;
    let second = dispatcher
        .dispatch(Arc::clone(&kb), &dataset(), files)
        .await;

    let ids: HashSet<_> = first
        .iter()
        .chain(second.iter())
        .filter_map(|r| r.document_id().cloned())
        .collect();
    assert_eq!(ids.len(), 4);
    assert_eq!(kb.uploaded.lock().unwrap().len(), 4);
    assert_eq!(dispatcher.attempted(), 4);
}

#[tokio::test]
async fn attempted_counter_and_progress_grow_monotonically() {
    let dir = tempdir().unwrap();
    let files = write_pdfs(&dir, &["a.pdf", "b.pdf", "c.pdf", "d.pdf", "e.pdf"]);
    let kb = Arc::new(SlowKnowledgeBase::default());
    let progress = Arc::new(RecordingProgress::default());
    let dispatcher = Dispatcher::new(2);
    let counter = dispatcher.attempted_counter();

    dispatcher
        .dispatch_with_progress(kb, &dataset(), files, progress.clone())
        .await;

    assert_eq!(counter.load(Ordering::SeqCst), 5);
    let mut seen = progress.attempted.lock().unwrap().clone();
    seen.sort_unstable();
    assert_eq!(seen, vec![1, 2, 3, 4, 5]);
}

#[test]
fn zero_concurrency_is_clamped_to_one() {
    assert_eq!(Dispatcher::new(0).concurrency(), 1);
    assert_eq!(Dispatcher::new(8).concurrency(), 8);
}

#[tokio::test]
async fn empty_file_list_returns_no_results() {
    let mut kb = MockKnowledgeBase::new();
    kb.expect_upload_document().never();
    let results = Dispatcher::new(4)
        .dispatch(Arc::new(kb), &dataset(), Vec::new())
        .await;
    assert!(results.is_empty());
}
