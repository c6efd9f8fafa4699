//! Drives a batch of uploaded documents through parsing until each one is terminal.
//!
//! Per document: submitted → parse triggered → polled → succeeded | failed.
//! The loop suspends only in `sleep(poll_interval)` between rounds. A document
//! the knowledge base stops listing counts as failed; a status query error
//! leaves it in the outstanding set for the next round.

use std::collections::HashSet;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::contract::{Dataset, DocumentId, DocumentStatus, KnowledgeBase, ProcessingState};
use crate::progress::{NoProgress, ProgressEvent, ProgressReporter};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2500);

/// Terminal classification of one watched document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentOutcome {
    pub id: DocumentId,
    pub name: Option<String>,
    pub state: ProcessingState,
    pub chunk_count: u64,
    pub detail: Option<String>,
}

impl DocumentOutcome {
    fn from_status(status: DocumentStatus) -> Self {
        let detail = match status.state {
            ProcessingState::Failed => status
                .message
                .filter(|m| !m.trim().is_empty())
                .or_else(|| Some("parse failed".to_string())),
            _ => None,
        };
        Self {
            id: status.id,
            name: Some(status.name),
            state: status.state,
            chunk_count: status.chunk_count,
            detail,
        }
    }

    fn failed(id: DocumentId, detail: impl Into<String>) -> Self {
        Self {
            id,
            name: None,
            state: ProcessingState::Failed,
            chunk_count: 0,
            detail: Some(detail.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == ProcessingState::Succeeded
    }
}

/// Final tally of a monitoring run. `succeeded` and `failed` partition the watched set.
#[derive(Debug, Default, Clone)]
pub struct MonitorReport {
    pub succeeded: Vec<DocumentOutcome>,
    pub failed: Vec<DocumentOutcome>,
    /// Status-poll rounds issued.
    pub rounds: usize,
}

impl MonitorReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn outcomes(&self) -> impl Iterator<Item = &DocumentOutcome> {
        self.succeeded.iter().chain(self.failed.iter())
    }

    pub fn outcome(&self, id: &DocumentId) -> Option<&DocumentOutcome> {
        self.outcomes().find(|o| &o.id == id)
    }

    fn record(&mut self, outcome: DocumentOutcome, progress: &dyn ProgressReporter) {
        progress.report(ProgressEvent::DocumentFinished {
            id: outcome.id.clone(),
            succeeded: outcome.is_success(),
        });
        if outcome.is_success() {
            self.succeeded.push(outcome);
        } else {
            self.failed.push(outcome);
        }
    }
}

#[derive(Debug, Clone)]
pub struct Monitor {
    poll_interval: Duration,
    max_wait: Option<Duration>,
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl Monitor {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            max_wait: None,
        }
    }

    /// Give up on documents still running after `max_wait`. `None` polls until every document is terminal.
    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub async fn run<K>(&self, kb: &K, dataset: &Dataset, ids: Vec<DocumentId>) -> MonitorReport
    where
        K: KnowledgeBase + ?Sized,
    {
        self.run_with_progress(kb, dataset, ids, &NoProgress).await
    }

    pub async fn run_with_progress<K>(
        &self,
        kb: &K,
        dataset: &Dataset,
        ids: Vec<DocumentId>,
        progress: &dyn ProgressReporter,
    ) -> MonitorReport
    where
        K: KnowledgeBase + ?Sized,
    {
        let mut seen = HashSet::new();
        let mut outstanding: Vec<DocumentId> =
            ids.into_iter().filter(|id| seen.insert(id.clone())).collect();
        let total = outstanding.len();
        let mut report = MonitorReport::default();

        if total == 0 {
            info!("[MONITOR] Nothing to monitor");
            return report;
        }

        info!(total, dataset = %dataset.name, "[MONITOR] Triggering parse");
        if let Err(e) = kb.trigger_parse(dataset, &outstanding).await {
            error!(error = %e, total, "[MONITOR][ERROR] Parse request failed for batch");
            for id in outstanding.drain(..) {
                report.record(
                    DocumentOutcome::failed(id, format!("parse request failed: {e}")),
                    progress,
                );
            }
            return report;
        }

        let started = Instant::now();
        loop {
            report.rounds += 1;
            let statuses = join_all(
                outstanding
                    .iter()
                    .map(|id| kb.query_status(dataset, id)),
            )
            .await;

            let mut still_running = Vec::with_capacity(outstanding.len());
            for (id, status) in outstanding.into_iter().zip(statuses) {
                match status {
                    Ok(Some(status)) if status.state.is_terminal() => {
                        info!(
                            document_id = %id,
                            name = %status.name,
                            state = %status.state,
                            chunks = status.chunk_count,
                            "[MONITOR] Document reached terminal state"
                        );
                        report.record(DocumentOutcome::from_status(status), progress);
                    }
                    Ok(Some(status)) => {
                        debug!(
                            document_id = %id,
                            state = %status.state,
                            progress = status.progress,
                            "[MONITOR] Document still in progress"
                        );
                        still_running.push(id);
                    }
                    Ok(None) => {
                        warn!(document_id = %id, "[MONITOR] Document no longer listed, marking failed");
                        report.record(
                            DocumentOutcome::failed(id, "document no longer listed by the knowledge base"),
                            progress,
                        );
                    }
                    Err(e) => {
                        warn!(document_id = %id, error = %e, "[MONITOR] Status query failed, will retry next round");
                        still_running.push(id);
                    }
                }
            }
            outstanding = still_running;

            let completed = total - outstanding.len();
            progress.report(ProgressEvent::Polled {
                round: report.rounds,
                completed,
                total,
            });
            info!(round = report.rounds, completed, total, "[MONITOR] Poll round complete");

            if outstanding.is_empty() {
                break;
            }

            if let Some(max_wait) = self.max_wait {
                if started.elapsed() >= max_wait {
                    warn!(
                        remaining = outstanding.len(),
                        waited_secs = started.elapsed().as_secs_f64(),
                        "[MONITOR] Giving up on documents still in progress"
                    );
                    for id in outstanding.drain(..) {
                        report.record(
                            DocumentOutcome::failed(id, "timed out waiting for parse"),
                            progress,
                        );
                    }
                    break;
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }

        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            rounds = report.rounds,
            "[MONITOR] Parsing completed for all documents"
        );
        report
    }
}
