//! Progress events emitted by the pipeline stages.
//!
//! Stages call [`ProgressReporter::report`] as work advances; the CLI renders
//! the events on stderr so stdout keeps only the final report.

use std::path::PathBuf;

use crate::contract::DocumentId;

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Discovery finished with `total` eligible files.
    Discovered { total: usize },
    /// One bitstream download attempted (saved, skipped or failed).
    Downloaded { attempted: usize, total: usize, item_id: String },
    /// One upload attempted; `attempted` only ever grows.
    Uploaded {
        attempted: usize,
        total: usize,
        path: PathBuf,
    },
    /// One document reached a terminal state.
    DocumentFinished { id: DocumentId, succeeded: bool },
    /// A poll round finished with `completed` of `total` documents terminal.
    Polled {
        round: usize,
        completed: usize,
        total: usize,
    },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Drops every event.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}
