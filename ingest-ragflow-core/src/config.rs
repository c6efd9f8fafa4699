use std::time::Duration;
use tracing::{debug, info};

use crate::monitor::DEFAULT_POLL_INTERVAL;

pub const DEFAULT_MAX_TASKS: usize = 8;

/// Knobs shared by the upload and ingest pipelines.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    /// Upper bound on concurrent uploads and downloads.
    pub max_tasks: usize,
    pub poll_interval: Duration,
    /// Stop polling after this long. `None` waits until every document is terminal.
    pub max_wait: Option<Duration>,
    /// Delete local files whose documents parsed successfully.
    pub cleanup: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            max_tasks: DEFAULT_MAX_TASKS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: None,
            cleanup: false,
        }
    }
}

impl PipelineOptions {
    pub fn trace_loaded(&self) {
        info!(
            max_tasks = self.max_tasks,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            max_wait_secs = self.max_wait.map(|d| d.as_secs_f64()),
            cleanup = self.cleanup,
            "Loaded pipeline options"
        );
        debug!(?self, "Pipeline options (full debug)");
    }
}
