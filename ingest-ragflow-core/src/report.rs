//! End-of-run summary combining download, upload and parse outcomes.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use crate::contract::DocumentId;
use crate::dispatcher::UploadResult;
use crate::harvest::{DownloadOutcome, DownloadResult};
use crate::monitor::MonitorReport;

const RULE_WIDTH: usize = 50;

#[derive(Debug, Default)]
pub struct IngestReport {
    pub downloads: Vec<DownloadResult>,
    pub uploads: Vec<UploadResult>,
    pub parsing: MonitorReport,
}

impl IngestReport {
    pub fn uploads_succeeded(&self) -> usize {
        self.uploads.iter().filter(|u| u.is_success()).count()
    }

    pub fn uploads_failed(&self) -> usize {
        self.uploads.len() - self.uploads_succeeded()
    }

    pub fn parses_succeeded(&self) -> usize {
        self.parsing.succeeded.len()
    }

    pub fn parses_failed(&self) -> usize {
        self.parsing.failed.len()
    }

    pub fn downloads_failed(&self) -> usize {
        self.downloads.iter().filter(|d| d.is_failure()).count()
    }

    /// True when nothing failed at any stage.
    pub fn is_clean(&self) -> bool {
        self.downloads_failed() == 0 && self.uploads_failed() == 0 && self.parses_failed() == 0
    }

    /// Local paths of the files whose documents parsed successfully.
    pub fn parsed_paths(&self) -> Vec<PathBuf> {
        self.uploads
            .iter()
            .filter(|u| {
                u.document_id()
                    .and_then(|id| self.parsing.outcome(id))
                    .is_some_and(|o| o.is_success())
            })
            .map(|u| u.path.clone())
            .collect()
    }

    fn upload_names(&self) -> HashMap<DocumentId, String> {
        self.uploads
            .iter()
            .filter_map(|u| u.document_id().map(|id| (id.clone(), u.file_name())))
            .collect()
    }
}

impl fmt::Display for IngestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "-".repeat(RULE_WIDTH);
        writeln!(f, "Final Summary:")?;
        writeln!(f, "{rule}")?;

        if !self.downloads.is_empty() {
            let saved = self
                .downloads
                .iter()
                .filter(|d| matches!(d.outcome, DownloadOutcome::Saved { .. }))
                .count();
            let present = self
                .downloads
                .iter()
                .filter(|d| matches!(d.outcome, DownloadOutcome::AlreadyPresent { .. }))
                .count();
            let skipped = self
                .downloads
                .iter()
                .filter(|d| matches!(d.outcome, DownloadOutcome::Skipped { .. }))
                .count();
            writeln!(
                f,
                "Downloads: {saved} saved, {present} already present, {skipped} skipped, {} failed",
                self.downloads_failed()
            )?;
        }

        writeln!(
            f,
            "Uploads: {} succeeded, {} failed",
            self.uploads_succeeded(),
            self.uploads_failed()
        )?;
        writeln!(
            f,
            "Parses: {} succeeded, {} failed",
            self.parses_succeeded(),
            self.parses_failed()
        )?;

        let failed_uploads: Vec<_> = self.uploads.iter().filter(|u| !u.is_success()).collect();
        if !failed_uploads.is_empty() {
            writeln!(f, "Failed uploads:")?;
            for upload in failed_uploads {
                if let Some(error) = upload.error() {
                    writeln!(f, "  {}: {error}", upload.file_name())?;
                }
            }
        }

        if self.parsing.total() > 0 {
            let names = self.upload_names();
            writeln!(f, "Documents:")?;
            for outcome in self.parsing.outcomes() {
                let name = outcome
                    .name
                    .clone()
                    .or_else(|| names.get(&outcome.id).cloned())
                    .unwrap_or_else(|| outcome.id.to_string());
                write!(
                    f,
                    "  {name} | Status: {} | Fragments: {}",
                    outcome.state, outcome.chunk_count
                )?;
                match &outcome.detail {
                    Some(detail) => writeln!(f, " | {detail}")?,
                    None => writeln!(f)?,
                }
            }
        }

        writeln!(f, "{rule}")?;
        if self.is_clean() {
            write!(f, "Process completed successfully")
        } else {
            write!(f, "Process completed with failures")
        }
    }
}
