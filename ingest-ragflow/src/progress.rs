//! Human-friendly progress on stderr, so stdout keeps only the final summary.

use std::io::Write;

use ingest_ragflow_core::progress::{ProgressEvent, ProgressReporter};

pub struct StderrProgress;

impl StderrProgress {
    fn line(event: &ProgressEvent) -> String {
        match event {
            ProgressEvent::Discovered { total } => format!("found {total} PDF files\n"),
            ProgressEvent::Downloaded {
                attempted,
                total,
                item_id,
            } => format!("download  {attempted} / {total} items  ({item_id})\n"),
            ProgressEvent::Uploaded {
                attempted,
                total,
                path,
            } => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                format!("upload  {attempted} / {total} files  ({name})\n")
            }
            ProgressEvent::DocumentFinished { id, succeeded } => {
                let status = if *succeeded { "done" } else { "failed" };
                format!("parse  {id}  {status}\n")
            }
            ProgressEvent::Polled {
                round,
                completed,
                total,
            } => format!("parse  round {round}  {completed} / {total} documents finished\n"),
        }
    }
}

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = Self::line(&event);
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn upload_line_shows_counts_and_basename() {
        let line = StderrProgress::line(&ProgressEvent::Uploaded {
            attempted: 2,
            total: 5,
            path: PathBuf::from("/data/in/thesis.pdf"),
        });
        assert_eq!(line, "upload  2 / 5 files  (thesis.pdf)\n");
    }
}
