use std::path::PathBuf;
use thiserror::Error;

/// Errors shared by every pipeline stage and remote client.
///
/// `Auth` and `NotFound` on a root path are fatal for a run. The rest are
/// recorded per file or per document and end up in the final report.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("network error: {0}")]
    Network(String),
    #[error("remote error: {0}")]
    Remote(String),
}

impl IngestError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IngestError::Io {
            path: path.into(),
            source,
        }
    }

    /// Fatal errors abort a run instead of being recorded against one file.
    pub fn is_fatal(&self) -> bool {
        matches!(self, IngestError::Auth(_) | IngestError::NotFound(_))
    }
}

impl From<reqwest::Error> for IngestError {
    fn from(e: reqwest::Error) -> Self {
        if e.status() == Some(reqwest::StatusCode::NOT_FOUND) {
            IngestError::NotFound(e.to_string())
        } else {
            IngestError::Network(e.to_string())
        }
    }
}
