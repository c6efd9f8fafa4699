//! # contract: interfaces to the two remote platforms
//!
//! This module defines the two traits the pipeline is written against and the
//! plain data types that cross them:
//!
//! - [`Repository`]: the DSpace side (authentication, collections, items, bitstreams).
//! - [`KnowledgeBase`]: the RAGFlow side (upload, trigger parse, query status).
//!
//! ## Mocking & Testing
//! - Both traits are annotated for `mockall`; `MockRepository` and `MockKnowledgeBase`
//!   are exported when the `test-export-mocks` feature is on (the default).
//!
//! ## Adding New Platforms
//! - Implement the trait for the new client and map every upstream failure into
//!   an [`IngestError`] variant. The pipeline never inspects transport errors directly.

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::IngestError;

/// Login details for the repository. The password never shows up in `Debug`.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Authenticated repository session, created once and passed to every call.
#[derive(Clone, Default)]
pub struct Session {
    cookie: Option<String>,
}

impl Session {
    /// Session for public endpoints: no cookie attached.
    pub fn anonymous() -> Self {
        Self { cookie: None }
    }

    pub fn from_cookie(cookie: impl Into<String>) -> Self {
        Self {
            cookie: Some(cookie.into()),
        }
    }

    pub fn cookie(&self) -> Option<&str> {
        self.cookie.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.cookie.is_some()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

/// A DSpace collection as returned by `GET /collections`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    #[serde(rename = "uuid")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(rename = "numberItems", default)]
    pub item_count: Option<u64>,
}

impl Collection {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("No name")
    }
}

/// A file object stored against an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bitstream {
    #[serde(rename = "uuid")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "bundleName", default)]
    pub bundle: Option<String>,
    #[serde(rename = "sizeBytes", default)]
    pub size_bytes: u64,
    #[serde(rename = "mimeType", default)]
    pub mime_type: Option<String>,
}

impl Bitstream {
    pub fn file_name(&self) -> &str {
        self.name.as_deref().unwrap_or("downloaded_file")
    }
}

/// A repository item with its bitstreams expanded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    #[serde(rename = "uuid")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub bitstreams: Vec<Bitstream>,
}

impl Item {
    /// The bitstream holding the deposited file: the first one in the
    /// `ORIGINAL` bundle, falling back to the first bitstream listed.
    pub fn primary_bitstream(&self) -> Option<&Bitstream> {
        self.bitstreams
            .iter()
            .find(|b| b.bundle.as_deref() == Some("ORIGINAL"))
            .or_else(|| self.bitstreams.first())
    }
}

/// Handle to a knowledge-base dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    pub name: String,
}

/// Identifier assigned by the knowledge base to an uploaded document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        DocumentId(s.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(s: String) -> Self {
        DocumentId(s)
    }
}

/// Parse state of one document on the knowledge-base side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessingState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl ProcessingState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ProcessingState::Succeeded | ProcessingState::Failed)
    }
}

impl fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessingState::Queued => "QUEUED",
            ProcessingState::Running => "RUNNING",
            ProcessingState::Succeeded => "DONE",
            ProcessingState::Failed => "FAIL",
        };
        f.write_str(s)
    }
}

/// Snapshot of one document's status as reported by the knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentStatus {
    pub id: DocumentId,
    pub name: String,
    pub state: ProcessingState,
    /// Parse progress in `0.0..=1.0`.
    pub progress: f64,
    pub chunk_count: u64,
    pub message: Option<String>,
}

/// Read side of the DSpace repository.
///
/// Implementations attach the [`Session`] to every request and never mutate it.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Repository: Send + Sync {
    /// Log in and return a session usable by every later call.
    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, IngestError>;

    /// All collections, in the order the repository lists them.
    async fn list_collections(&self, session: &Session) -> Result<Vec<Collection>, IngestError>;

    /// All items of a collection, bitstreams expanded.
    async fn list_items(
        &self,
        collection_id: &str,
        session: &Session,
    ) -> Result<Vec<Item>, IngestError>;

    /// Items across the whole repository, at most `limit` of them. Bitstreams
    /// are not expanded; fetch them per item with [`Repository::get_item`].
    async fn list_repository_items(
        &self,
        session: &Session,
        limit: Option<usize>,
    ) -> Result<Vec<Item>, IngestError>;

    /// One item with its bitstreams.
    async fn get_item(&self, item_id: &str, session: &Session) -> Result<Item, IngestError>;

    /// Full content of a bitstream.
    async fn download_bitstream(
        &self,
        bitstream_id: &str,
        session: &Session,
    ) -> Result<Vec<u8>, IngestError>;
}

/// Write side of the knowledge base.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    /// Upload one document and return the identifier the service assigned to it.
    async fn upload_document(
        &self,
        dataset: &Dataset,
        filename: &str,
        content: Vec<u8>,
    ) -> Result<DocumentId, IngestError>;

    /// Ask the service to start parsing the given documents. Returns once queued.
    async fn trigger_parse(
        &self,
        dataset: &Dataset,
        document_ids: &[DocumentId],
    ) -> Result<(), IngestError>;

    /// Current status of one document, `None` when the service no longer lists it.
    async fn query_status(
        &self,
        dataset: &Dataset,
        document_id: &DocumentId,
    ) -> Result<Option<DocumentStatus>, IngestError>;
}
