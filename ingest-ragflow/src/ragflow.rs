//! # RAGFlow HTTP client
//!
//! Implements [`KnowledgeBase`] against the RAGFlow HTTP API (`{base}/api/v1`),
//! the same API the official Python SDK wraps, and adds the dataset
//! management calls the CLI needs to pick or create a target dataset.
//!
//! Every response is an envelope `{code, message, data}`. `code == 0` is
//! success; any other code becomes an [`IngestError`].
//!
//! - Construct with [`RagflowClient::new`] (base URL and API key, usually from config/env).
//! - Authentication is a bearer token on every request.

use std::time::Duration;

use async_trait::async_trait;
use ingest_ragflow_core::contract::{
    Dataset, DocumentId, DocumentStatus, KnowledgeBase, ProcessingState,
};
use ingest_ragflow_core::error::IngestError;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const DOCUMENT_PAGE_SIZE: usize = 100;

/// Error code RAGFlow uses for an unknown or inaccessible document/dataset.
const CODE_DATA_ERROR: i64 = 102;
/// Error code RAGFlow uses for a bad or missing API key.
const CODE_AUTH_ERROR: i64 = 109;

/// Settings for a dataset created by the CLI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSettings {
    pub name: String,
    pub embedding_model: String,
    pub chunk_method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parser_config: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Value,
}

impl Envelope {
    fn message(&self) -> String {
        self.message
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| format!("code {}", self.code))
    }

    fn into_data(self, what: &str) -> Result<Value, IngestError> {
        match self.code {
            0 => Ok(self.data),
            CODE_AUTH_ERROR => Err(IngestError::Auth(format!("{what}: {}", self.message()))),
            _ => Err(IngestError::Remote(format!("{what}: {}", self.message()))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RemoteDocument {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    run: Value,
    #[serde(default)]
    progress: f64,
    #[serde(default)]
    chunk_count: u64,
    #[serde(default)]
    progress_msg: Option<String>,
}

impl From<RemoteDocument> for DocumentStatus {
    fn from(doc: RemoteDocument) -> Self {
        DocumentStatus {
            state: state_from_run(&doc.run),
            id: DocumentId(doc.id),
            name: doc.name,
            progress: doc.progress.clamp(0.0, 1.0),
            chunk_count: doc.chunk_count,
            message: doc.progress_msg,
        }
    }
}

/// Map RAGFlow's `run` field (name or numeric code) to a [`ProcessingState`].
///
/// Unknown values are treated as still running so the monitor keeps polling.
pub fn state_from_run(run: &Value) -> ProcessingState {
    let raw = match run {
        Value::String(s) => s.trim().to_ascii_uppercase(),
        Value::Number(n) => n.to_string(),
        Value::Null => return ProcessingState::Queued,
        other => other.to_string(),
    };
    match raw.as_str() {
        "UNSTART" | "0" | "SCHEDULE" | "5" => ProcessingState::Queued,
        "RUNNING" | "1" => ProcessingState::Running,
        "DONE" | "3" => ProcessingState::Succeeded,
        "FAIL" | "4" | "CANCEL" | "2" => ProcessingState::Failed,
        _ => {
            warn!(run = %raw, "[RAGFLOW] Unknown document run state, treating as running");
            ProcessingState::Running
        }
    }
}

#[derive(Debug, Clone)]
pub struct RagflowClient {
    client: Client,
    api_url: String,
    api_key: String,
}

impl RagflowClient {
    /// `base_url` is the server root, e.g. `http://localhost:9380`.
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self, IngestError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| IngestError::Network(format!("failed to build HTTP client: {e}")))?;
        let api_key = api_key.into();
        info!(
            base_url,
            api_key_set = !api_key.is_empty(),
            "Initialized RagflowClient"
        );
        Ok(Self {
            client,
            api_url: format!("{}/api/v1", base_url.trim_end_matches('/')),
            api_key,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{}", self.api_url, path))
            .bearer_auth(&self.api_key)
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Envelope, IngestError> {
        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            error!(%status, what, "[RAGFLOW][ERROR] Request rejected");
            return Err(IngestError::Auth(format!("{what} rejected (HTTP {status})")));
        }
        let body = response.text().await?;
        match serde_json::from_str::<Envelope>(&body) {
            Ok(envelope) => Ok(envelope),
            Err(_) if !status.is_success() => {
                error!(%status, what, "[RAGFLOW][ERROR] Request failed");
                Err(IngestError::Remote(format!("{what} failed (HTTP {status}): {body}")))
            }
            Err(e) => Err(IngestError::Remote(format!(
                "{what}: unexpected response body: {e}"
            ))),
        }
    }

    async fn call(&self, request: RequestBuilder, what: &str) -> Result<Value, IngestError> {
        self.send(request, what).await?.into_data(what)
    }

    pub async fn list_datasets(&self) -> Result<Vec<Dataset>, IngestError> {
        let data = self
            .call(
                self.request(Method::GET, "datasets")
                    .query(&[("page", "1"), ("page_size", "1000")]),
                "list datasets",
            )
            .await?;
        let datasets: Vec<Dataset> = decode(data, "list datasets")?;
        debug!(count = datasets.len(), "[RAGFLOW] Datasets listed");
        Ok(datasets)
    }

    /// `None` when no dataset with this id is visible to the API key.
    pub async fn get_dataset_by_id(&self, id: &str) -> Result<Option<Dataset>, IngestError> {
        self.find_dataset(&[("id", id)], "get dataset").await
    }

    pub async fn get_dataset_by_name(&self, name: &str) -> Result<Option<Dataset>, IngestError> {
        self.find_dataset(&[("name", name)], "get dataset").await
    }

    async fn find_dataset(
        &self,
        query: &[(&str, &str)],
        what: &str,
    ) -> Result<Option<Dataset>, IngestError> {
        let envelope = self
            .send(self.request(Method::GET, "datasets").query(query), what)
            .await?;
        // A lookup miss comes back as a data error rather than an empty list.
        if envelope.code == CODE_DATA_ERROR {
            return Ok(None);
        }
        let datasets: Vec<Dataset> = decode(envelope.into_data(what)?, what)?;
        Ok(datasets.into_iter().next())
    }

    pub async fn create_dataset(&self, settings: &DatasetSettings) -> Result<Dataset, IngestError> {
        info!(name = %settings.name, model = %settings.embedding_model, "[RAGFLOW] Creating dataset");
        let data = self
            .call(
                self.request(Method::POST, "datasets").json(settings),
                "create dataset",
            )
            .await?;
        decode(data, "create dataset")
    }

    /// Every document in the dataset, page by page.
    pub async fn list_documents(&self, dataset: &Dataset) -> Result<Vec<DocumentStatus>, IngestError> {
        let path = format!("datasets/{}/documents", dataset.id);
        let mut all = Vec::new();
        for page in 1.. {
            let data = self
                .call(
                    self.request(Method::GET, &path).query(&[
                        ("page", page.to_string()),
                        ("page_size", DOCUMENT_PAGE_SIZE.to_string()),
                    ]),
                    "list documents",
                )
                .await?;
            let docs = documents_from(data, "list documents")?;
            let fetched = docs.len();
            all.extend(docs.into_iter().map(DocumentStatus::from));
            if fetched < DOCUMENT_PAGE_SIZE {
                break;
            }
        }
        Ok(all)
    }
}

fn decode<T: serde::de::DeserializeOwned>(data: Value, what: &str) -> Result<T, IngestError> {
    serde_json::from_value(data)
        .map_err(|e| IngestError::Remote(format!("{what}: unexpected data: {e}")))
}

/// Document listings arrive as `{"docs": [...], "total": n}`.
fn documents_from(data: Value, what: &str) -> Result<Vec<RemoteDocument>, IngestError> {
    match data.get("docs") {
        Some(docs) => decode(docs.clone(), what),
        None if data.is_null() => Ok(Vec::new()),
        None => decode(data, what),
    }
}

#[async_trait]
impl KnowledgeBase for RagflowClient {
    async fn upload_document(
        &self,
        dataset: &Dataset,
        filename: &str,
        content: Vec<u8>,
    ) -> Result<DocumentId, IngestError> {
        let part = Part::bytes(content)
            .file_name(filename.to_string())
            .mime_str("application/pdf")
            .map_err(|e| IngestError::Remote(format!("invalid upload mime type: {e}")))?;
        let form = Form::new().part("file", part);
        let data = self
            .call(
                self.request(Method::POST, &format!("datasets/{}/documents", dataset.id))
                    .multipart(form),
                "upload document",
            )
            .await?;

        let docs: Vec<RemoteDocument> = decode(data, "upload document")?;
        docs.into_iter()
            .next()
            .map(|doc| DocumentId(doc.id))
            .ok_or_else(|| IngestError::Remote("upload document: no document returned".to_string()))
    }

    async fn trigger_parse(
        &self,
        dataset: &Dataset,
        document_ids: &[DocumentId],
    ) -> Result<(), IngestError> {
        info!(dataset = %dataset.name, documents = document_ids.len(), "[RAGFLOW] Requesting parse");
        self.call(
            self.request(Method::POST, &format!("datasets/{}/chunks", dataset.id))
                .json(&json!({ "document_ids": document_ids })),
            "parse documents",
        )
        .await?;
        Ok(())
    }

    async fn query_status(
        &self,
        dataset: &Dataset,
        document_id: &DocumentId,
    ) -> Result<Option<DocumentStatus>, IngestError> {
        let what = "query document";
        let envelope = self
            .send(
                self.request(Method::GET, &format!("datasets/{}/documents", dataset.id))
                    .query(&[("id", document_id.as_str())]),
                what,
            )
            .await?;
        if envelope.code == CODE_DATA_ERROR {
            debug!(document_id = %document_id, message = %envelope.message(), "[RAGFLOW] Document not listed");
            return Ok(None);
        }
        let docs = documents_from(envelope.into_data(what)?, what)?;
        Ok(docs
            .into_iter()
            .find(|doc| doc.id == document_id.as_str())
            .map(DocumentStatus::from))
    }
}
