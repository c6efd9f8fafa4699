use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap};
use axum::routing::{get, post};
use axum::{Json, Router};
use ingest_ragflow::ragflow::{DatasetSettings, RagflowClient};
use ingest_ragflow_core::contract::{Dataset, DocumentId, KnowledgeBase, ProcessingState};
use ingest_ragflow_core::error::IngestError;
use serde_json::{json, Value};

const API_KEY: &str = "ragflow-test-key";

#[derive(Clone, Default)]
struct Recorded {
    parsed: Arc<Mutex<Vec<Value>>>,
    created: Arc<Mutex<Vec<Value>>>,
}

fn authorised(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some(format!("Bearer {API_KEY}").as_str())
}

fn auth_error() -> Json<Value> {
    Json(json!({"code": 109, "message": "Authentication error: API key is invalid!"}))
}

async fn datasets(headers: HeaderMap, Query(q): Query<HashMap<String, String>>) -> Json<Value> {
    if !authorised(&headers) {
        return auth_error();
    }
    let all = [json!({"id": "ds-1", "name": "theses", "chunk_count": 0}), json!({"id": "ds-2", "name": "articles"})];
    let found: Vec<Value> = all
        .into_iter()
        .filter(|d| q.get("id").map_or(true, |id| d["id"] == id.as_str()))
        .filter(|d| q.get("name").map_or(true, |n| d["name"] == n.as_str()))
        .collect();
    if found.is_empty() {
        return Json(json!({"code": 102, "message": "You don't own the dataset."}));
    }
    Json(json!({"code": 0, "data": found}))
}

async fn create_dataset(
    State(rec): State<Recorded>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    if !authorised(&headers) {
        return auth_error();
    }
    rec.created.lock().unwrap().push(body.clone());
    Json(json!({"code": 0, "data": {"id": "ds-new", "name": body["name"]}}))
}

async fn upload(headers: HeaderMap, Path(dataset): Path<String>, body: Bytes) -> Json<Value> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(content_type.starts_with("multipart/form-data"));
    let body = String::from_utf8_lossy(&body);
    assert!(body.contains("name=\"file\""));
    if body.contains("quota.pdf") {
        return Json(json!({"code": 101, "message": "Exceed the maximum file number of a free user!"}));
    }
    assert!(body.contains("%PDF-1.7"));
    Json(json!({"code": 0, "data": [{"id": format!("doc-in-{dataset}"), "name": "thesis.pdf", "run": "UNSTART"}]}))
}

async fn parse(State(rec): State<Recorded>, Json(body): Json<Value>) -> Json<Value> {
    rec.parsed.lock().unwrap().push(body);
    Json(json!({"code": 0}))
}

async fn documents(Query(q): Query<HashMap<String, String>>) -> Json<Value> {
    let docs = [
        json!({"id": "doc-done", "name": "a.pdf", "run": "DONE", "progress": 1.0, "chunk_count": 42}),
        json!({"id": "doc-running", "name": "b.pdf", "run": "RUNNING", "progress": 0.4, "chunk_count": 0}),
        json!({"id": "doc-failed", "name": "c.pdf", "run": "FAIL", "progress": -1.0, "chunk_count": 0, "progress_msg": "OCR error"}),
    ];
    match q.get("id") {
        Some(id) => match docs.iter().find(|d| d["id"] == id.as_str()) {
            Some(doc) => Json(json!({"code": 0, "data": {"docs": [doc], "total": 1}})),
            None => Json(json!({"code": 102, "message": format!("You don't own the document {id}.")})),
        },
        None => Json(json!({"code": 0, "data": {"docs": docs, "total": 3}})),
    }
}

async fn spawn_server() -> (String, Recorded) {
    let rec = Recorded::default();
    let app = Router::new()
        .route("/api/v1/datasets", get(datasets).post(create_dataset))
        .route("/api/v1/datasets/{id}/documents", post(upload).get(documents))
        .route("/api/v1/datasets/{id}/chunks", post(parse))
        .with_state(rec.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/"), rec)
}

fn dataset() -> Dataset {
    Dataset {
        id: "ds-1".to_string(),
        name: "theses".to_string(),
    }
}

#[tokio::test]
async fn dataset_lookup_list_and_create() {
    let (url, rec) = spawn_server().await;
    let client = RagflowClient::new(&url, API_KEY).unwrap();

    assert_eq!(client.list_datasets().await.unwrap().len(), 2);
    assert_eq!(client.get_dataset_by_id("ds-2").await.unwrap().unwrap().name, "articles");
    assert!(client.get_dataset_by_id("missing").await.unwrap().is_none());
    assert_eq!(client.get_dataset_by_name("theses").await.unwrap().unwrap().id, "ds-1");

    let created = client
        .create_dataset(&DatasetSettings {
            name: "new".to_string(),
            embedding_model: "mxbai-embed-large:latest".to_string(),
            chunk_method: "naive".to_string(),
            parser_config: None,
        })
        .await
        .unwrap();
    assert_eq!(created.id, "ds-new");
    let body = rec.created.lock().unwrap()[0].clone();
    assert_eq!(body["chunk_method"], "naive");
    assert!(body.get("parser_config").is_none());
}

#[tokio::test]
async fn wrong_api_key_is_auth_error() {
    let (url, _) = spawn_server().await;
    let client = RagflowClient::new(&url, "nope").unwrap();
    assert!(matches!(client.list_datasets().await, Err(IngestError::Auth(_))));
}

#[tokio::test]
async fn upload_returns_document_id_and_surfaces_quota_errors() {
    let (url, _) = spawn_server().await;
    let client = RagflowClient::new(&url, API_KEY).unwrap();

    let id = client
        .upload_document(&dataset(), "thesis.pdf", b"%PDF-1.7 body".to_vec())
        .await
        .unwrap();
    assert_eq!(id, DocumentId::from("doc-in-ds-1"));

    let err = client
        .upload_document(&dataset(), "quota.pdf", b"%PDF-1.7".to_vec())
        .await
        .unwrap_err();
    match err {
        IngestError::Remote(msg) => assert!(msg.contains("maximum file number")),
        other => panic!("expected remote error, got {other:?}"),
    }
}

#[tokio::test]
async fn trigger_parse_sends_document_ids() {
    let (url, rec) = spawn_server().await;
    let client = RagflowClient::new(&url, API_KEY).unwrap();
    client
        .trigger_parse(&dataset(), &[DocumentId::from("d1"), DocumentId::from("d2")])
        .await
        .unwrap();
    let sent = rec.parsed.lock().unwrap()[0].clone();
    assert_eq!(sent, json!({"document_ids": ["d1", "d2"]}));
}

#[tokio::test]
async fn query_status_maps_states_and_missing_documents() {
    let (url, _) = spawn_server().await;
    let client = RagflowClient::new(&url, API_KEY).unwrap();

    let done = client.query_status(&dataset(), &DocumentId::from("doc-done")).await.unwrap().unwrap();
    assert_eq!(done.state, ProcessingState::Succeeded);
    assert_eq!(done.chunk_count, 42);

    let running = client.query_status(&dataset(), &DocumentId::from("doc-running")).await.unwrap().unwrap();
    assert_eq!(running.state, ProcessingState::Running);

    let failed = client.query_status(&dataset(), &DocumentId::from("doc-failed")).await.unwrap().unwrap();
    assert_eq!(failed.state, ProcessingState::Failed);
    assert_eq!(failed.progress, 0.0);
    assert_eq!(failed.message.as_deref(), Some("OCR error"));

    assert!(client.query_status(&dataset(), &DocumentId::from("doc-gone")).await.unwrap().is_none());
    assert_eq!(client.list_documents(&dataset()).await.unwrap().len(), 3);
}

#[tokio::test]
async fn resolve_dataset_by_flag_and_interactively() {
    use ingest_ragflow::cli::DatasetArgs;
    use ingest_ragflow::commands::resolve_dataset;
    use ingest_ragflow::load_config::DatasetSection;
    use std::io::Cursor;

    let (url, rec) = spawn_server().await;
    let client = RagflowClient::new(&url, API_KEY).unwrap();
    let defaults = DatasetSection::default();
    let mut out = Vec::new();

    let by_name = DatasetArgs {
        dataset_id: None,
        dataset_name: Some("theses".to_string()),
    };
    let found = resolve_dataset(&client, &by_name, &defaults, &mut Cursor::new(""), &mut out)
        .await
        .unwrap();
    assert_eq!(found.id, "ds-1");
    assert!(rec.created.lock().unwrap().is_empty());

    let missing_name = DatasetArgs {
        dataset_id: None,
        dataset_name: Some("fresh".to_string()),
    };
    let created = resolve_dataset(&client, &missing_name, &defaults, &mut Cursor::new(""), &mut out)
        .await
        .unwrap();
    assert_eq!(created.id, "ds-new");
    assert_eq!(rec.created.lock().unwrap()[0]["name"], "fresh");

    let missing_id = DatasetArgs {
        dataset_id: Some("nope".to_string()),
        dataset_name: None,
    };
    let err = resolve_dataset(&client, &missing_id, &defaults, &mut Cursor::new(""), &mut out)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("dataset nope not found"));

    let mut out = Vec::new();
    let picked = resolve_dataset(
        &client,
        &DatasetArgs::default(),
        &defaults,
        &mut Cursor::new("n\n7\n1\n"),
        &mut out,
    )
    .await
    .unwrap();
    assert_eq!(picked.name, "articles");
    let shown = String::from_utf8(out).unwrap();
    assert!(shown.contains("Create new dataset?"));
    assert!(shown.contains("0: theses"));
    assert!(shown.contains("1: articles"));
}

fn config_for(url: &str) -> ingest_ragflow::load_config::CliConfig {
    let mut config = ingest_ragflow::load_config::CliConfig::default();
    config.ragflow.base_url = url.to_string();
    config.ragflow.api_key = Some(API_KEY.to_string());
    config
}

#[tokio::test]
async fn upload_command_runs_the_folder_pipeline() {
    use ingest_ragflow::cli::{DatasetArgs, RunArgs};

    let (url, rec) = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("thesis.pdf"), b"%PDF-1.7 body").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"skip me").unwrap();

    let dataset = DatasetArgs {
        dataset_id: Some("ds-1".to_string()),
        dataset_name: None,
    };
    ingest_ragflow::commands::upload(&config_for(&url), dir.path(), &dataset, &RunArgs::default())
        .await
        .unwrap();

    let parsed = rec.parsed.lock().unwrap().clone();
    assert_eq!(parsed, vec![json!({"document_ids": ["doc-in-ds-1"]})]);
}

#[tokio::test]
async fn documents_command_needs_an_existing_dataset() {
    use ingest_ragflow::cli::DatasetArgs;

    let (url, rec) = spawn_server().await;
    let config = config_for(&url);

    let existing = DatasetArgs {
        dataset_id: None,
        dataset_name: Some("theses".to_string()),
    };
    ingest_ragflow::commands::documents(&config, &existing).await.unwrap();

    let missing = DatasetArgs {
        dataset_id: None,
        dataset_name: Some("fresh".to_string()),
    };
    let err = ingest_ragflow::commands::documents(&config, &missing).await.unwrap_err();
    assert!(err.to_string().contains("dataset named fresh not found"));
    assert!(rec.created.lock().unwrap().is_empty());
}
