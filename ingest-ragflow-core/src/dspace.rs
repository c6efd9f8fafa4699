//! DSpace 6 REST client.
//!
//! Every call takes the [`Session`] returned by `authenticate` and forwards its
//! cookie. Listings are fetched page by page (`limit`/`offset`) and
//! deduplicated by uuid, since DSpace can repeat items across page boundaries.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use crate::contract::{Collection, Credentials, Item, Repository, Session};
use crate::error::IngestError;

pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const SESSION_COOKIE: &str = "JSESSIONID";

#[derive(Debug, Clone)]
pub struct DSpaceClient {
    client: Client,
    rest_url: String,
    page_size: usize,
}

impl DSpaceClient {
    /// `rest_url` is the REST root, e.g. `https://repo.example.org/rest`.
    pub fn new(rest_url: impl Into<String>) -> Result<Self, IngestError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| IngestError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            rest_url: rest_url.into().trim_end_matches('/').to_string(),
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn rest_url(&self) -> &str {
        &self.rest_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.rest_url, path.trim_start_matches('/'))
    }

    fn get(&self, path: &str, session: &Session) -> RequestBuilder {
        let request = self
            .client
            .get(self.url(path))
            .header(reqwest::header::ACCEPT, "application/json");
        match session.cookie() {
            Some(cookie) => request.header(COOKIE, cookie),
            None => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        session: &Session,
    ) -> Result<T, IngestError> {
        let response = self.get(path, session).query(query).send().await?;
        let response = check_status(response, path).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| IngestError::Remote(format!("unexpected response from {path}: {e}")))
    }

    /// Fetch `path` page by page until a short or empty page, keeping the first copy of each uuid.
    /// Stops early once `max` entries are collected.
    async fn get_paginated<T, F>(
        &self,
        path: &str,
        extra: &[(&str, String)],
        session: &Session,
        max: Option<usize>,
        uuid_of: F,
    ) -> Result<Vec<T>, IngestError>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> String,
    {
        let mut seen = HashSet::new();
        let mut all = Vec::new();
        let mut offset = 0usize;

        loop {
            let requested = match max {
                Some(max) if all.len() >= max => break,
                Some(max) => self.page_size.min(max - all.len()),
                None => self.page_size,
            };
            let mut query = extra.to_vec();
            query.push(("limit", requested.to_string()));
            query.push(("offset", offset.to_string()));

            let page: Vec<T> = self.get_json(path, &query, session).await?;
            let fetched = page.len();
            let mut added = 0usize;
            for entry in page {
                if max.is_some_and(|max| all.len() >= max) {
                    break;
                }
                if seen.insert(uuid_of(&entry)) {
                    all.push(entry);
                    added += 1;
                }
            }
            debug!(path, offset, fetched, added, "[DSPACE] Page retrieved");

            if fetched == 0 || added == 0 || fetched < requested {
                break;
            }
            offset += fetched;
        }
        Ok(all)
    }
}

async fn check_status(response: Response, what: &str) -> Result<Response, IngestError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    error!(%status, what, "[DSPACE][ERROR] Request failed");
    Err(match status {
        StatusCode::NOT_FOUND => IngestError::NotFound(format!("{what} (HTTP {status})")),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            IngestError::Auth(format!("{what} rejected (HTTP {status})"))
        }
        _ => IngestError::Remote(format!("{what} failed (HTTP {status}): {body}")),
    })
}

/// Pick the session cookie out of the login response, preferring `JSESSIONID`.
fn session_cookie(response: &Response) -> Option<String> {
    let pairs: Vec<String> = response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .map(|pair| pair.trim().to_string())
        .filter(|pair| pair.contains('='))
        .collect();
    pairs
        .iter()
        .find(|pair| pair.starts_with(&format!("{SESSION_COOKIE}=")))
        .or_else(|| pairs.first())
        .cloned()
}

#[async_trait]
impl Repository for DSpaceClient {
    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, IngestError> {
        info!(email = %credentials.email, url = %self.rest_url, "[DSPACE] Authenticating");
        let response = self
            .client
            .post(self.url("login"))
            .form(&[
                ("email", credentials.email.as_str()),
                ("password", credentials.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| IngestError::Auth(format!("could not reach repository: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            error!(%status, "[DSPACE][ERROR] Login rejected");
            return Err(IngestError::Auth(format!("login rejected (HTTP {status})")));
        }

        match session_cookie(&response) {
            Some(cookie) => {
                info!("[DSPACE] Successful authentication");
                Ok(Session::from_cookie(cookie))
            }
            None => Err(IngestError::Auth(
                "login succeeded but no session cookie was returned".to_string(),
            )),
        }
    }

    async fn list_collections(&self, session: &Session) -> Result<Vec<Collection>, IngestError> {
        let collections = self
            .get_paginated("collections", &[], session, None, |c: &Collection| c.id.clone())
            .await?;
        info!(count = collections.len(), "[DSPACE] Collections retrieved");
        Ok(collections)
    }

    async fn list_items(
        &self,
        collection_id: &str,
        session: &Session,
    ) -> Result<Vec<Item>, IngestError> {
        let path = format!("collections/{collection_id}/items");
        let items = self
            .get_paginated(
                &path,
                &[("expand", "bitstreams".to_string())],
                session,
                None,
                |i: &Item| i.id.clone(),
            )
            .await?;
        info!(collection_id, count = items.len(), "[DSPACE] Items retrieved");
        Ok(items)
    }

    async fn list_repository_items(
        &self,
        session: &Session,
        limit: Option<usize>,
    ) -> Result<Vec<Item>, IngestError> {
        let items = self
            .get_paginated("items", &[], session, limit, |i: &Item| i.id.clone())
            .await?;
        info!(count = items.len(), ?limit, "[DSPACE] Repository items retrieved");
        Ok(items)
    }

    async fn get_item(&self, item_id: &str, session: &Session) -> Result<Item, IngestError> {
        self.get_json(
            &format!("items/{item_id}"),
            &[("expand", "bitstreams".to_string())],
            session,
        )
        .await
    }

    async fn download_bitstream(
        &self,
        bitstream_id: &str,
        session: &Session,
    ) -> Result<Vec<u8>, IngestError> {
        let path = format!("bitstreams/{bitstream_id}/retrieve");
        let response = self.get(&path, session).send().await?;
        let response = check_status(response, &path).await?;
        let bytes = response.bytes().await?;
        debug!(bitstream_id, size = bytes.len(), "[DSPACE] Bitstream retrieved");
        Ok(bytes.to_vec())
    }
}
