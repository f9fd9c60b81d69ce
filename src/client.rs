//! HTTP client for the Stash REST API.
//!
//! [`HttpRecordStore`] implements [`RecordStore`] over `reqwest`, sending
//! the session's bearer token on every call and mapping response statuses
//! onto [`StoreError`]: 401 → `Unauthorized`, 404 → `NotFound`,
//! 400 → `Validation`, anything else (including network errors) →
//! `Transient`.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

use stash_core::models::{BookmarkDraft, BookmarkRecord};
use stash_core::store::{RecordStore, StoreError, StoreResult};

use crate::auth::User;
use crate::session::Session;

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[allow(dead_code)]
    code: String,
    message: String,
}

#[derive(Deserialize)]
struct ListResponse {
    bookmarks: Vec<BookmarkRecord>,
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

#[derive(Deserialize)]
struct RegisterResponse {
    user: User,
}

fn api_url(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

/// Reads the `{error:{message}}` body, falling back to the status text.
async fn error_message(resp: Response) -> String {
    let status = resp.status();
    match resp.json::<ErrorBody>().await {
        Ok(body) => body.error.message,
        Err(_) => status.to_string(),
    }
}

/// Exchanges credentials for a token.
pub async fn login(base_url: &str, email: &str, password: &str) -> anyhow::Result<LoginResponse> {
    let resp = reqwest::Client::new()
        .post(api_url(base_url, "/api/auth/login"))
        .json(&Credentials { email, password })
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", base_url))?;
    if !resp.status().is_success() {
        anyhow::bail!("login failed: {}", error_message(resp).await);
    }
    Ok(resp.json().await?)
}

/// Creates an account on the server.
pub async fn register(base_url: &str, email: &str, password: &str) -> anyhow::Result<User> {
    let resp = reqwest::Client::new()
        .post(api_url(base_url, "/api/auth/register"))
        .json(&Credentials { email, password })
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", base_url))?;
    if !resp.status().is_success() {
        anyhow::bail!("registration failed: {}", error_message(resp).await);
    }
    let body: RegisterResponse = resp.json().await?;
    Ok(body.user)
}

/// [`RecordStore`] backed by a remote Stash server.
pub struct HttpRecordStore {
    client: reqwest::Client,
    base_url: String,
    session: Arc<dyn Session>,
}

impl HttpRecordStore {
    pub fn new(base_url: impl Into<String>, session: Arc<dyn Session>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            session,
        }
    }

    fn url(&self, path: &str) -> String {
        api_url(&self.base_url, path)
    }

    /// Sends `req` with the bearer token and maps failure statuses.
    async fn send(&self, req: RequestBuilder, id: Option<i64>) -> StoreResult<Response> {
        let token = self
            .session
            .token()
            .ok_or_else(|| StoreError::Unauthorized("not logged in".to_string()))?;

        let resp = req
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| StoreError::Transient(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = error_message(resp).await;
        tracing::debug!(%status, %message, "request failed");
        Err(match status {
            StatusCode::UNAUTHORIZED => StoreError::Unauthorized(message),
            StatusCode::NOT_FOUND => match id {
                Some(id) => StoreError::NotFound(id),
                None => StoreError::Transient(message),
            },
            StatusCode::BAD_REQUEST => StoreError::Validation(message),
            _ => StoreError::Transient(format!("{}: {}", status, message)),
        })
    }

    async fn list(&self, query: &[(&str, String)]) -> StoreResult<Vec<BookmarkRecord>> {
        let req = self.client.get(self.url("/api/bookmarks")).query(query);
        let resp = self.send(req, None).await?;
        let body: ListResponse = resp
            .json()
            .await
            .map_err(|e| StoreError::Transient(e.to_string()))?;
        Ok(body.bookmarks)
    }
}

#[async_trait]
impl RecordStore for HttpRecordStore {
    async fn insert(&self, draft: &BookmarkDraft) -> StoreResult<BookmarkRecord> {
        let req = self.client.post(self.url("/api/bookmarks")).json(draft);
        let resp = self.send(req, None).await?;
        resp.json()
            .await
            .map_err(|e| StoreError::Transient(e.to_string()))
    }

    async fn update(&self, id: i64, draft: &BookmarkDraft) -> StoreResult<BookmarkRecord> {
        let req = self
            .client
            .put(self.url(&format!("/api/bookmarks/{}", id)))
            .json(draft);
        let resp = self.send(req, Some(id)).await?;
        resp.json()
            .await
            .map_err(|e| StoreError::Transient(e.to_string()))
    }

    async fn delete(&self, id: i64) -> StoreResult<bool> {
        let req = self
            .client
            .delete(self.url(&format!("/api/bookmarks/{}", id)));
        match self.send(req, Some(id)).await {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list_newest_first(&self, limit: Option<usize>) -> StoreResult<Vec<BookmarkRecord>> {
        match limit {
            Some(limit) => self.list(&[("limit", limit.to_string())]).await,
            None => self.list(&[("all", "true".to_string())]).await,
        }
    }

    async fn search_substring(&self, term: &str) -> StoreResult<Vec<BookmarkRecord>> {
        self.list(&[("search", term.to_string())]).await
    }
}
