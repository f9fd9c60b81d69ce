//! Record store abstraction for Stash.
//!
//! The [`RecordStore`] trait is the only way the sync and search core
//! touches persisted bookmarks, enabling pluggable backends (SQLite on the
//! server, HTTP on the client, in-memory for tests).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{BookmarkDraft, BookmarkRecord};

/// Failure taxonomy shared by every store implementation.
///
/// Callers branch on the variant: `Unauthorized` invalidates the session,
/// `NotFound` and `Validation` are shown to the user, and `Transient`
/// leaves whatever data is already on screen in place.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("bookmark not found: {0}")]
    NotFound(i64),
    #[error("invalid bookmark: {0}")]
    Validation(String),
    #[error("store unavailable: {0}")]
    Transient(String),
}

impl StoreError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, StoreError::Unauthorized(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Abstract bookmark storage.
///
/// All listing operations return records newest first (`created_at`
/// descending, ties broken by descending id) with `domain` already
/// populated.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert`](RecordStore::insert) | Create a record; store assigns id, created_at, title, domain |
/// | [`update`](RecordStore::update) | Replace url/notes/tags; title and domain are recomputed |
/// | [`delete`](RecordStore::delete) | Hard delete; `false` when the id was unknown |
/// | [`list_newest_first`](RecordStore::list_newest_first) | Bounded or unbounded newest-first listing |
/// | [`list_all`](RecordStore::list_all) | The complete record set |
/// | [`search_substring`](RecordStore::search_substring) | Case-insensitive substring match over all text fields |
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert(&self, draft: &BookmarkDraft) -> StoreResult<BookmarkRecord>;

    /// Returns [`StoreError::NotFound`] when `id` does not exist.
    async fn update(&self, id: i64, draft: &BookmarkDraft) -> StoreResult<BookmarkRecord>;

    async fn delete(&self, id: i64) -> StoreResult<bool>;

    async fn list_newest_first(&self, limit: Option<usize>) -> StoreResult<Vec<BookmarkRecord>>;

    async fn list_all(&self) -> StoreResult<Vec<BookmarkRecord>> {
        self.list_newest_first(None).await
    }

    async fn search_substring(&self, term: &str) -> StoreResult<Vec<BookmarkRecord>>;
}

#[async_trait]
impl<T: RecordStore + ?Sized> RecordStore for std::sync::Arc<T> {
    async fn insert(&self, draft: &BookmarkDraft) -> StoreResult<BookmarkRecord> {
        (**self).insert(draft).await
    }

    async fn update(&self, id: i64, draft: &BookmarkDraft) -> StoreResult<BookmarkRecord> {
        (**self).update(id, draft).await
    }

    async fn delete(&self, id: i64) -> StoreResult<bool> {
        (**self).delete(id).await
    }

    async fn list_newest_first(&self, limit: Option<usize>) -> StoreResult<Vec<BookmarkRecord>> {
        (**self).list_newest_first(limit).await
    }

    async fn list_all(&self) -> StoreResult<Vec<BookmarkRecord>> {
        (**self).list_all().await
    }

    async fn search_substring(&self, term: &str) -> StoreResult<Vec<BookmarkRecord>> {
        (**self).search_substring(term).await
    }
}

/// Derives a record title on insert and update.
///
/// Called only for drafts that carry a URL; notes get a timestamp title
/// from [`note_title`](crate::models::note_title).
#[async_trait]
pub trait TitleResolver: Send + Sync {
    async fn resolve(&self, url: &str) -> String;
}

/// Uses the URL itself as the title. The fallback when page titles are
/// not fetched.
pub struct UrlAsTitle;

#[async_trait]
impl TitleResolver for UrlAsTitle {
    async fn resolve(&self, url: &str) -> String {
        url.to_string()
    }
}

/// Case-insensitive substring match used by `search_substring`
/// implementations that filter in Rust rather than in SQL.
pub fn matches_substring(record: &BookmarkRecord, term: &str) -> bool {
    let needle = term.to_lowercase();
    if needle.is_empty() {
        return true;
    }
    [
        Some(record.title.as_str()),
        record.url.as_deref(),
        Some(record.notes.as_str()),
        Some(record.tags.as_str()),
    ]
    .into_iter()
    .flatten()
    .any(|field| field.to_lowercase().contains(&needle))
}
