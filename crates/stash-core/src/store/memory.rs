//! In-memory [`RecordStore`] implementation for tests and offline use.
//!
//! Uses a `Vec` behind `std::sync::RwLock` for thread safety. Substring
//! search is a linear scan over all records.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{derive_domain, note_title, BookmarkDraft, BookmarkRecord};

use super::{matches_substring, RecordStore, StoreError, StoreResult, TitleResolver, UrlAsTitle};

struct Inner {
    records: Vec<BookmarkRecord>,
    next_id: i64,
}

/// In-memory bookmark store.
pub struct InMemoryStore {
    inner: RwLock<Inner>,
    titles: Box<dyn TitleResolver>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_title_resolver(Box::new(UrlAsTitle))
    }

    pub fn with_title_resolver(titles: Box<dyn TitleResolver>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                records: Vec::new(),
                next_id: 1,
            }),
            titles,
        }
    }

    /// Seeds the store with existing records; ids continue after the
    /// largest seeded id.
    pub fn with_records(records: Vec<BookmarkRecord>) -> Self {
        let next_id = records.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        let store = Self::new();
        if let Ok(mut inner) = store.inner.write() {
            inner.records = records;
            inner.next_id = next_id;
        }
        store
    }

    pub fn len(&self) -> usize {
        self.read().map(|i| i.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| StoreError::Transient("in-memory store lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| StoreError::Transient("in-memory store lock poisoned".to_string()))
    }

    async fn derive_title(&self, draft: &BookmarkDraft, now: DateTime<Utc>) -> String {
        match draft.url.as_deref() {
            Some(url) => self.titles.resolve(url).await,
            None => note_title(now),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn newest_first(records: &mut [BookmarkRecord]) {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn insert(&self, draft: &BookmarkDraft) -> StoreResult<BookmarkRecord> {
        let draft = draft.normalized();
        draft.validate()?;

        let now = Utc::now();
        // Resolve before taking the lock; resolvers may do I/O.
        let title = self.derive_title(&draft, now).await;

        let mut inner = self.write()?;
        let record = BookmarkRecord {
            id: inner.next_id,
            domain: derive_domain(draft.url.as_deref()),
            url: draft.url,
            title,
            notes: draft.notes,
            tags: draft.tags,
            created_at: now,
        };
        inner.next_id += 1;
        inner.records.push(record.clone());
        Ok(record)
    }

    async fn update(&self, id: i64, draft: &BookmarkDraft) -> StoreResult<BookmarkRecord> {
        let draft = draft.normalized();
        draft.validate()?;

        if !self.read()?.records.iter().any(|r| r.id == id) {
            return Err(StoreError::NotFound(id));
        }
        let title = self.derive_title(&draft, Utc::now()).await;

        let mut inner = self.write()?;
        let record = inner
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::NotFound(id))?;
        record.domain = derive_domain(draft.url.as_deref());
        record.url = draft.url;
        record.title = title;
        record.notes = draft.notes;
        record.tags = draft.tags;
        Ok(record.clone())
    }

    async fn delete(&self, id: i64) -> StoreResult<bool> {
        let mut inner = self.write()?;
        let before = inner.records.len();
        inner.records.retain(|r| r.id != id);
        Ok(inner.records.len() < before)
    }

    async fn list_newest_first(&self, limit: Option<usize>) -> StoreResult<Vec<BookmarkRecord>> {
        let mut records = self.read()?.records.clone();
        newest_first(&mut records);
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    async fn search_substring(&self, term: &str) -> StoreResult<Vec<BookmarkRecord>> {
        let mut records: Vec<BookmarkRecord> = self
            .read()?
            .records
            .iter()
            .filter(|r| matches_substring(r, term))
            .cloned()
            .collect();
        newest_first(&mut records);
        Ok(records)
    }
}
