//! SQLite-backed [`RecordStore`] implementation.
//!
//! Each `SqliteStore` is scoped to one user; every statement filters on
//! `user_id`. Timestamps are stored as Unix milliseconds.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use stash_core::models::{derive_domain, note_title, BookmarkDraft, BookmarkRecord};
use stash_core::store::{RecordStore, StoreError, StoreResult, TitleResolver};

const COLUMNS: &str = "id, url, title, notes, tags, domain, created_at";

/// SQLite implementation of the [`RecordStore`] trait for a single user.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    titles: Arc<dyn TitleResolver>,
    user_id: i64,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, titles: Arc<dyn TitleResolver>, user_id: i64) -> Self {
        Self {
            pool,
            titles,
            user_id,
        }
    }

    async fn derive_title(&self, draft: &BookmarkDraft, now: DateTime<Utc>) -> String {
        match draft.url.as_deref() {
            Some(url) => self.titles.resolve(url).await,
            None => note_title(now),
        }
    }
}

fn transient(err: sqlx::Error) -> StoreError {
    tracing::warn!(error = %err, "sqlite store error");
    StoreError::Transient(err.to_string())
}

fn row_to_record(row: &SqliteRow) -> StoreResult<BookmarkRecord> {
    let created_ms: i64 = row.try_get("created_at").map_err(transient)?;
    let created_at = DateTime::from_timestamp_millis(created_ms).unwrap_or_default();
    let url: Option<String> = row.try_get("url").map_err(transient)?;
    // Rows written before the NOT NULL constraints may carry NULLs.
    let text = |column: &str| -> StoreResult<String> {
        let value: Option<String> = row.try_get(column).map_err(transient)?;
        Ok(value.unwrap_or_default())
    };
    let domain = Some(text("domain")?)
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| derive_domain(url.as_deref()));
    Ok(BookmarkRecord {
        id: row.try_get("id").map_err(transient)?,
        title: Some(text("title")?)
            .filter(|t| !t.is_empty())
            .or_else(|| url.clone())
            .unwrap_or_else(|| note_title(created_at)),
        notes: text("notes")?,
        tags: text("tags")?,
        domain,
        url,
        created_at,
    })
}

/// Escapes `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn insert(&self, draft: &BookmarkDraft) -> StoreResult<BookmarkRecord> {
        let draft = draft.normalized();
        draft.validate()?;

        let now = Utc::now();
        let title = self.derive_title(&draft, now).await;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO bookmarks (user_id, url, title, notes, tags, domain, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(self.user_id)
        .bind(&draft.url)
        .bind(&title)
        .bind(&draft.notes)
        .bind(&draft.tags)
        .bind(draft.domain())
        .bind(now.timestamp_millis())
        .fetch_one(&self.pool)
        .await
        .map_err(transient)?;

        let record = row_to_record(&row)?;
        tracing::debug!(id = record.id, domain = %record.domain, "bookmark inserted");
        Ok(record)
    }

    async fn update(&self, id: i64, draft: &BookmarkDraft) -> StoreResult<BookmarkRecord> {
        let draft = draft.normalized();
        draft.validate()?;

        let exists: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM bookmarks WHERE id = ? AND user_id = ?",
        )
        .bind(id)
        .bind(self.user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(transient)?;
        if !exists {
            return Err(StoreError::NotFound(id));
        }

        let title = self.derive_title(&draft, Utc::now()).await;

        let row = sqlx::query(&format!(
            r#"
            UPDATE bookmarks
            SET url = ?, title = ?, notes = ?, tags = ?, domain = ?
            WHERE id = ? AND user_id = ?
            RETURNING {COLUMNS}
            "#
        ))
        .bind(&draft.url)
        .bind(&title)
        .bind(&draft.notes)
        .bind(&draft.tags)
        .bind(draft.domain())
        .bind(id)
        .bind(self.user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(transient)?;

        match row {
            Some(row) => row_to_record(&row),
            // Deleted between the existence check and the update.
            None => Err(StoreError::NotFound(id)),
        }
    }

    async fn delete(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM bookmarks WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(self.user_id)
            .execute(&self.pool)
            .await
            .map_err(transient)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_newest_first(&self, limit: Option<usize>) -> StoreResult<Vec<BookmarkRecord>> {
        // LIMIT -1 is SQLite for "no limit".
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let rows = sqlx::query(&format!(
            r#"
            SELECT {COLUMNS} FROM bookmarks
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#
        ))
        .bind(self.user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(transient)?;

        rows.iter().map(row_to_record).collect()
    }

    async fn search_substring(&self, term: &str) -> StoreResult<Vec<BookmarkRecord>> {
        let pattern = like_pattern(term);
        let rows = sqlx::query(&format!(
            r#"
            SELECT {COLUMNS} FROM bookmarks
            WHERE user_id = ?1
              AND (title LIKE ?2 ESCAPE '\' OR url LIKE ?2 ESCAPE '\'
                   OR notes LIKE ?2 ESCAPE '\' OR tags LIKE ?2 ESCAPE '\')
            ORDER BY created_at DESC, id DESC
            "#
        ))
        .bind(self.user_id)
        .bind(&pattern)
        .fetch_all(&self.pool)
        .await
        .map_err(transient)?;

        rows.iter().map(row_to_record).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use stash_core::store::UrlAsTitle;

    async fn store_for(user_id: i64) -> (SqlitePool, SqliteStore) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::migrate::migrate_pool(&pool).await.unwrap();
        let store = SqliteStore::new(pool.clone(), Arc::new(UrlAsTitle), user_id);
        (pool, store)
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[tokio::test]
    async fn crud_round_trip() {
        let (_pool, store) = store_for(1).await;

        let rec = store
            .insert(&BookmarkDraft::new(Some("https://docs.rs/sqlx"), "", "rust,db"))
            .await
            .unwrap();
        assert_eq!(rec.domain, "docs.rs");
        assert_eq!(rec.title, "https://docs.rs/sqlx");

        let updated = store
            .update(rec.id, &BookmarkDraft::new(None, "just a note", ""))
            .await
            .unwrap();
        assert_eq!(updated.domain, "Notes");
        assert_eq!(updated.url, None);
        assert_eq!(updated.created_at, rec.created_at);

        assert!(store.delete(rec.id).await.unwrap());
        assert!(!store.delete(rec.id).await.unwrap());
        assert_eq!(
            store
                .update(rec.id, &BookmarkDraft::new(None, "x", ""))
                .await
                .unwrap_err(),
            StoreError::NotFound(rec.id)
        );
    }

    #[tokio::test]
    async fn rejects_empty_drafts() {
        let (_pool, store) = store_for(1).await;
        let err = store
            .insert(&BookmarkDraft::new(Some(" "), "  ", "t"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn listing_newest_first_with_limit() {
        let (_pool, store) = store_for(1).await;
        for i in 0..4 {
            store
                .insert(&BookmarkDraft::new(None, &format!("note {}", i), ""))
                .await
                .unwrap();
        }
        let all = store.list_all().await.unwrap();
        let ids: Vec<i64> = all.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![4, 3, 2, 1]);

        let bounded = store.list_newest_first(Some(2)).await.unwrap();
        assert_eq!(bounded.len(), 2);
        assert_eq!(bounded[0].id, 4);
    }

    #[tokio::test]
    async fn records_are_scoped_per_user() {
        let (pool, alice) = store_for(1).await;
        let bob = SqliteStore::new(pool, Arc::new(UrlAsTitle), 2);

        let rec = alice
            .insert(&BookmarkDraft::new(None, "alice's note", ""))
            .await
            .unwrap();
        assert!(bob.list_all().await.unwrap().is_empty());
        assert!(!bob.delete(rec.id).await.unwrap());
        assert_eq!(alice.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn substring_search_is_case_insensitive() {
        let (_pool, store) = store_for(1).await;
        store
            .insert(&BookmarkDraft::new(Some("https://tokio.rs"), "Async runtime", ""))
            .await
            .unwrap();
        store
            .insert(&BookmarkDraft::new(None, "100% coverage", ""))
            .await
            .unwrap();

        assert_eq!(store.search_substring("ASYNC").await.unwrap().len(), 1);
        assert_eq!(store.search_substring("tokio").await.unwrap().len(), 1);
        assert_eq!(store.search_substring("0%").await.unwrap().len(), 1);
        assert!(store.search_substring("%x").await.unwrap().is_empty());
    }
}
