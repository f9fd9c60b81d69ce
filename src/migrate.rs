//! Idempotent schema setup for the server database.

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Applies the schema to an open pool. Safe to run on every start.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    // Create users table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create users table")?;

    // Create bookmarks table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bookmarks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER REFERENCES users(id),
            url TEXT,
            title TEXT NOT NULL,
            notes TEXT NOT NULL DEFAULT '',
            tags TEXT NOT NULL DEFAULT '',
            domain TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create bookmarks table")?;

    // Single-user databases predate accounts; ADD COLUMN is not idempotent,
    // so check first.
    let has_user_id: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM pragma_table_info('bookmarks') WHERE name = 'user_id'",
    )
    .fetch_one(pool)
    .await?;

    if !has_user_id {
        tracing::info!("adding user_id column to legacy bookmarks table");
        sqlx::query("ALTER TABLE bookmarks ADD COLUMN user_id INTEGER REFERENCES users(id)")
            .execute(pool)
            .await
            .context("Failed to add bookmarks.user_id")?;
    }

    // Create indexes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_bookmarks_user_created ON bookmarks(user_id, created_at DESC, id DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
