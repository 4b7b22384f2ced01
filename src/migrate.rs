//! Idempotent schema setup. Every statement is `IF NOT EXISTS`, so running
//! `docqa init` repeatedly (or on every `serve`) is harmless.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables and indexes on an open pool.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sources (
            id TEXT PRIMARY KEY,
            filename TEXT NOT NULL,
            content_type TEXT NOT NULL,
            stored_path TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // source_ids is the comma-joined, ordered list of source ids.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS summaries (
            id TEXT PRIMARY KEY,
            name TEXT,
            source_ids TEXT NOT NULL,
            markdown TEXT NOT NULL,
            vector_index_path TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notes (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            content TEXT NOT NULL,
            content_type TEXT NOT NULL DEFAULT 'text/markdown',
            source_summary_id TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS histories (
            id TEXT PRIMARY KEY,
            conversation TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_notes_summary ON notes(source_summary_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_summaries_created_at ON summaries(created_at DESC)")
        .execute(pool)
        .await?;

    Ok(())
}
