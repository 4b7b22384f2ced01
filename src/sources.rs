//! `sources` table: one row per uploaded file.

use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::db::{format_ts_iso, now_ts};
use crate::error::Result;

#[derive(Debug, Clone, Serialize)]
pub struct SourceRecord {
    pub id: String,
    /// Display name; renaming changes this, not the stored file.
    pub filename: String,
    pub content_type: String,
    #[serde(skip_serializing)]
    pub stored_path: String,
    pub created_at: String,
}

fn from_row(row: &SqliteRow) -> SourceRecord {
    SourceRecord {
        id: row.get("id"),
        filename: row.get("filename"),
        content_type: row.get("content_type"),
        stored_path: row.get("stored_path"),
        created_at: format_ts_iso(row.get("created_at")),
    }
}

const COLUMNS: &str = "id, filename, content_type, stored_path, created_at";

pub async fn insert_source(
    pool: &SqlitePool,
    filename: &str,
    content_type: &str,
    stored_path: &str,
) -> Result<SourceRecord> {
    let id = Uuid::new_v4().to_string();
    let created_at = now_ts();

    sqlx::query(
        "INSERT INTO sources (id, filename, content_type, stored_path, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(filename)
    .bind(content_type)
    .bind(stored_path)
    .bind(created_at)
    .execute(pool)
    .await?;

    Ok(SourceRecord {
        id,
        filename: filename.to_string(),
        content_type: content_type.to_string(),
        stored_path: stored_path.to_string(),
        created_at: format_ts_iso(created_at),
    })
}

pub async fn get_source(pool: &SqlitePool, id: &str) -> Result<Option<SourceRecord>> {
    let row = sqlx::query(&format!("SELECT {} FROM sources WHERE id = ?", COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(from_row))
}

pub async fn list_sources(pool: &SqlitePool) -> Result<Vec<SourceRecord>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM sources ORDER BY created_at DESC, rowid DESC",
        COLUMNS
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(from_row).collect())
}

pub async fn rename_source(
    pool: &SqlitePool,
    id: &str,
    filename: &str,
) -> Result<Option<SourceRecord>> {
    let result = sqlx::query("UPDATE sources SET filename = ? WHERE id = ?")
        .bind(filename)
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Ok(None);
    }
    get_source(pool, id).await
}

/// Delete the row and return it, so the caller can remove the stored file.
pub async fn delete_source(pool: &SqlitePool, id: &str) -> Result<Option<SourceRecord>> {
    let Some(record) = get_source(pool, id).await? else {
        return Ok(None);
    };
    sqlx::query("DELETE FROM sources WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(Some(record))
}
