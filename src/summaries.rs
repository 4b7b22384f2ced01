//! `summaries` table: generated markdown plus the sources it came from.

use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::db::{format_ts_iso, now_ts};
use crate::error::Result;

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub id: String,
    pub name: Option<String>,
    pub source_ids: Vec<String>,
    pub markdown: String,
    pub vector_index_path: Option<String>,
    pub created_at: String,
}

const COLUMNS: &str = "id, name, source_ids, markdown, vector_index_path, created_at";

fn split_ids(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn from_row(row: &SqliteRow) -> Summary {
    let joined: String = row.get("source_ids");
    Summary {
        id: row.get("id"),
        name: row.get("name"),
        source_ids: split_ids(&joined),
        markdown: row.get("markdown"),
        vector_index_path: row.get("vector_index_path"),
        created_at: format_ts_iso(row.get("created_at")),
    }
}

/// Persist a generated summary and assign its id and timestamp.
pub async fn save_summary(
    pool: &SqlitePool,
    source_ids: &[String],
    markdown: &str,
    name: Option<&str>,
    vector_index_path: Option<&str>,
) -> Result<Summary> {
    let id = Uuid::new_v4().to_string();
    let created_at = now_ts();

    sqlx::query(
        "INSERT INTO summaries (id, name, source_ids, markdown, vector_index_path, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(name)
    .bind(source_ids.join(","))
    .bind(markdown)
    .bind(vector_index_path)
    .bind(created_at)
    .execute(pool)
    .await?;

    Ok(Summary {
        id,
        name: name.map(str::to_string),
        source_ids: source_ids.to_vec(),
        markdown: markdown.to_string(),
        vector_index_path: vector_index_path.map(str::to_string),
        created_at: format_ts_iso(created_at),
    })
}

pub async fn get_summary(pool: &SqlitePool, id: &str) -> Result<Option<Summary>> {
    let row = sqlx::query(&format!("SELECT {} FROM summaries WHERE id = ?", COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(from_row))
}

/// Newest first. `named_only` hides summaries that were never renamed.
pub async fn list_summaries(pool: &SqlitePool, named_only: bool) -> Result<Vec<Summary>> {
    let filter = if named_only {
        "WHERE name IS NOT NULL AND name != ''"
    } else {
        ""
    };
    let rows = sqlx::query(&format!(
        "SELECT {} FROM summaries {} ORDER BY created_at DESC, rowid DESC",
        COLUMNS, filter
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(from_row).collect())
}

pub async fn rename_summary(pool: &SqlitePool, id: &str, name: &str) -> Result<Option<Summary>> {
    let result = sqlx::query("UPDATE summaries SET name = ? WHERE id = ?")
        .bind(name)
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Ok(None);
    }
    get_summary(pool, id).await
}

/// Delete the row and return it, so the caller can remove a persisted index.
pub async fn delete_summary(pool: &SqlitePool, id: &str) -> Result<Option<Summary>> {
    let Some(summary) = get_summary(pool, id).await? else {
        return Ok(None);
    };
    sqlx::query("DELETE FROM summaries WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(Some(summary))
}
