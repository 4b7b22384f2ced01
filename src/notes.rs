//! `notes` table: free-form user notes, optionally tied to a summary.

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::db::{format_ts_iso, now_ts};
use crate::error::Result;

pub const DEFAULT_NOTE_CONTENT_TYPE: &str = "text/markdown";

#[derive(Debug, Clone, Serialize)]
pub struct Note {
    pub id: String,
    pub name: String,
    pub content: String,
    pub content_type: String,
    pub source_summary_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewNote {
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub source_summary_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NoteUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

const COLUMNS: &str =
    "id, name, content, content_type, source_summary_id, created_at, updated_at";

fn from_row(row: &SqliteRow) -> Note {
    Note {
        id: row.get("id"),
        name: row.get("name"),
        content: row.get("content"),
        content_type: row.get("content_type"),
        source_summary_id: row.get("source_summary_id"),
        created_at: format_ts_iso(row.get("created_at")),
        updated_at: format_ts_iso(row.get("updated_at")),
    }
}

pub async fn create_note(pool: &SqlitePool, note: &NewNote) -> Result<Note> {
    let id = Uuid::new_v4().to_string();
    let now = now_ts();
    let content_type = note
        .content_type
        .as_deref()
        .unwrap_or(DEFAULT_NOTE_CONTENT_TYPE);

    sqlx::query(
        "INSERT INTO notes (id, name, content, content_type, source_summary_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&note.name)
    .bind(&note.content)
    .bind(content_type)
    .bind(&note.source_summary_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(Note {
        id,
        name: note.name.clone(),
        content: note.content.clone(),
        content_type: content_type.to_string(),
        source_summary_id: note.source_summary_id.clone(),
        created_at: format_ts_iso(now),
        updated_at: format_ts_iso(now),
    })
}

pub async fn get_note(pool: &SqlitePool, id: &str) -> Result<Option<Note>> {
    let row = sqlx::query(&format!("SELECT {} FROM notes WHERE id = ?", COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(from_row))
}

/// Most recently updated first, optionally restricted to one summary.
pub async fn list_notes(pool: &SqlitePool, source_summary_id: Option<&str>) -> Result<Vec<Note>> {
    let rows = match source_summary_id {
        Some(summary_id) => {
            sqlx::query(&format!(
                "SELECT {} FROM notes WHERE source_summary_id = ? ORDER BY updated_at DESC, rowid DESC",
                COLUMNS
            ))
            .bind(summary_id)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query(&format!(
                "SELECT {} FROM notes ORDER BY updated_at DESC, rowid DESC",
                COLUMNS
            ))
            .fetch_all(pool)
            .await?
        }
    };
    Ok(rows.iter().map(from_row).collect())
}

/// Apply the fields present in `update` and bump `updated_at`.
pub async fn update_note(pool: &SqlitePool, id: &str, update: &NoteUpdate) -> Result<Option<Note>> {
    let result = sqlx::query(
        "UPDATE notes SET name = COALESCE(?, name), content = COALESCE(?, content), updated_at = ? WHERE id = ?",
    )
    .bind(&update.name)
    .bind(&update.content)
    .bind(now_ts())
    .bind(id)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Ok(None);
    }
    get_note(pool, id).await
}

pub async fn delete_note(pool: &SqlitePool, id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM notes WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
