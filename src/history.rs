//! `histories` table: saved chat transcripts, stored as opaque text.

use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::db::{format_ts_iso, now_ts};
use crate::error::Result;

#[derive(Debug, Clone, Serialize)]
pub struct History {
    pub id: String,
    pub conversation: String,
    pub created_at: String,
}

fn from_row(row: &SqliteRow) -> History {
    History {
        id: row.get("id"),
        conversation: row.get("conversation"),
        created_at: format_ts_iso(row.get("created_at")),
    }
}

pub async fn create_history(pool: &SqlitePool, conversation: &str) -> Result<History> {
    let id = Uuid::new_v4().to_string();
    let created_at = now_ts();
    sqlx::query("INSERT INTO histories (id, conversation, created_at) VALUES (?, ?, ?)")
        .bind(&id)
        .bind(conversation)
        .bind(created_at)
        .execute(pool)
        .await?;
    Ok(History {
        id,
        conversation: conversation.to_string(),
        created_at: format_ts_iso(created_at),
    })
}

pub async fn get_history(pool: &SqlitePool, id: &str) -> Result<Option<History>> {
    let row = sqlx::query("SELECT id, conversation, created_at FROM histories WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(from_row))
}

pub async fn list_histories(pool: &SqlitePool) -> Result<Vec<History>> {
    let rows = sqlx::query(
        "SELECT id, conversation, created_at FROM histories ORDER BY created_at DESC, rowid DESC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(from_row).collect())
}
