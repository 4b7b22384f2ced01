//! SQLite record modules and the source resolver against a scratch database.

use docqa::config::parse_config;
use docqa::error::RagError;
use docqa::notes::{self, NewNote, NoteUpdate};
use docqa::storage::{FileStorage, SourceResolver, SqliteSourceResolver};
use docqa::{db, history, migrate, sources, summaries};
use sqlx::SqlitePool;
use tempfile::TempDir;

async fn setup() -> (TempDir, SqlitePool) {
    let tmp = TempDir::new().unwrap();
    let config = parse_config(&format!(
        "[db]\npath = \"{}\"\n",
        tmp.path().join("data").join("docqa.sqlite").display()
    ))
    .unwrap();

    // Twice: migrations must be idempotent.
    migrate::run_migrations(&config).await.unwrap();
    migrate::run_migrations(&config).await.unwrap();

    let pool = db::connect(&config).await.unwrap();
    (tmp, pool)
}

#[tokio::test]
async fn source_lifecycle_and_resolution() {
    let (tmp, pool) = setup().await;
    let storage = FileStorage::new(tmp.path().join("uploads"));
    let path = storage.save("paper.pdf", b"%PDF-1.4").await.unwrap();

    let record = sources::insert_source(
        &pool,
        "paper.pdf",
        "application/pdf",
        &path.display().to_string(),
    )
    .await
    .unwrap();

    let resolver = SqliteSourceResolver::new(pool.clone());
    assert_eq!(resolver.resolve(&record.id).await.unwrap(), path);
    assert!(matches!(
        resolver.resolve("nope").await,
        Err(RagError::SourceNotFound(_))
    ));

    let renamed = sources::rename_source(&pool, &record.id, "Paper v2.pdf")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(renamed.filename, "Paper v2.pdf");
    assert_eq!(renamed.stored_path, record.stored_path);
    assert_eq!(sources::list_sources(&pool).await.unwrap().len(), 1);

    // A row whose file vanished does not resolve.
    std::fs::remove_file(&path).unwrap();
    assert!(matches!(
        resolver.resolve(&record.id).await,
        Err(RagError::SourceNotFound(_))
    ));

    let deleted = sources::delete_source(&pool, &record.id).await.unwrap();
    assert!(deleted.is_some());
    assert!(sources::get_source(&pool, &record.id).await.unwrap().is_none());
    assert!(sources::rename_source(&pool, &record.id, "x")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn summaries_keep_source_order_and_filter_named() {
    let (_tmp, pool) = setup().await;
    let ids = vec!["b".to_string(), "a".to_string()];

    let first = summaries::save_summary(&pool, &ids, "# One", None, None)
        .await
        .unwrap();
    let second = summaries::save_summary(&pool, &ids, "# Two", None, Some("/idx/x.json"))
        .await
        .unwrap();

    let fetched = summaries::get_summary(&pool, &first.id).await.unwrap().unwrap();
    assert_eq!(fetched.source_ids, ["b", "a"]);
    assert_eq!(fetched.name, None);
    assert!(chrono::DateTime::parse_from_rfc3339(&fetched.created_at).is_ok());

    assert_eq!(summaries::list_summaries(&pool, false).await.unwrap().len(), 2);
    assert!(summaries::list_summaries(&pool, true).await.unwrap().is_empty());

    summaries::rename_summary(&pool, &second.id, "Week 1")
        .await
        .unwrap()
        .unwrap();
    let named = summaries::list_summaries(&pool, true).await.unwrap();
    assert_eq!(named.len(), 1);
    assert_eq!(named[0].name.as_deref(), Some("Week 1"));
    assert_eq!(named[0].vector_index_path.as_deref(), Some("/idx/x.json"));

    let removed = summaries::delete_summary(&pool, &second.id).await.unwrap().unwrap();
    assert_eq!(removed.id, second.id);
    assert!(summaries::delete_summary(&pool, &second.id).await.unwrap().is_none());
}

#[tokio::test]
async fn notes_filter_and_partial_update() {
    let (_tmp, pool) = setup().await;

    let tied = notes::create_note(
        &pool,
        &NewNote {
            name: "Key dates".into(),
            content: "- 1789".into(),
            content_type: None,
            source_summary_id: Some("sum-1".into()),
        },
    )
    .await
    .unwrap();
    assert_eq!(tied.content_type, "text/markdown");

    notes::create_note(
        &pool,
        &NewNote {
            name: "Loose".into(),
            content: "plain".into(),
            content_type: Some("text/plain".into()),
            source_summary_id: None,
        },
    )
    .await
    .unwrap();

    assert_eq!(notes::list_notes(&pool, None).await.unwrap().len(), 2);
    let filtered = notes::list_notes(&pool, Some("sum-1")).await.unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].id, tied.id);

    let updated = notes::update_note(
        &pool,
        &tied.id,
        &NoteUpdate {
            name: None,
            content: Some("- 1789\n- 1815".into()),
        },
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(updated.name, "Key dates");
    assert_eq!(updated.content, "- 1789\n- 1815");

    assert!(notes::delete_note(&pool, &tied.id).await.unwrap());
    assert!(!notes::delete_note(&pool, &tied.id).await.unwrap());
    assert!(notes::update_note(&pool, &tied.id, &NoteUpdate::default())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn history_roundtrip() {
    let (_tmp, pool) = setup().await;
    let saved = history::create_history(&pool, r#"[{"role":"user","content":"hi"}]"#)
        .await
        .unwrap();

    let fetched = history::get_history(&pool, &saved.id).await.unwrap().unwrap();
    assert_eq!(fetched.conversation, saved.conversation);
    assert_eq!(history::list_histories(&pool).await.unwrap().len(), 1);
    assert!(history::get_history(&pool, "missing").await.unwrap().is_none());
}
