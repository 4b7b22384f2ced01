//! HTTP API.
//!
//! | Method | Path | Purpose |
//! |--------|------|---------|
//! | GET | `/health` | liveness + version |
//! | POST/GET | `/sources` | upload (multipart `file`) / list |
//! | GET/PATCH/DELETE | `/sources/{id}` | fetch / rename / delete |
//! | POST | `/process` | start background summarization (202) |
//! | GET | `/process/results/{task_id}` | task status and result |
//! | POST | `/qa` | grounded question answering |
//! | GET | `/summaries` | list (`?named_only=true`) |
//! | GET/PATCH/DELETE | `/summaries/{id}` | fetch / rename / delete |
//! | POST/GET | `/notes` | create / list (`?source_summary_id=`) |
//! | GET/PATCH/DELETE | `/notes/{id}` | fetch / update / delete |
//! | POST/GET | `/history` | save / list conversations |
//! | GET | `/history/{id}` | fetch one conversation |
//!
//! Errors share one JSON shape:
//!
//! ```json
//! { "error": { "code": "not_found", "message": "source not found: 42" } }
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::embedding::create_provider;
use crate::error::RagError;
use crate::history::{self, History};
use crate::llm::LlmRouter;
use crate::migrate;
use crate::notes::{self, NewNote, Note, NoteUpdate};
use crate::rag::{PersistedIndex, QaRequest, RagPipeline, RagSettings};
use crate::sources::{self, SourceRecord};
use crate::storage::{FileStorage, SqliteSourceResolver};
use crate::summaries::{self, Summary};
use crate::tasks::{spawn_summary_job, InMemoryTaskStore, SummaryJob, Task, TaskStore};
use crate::db;

const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    pub storage: FileStorage,
    pub pipeline: Arc<RagPipeline>,
    pub tasks: Arc<dyn TaskStore>,
}

impl AppState {
    /// Open the database, run migrations, and wire up the providers.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;

        let embedder = create_provider(&config.embedding)?;
        let llm = Arc::new(LlmRouter::from_config(&config.llm)?);
        let resolver = Arc::new(SqliteSourceResolver::new(pool.clone()));
        let pipeline = RagPipeline::new(embedder, llm, resolver, RagSettings::from_config(config));

        Ok(Self {
            config: Arc::new(config.clone()),
            pool,
            storage: FileStorage::new(&config.storage.upload_dir),
            pipeline: Arc::new(pipeline),
            tasks: Arc::new(InMemoryTaskStore::new(&config.tasks)),
        })
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/sources", post(handle_upload_source).get(handle_list_sources))
        .route(
            "/sources/{id}",
            get(handle_get_source)
                .patch(handle_rename_source)
                .delete(handle_delete_source),
        )
        .route("/process", post(handle_start_processing))
        .route("/process/results/{task_id}", get(handle_process_result))
        .route("/qa", post(handle_qa))
        .route("/summaries", get(handle_list_summaries))
        .route(
            "/summaries/{id}",
            get(handle_get_summary)
                .patch(handle_rename_summary)
                .delete(handle_delete_summary),
        )
        .route("/notes", post(handle_create_note).get(handle_list_notes))
        .route(
            "/notes/{id}",
            get(handle_get_note)
                .patch(handle_update_note)
                .delete(handle_delete_note),
        )
        .route("/history", post(handle_create_history).get(handle_list_histories))
        .route("/history/{id}", get(handle_get_history))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config).await?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "docqa server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Errors ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &str {
        self.code
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let message = err.to_string();
        match err {
            RagError::SourceNotFound(_) => not_found(message),
            RagError::InvalidRequest(_) => bad_request(message),
            RagError::EmptyCorpus(_) => AppError {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                code: "empty_corpus",
                message,
            },
            RagError::EmbeddingProvider(_) | RagError::Generation(_) => {
                tracing::error!(code = err.code(), %message, "upstream provider failure");
                AppError {
                    status: StatusCode::BAD_GATEWAY,
                    code: "upstream_failure",
                    message,
                }
            }
            other => {
                tracing::error!(code = other.code(), %message, "request failed");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal",
                    message,
                }
            }
        }
    }
}

type ApiResult<T> = Result<T, AppError>;

fn require_non_blank(value: &str, field: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(bad_request(format!("{} must not be empty", field)));
    }
    Ok(())
}

// ============ Health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ Sources ============

async fn handle_upload_source(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<SourceRecord>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| bad_request("file field has no filename"))?;
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("failed to read upload: {}", e)))?;

        let path = state.storage.save(&filename, &bytes).await?;
        let stored_path = path.display().to_string();
        let record =
            match sources::insert_source(&state.pool, &filename, &content_type, &stored_path).await {
                Ok(record) => record,
                Err(e) => {
                    state.storage.remove(&path).await?;
                    return Err(e.into());
                }
            };
        tracing::info!(source_id = %record.id, filename = %record.filename, "source uploaded");
        return Ok(Json(record));
    }

    Err(bad_request("multipart body has no `file` field"))
}

async fn handle_list_sources(State(state): State<AppState>) -> ApiResult<Json<Vec<SourceRecord>>> {
    Ok(Json(sources::list_sources(&state.pool).await?))
}

async fn handle_get_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SourceRecord>> {
    sources::get_source(&state.pool, &id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(format!("source not found: {}", id)))
}

#[derive(Deserialize)]
struct RenameSource {
    filename: String,
}

async fn handle_rename_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<RenameSource>,
) -> ApiResult<Json<SourceRecord>> {
    require_non_blank(&body.filename, "filename")?;
    sources::rename_source(&state.pool, &id, body.filename.trim())
        .await?
        .map(Json)
        .ok_or_else(|| not_found(format!("source not found: {}", id)))
}

async fn handle_delete_source(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let record = sources::delete_source(&state.pool, &id)
        .await?
        .ok_or_else(|| not_found(format!("source not found: {}", id)))?;
    state.storage.remove(&PathBuf::from(&record.stored_path)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============ Processing ============

#[derive(Deserialize)]
struct ProcessRequest {
    source_ids: Vec<String>,
    #[serde(default)]
    llm_model: String,
}

#[derive(Serialize)]
struct ProcessAccepted {
    task_id: String,
}

async fn handle_start_processing(
    State(state): State<AppState>,
    Json(body): Json<ProcessRequest>,
) -> ApiResult<(StatusCode, Json<ProcessAccepted>)> {
    if body.source_ids.is_empty() {
        return Err(bad_request("source_ids must not be empty"));
    }
    let paths = state.pipeline.resolve_sources(&body.source_ids).await?;

    let task_id = state.tasks.create();
    spawn_summary_job(
        state.tasks.clone(),
        state.pipeline.clone(),
        state.config.clone(),
        SummaryJob {
            task_id: task_id.clone(),
            source_ids: body.source_ids,
            paths,
            llm_model: body.llm_model,
        },
    );

    Ok((StatusCode::ACCEPTED, Json(ProcessAccepted { task_id })))
}

async fn handle_process_result(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<Task>> {
    state
        .tasks
        .get(&task_id)
        .map(Json)
        .ok_or_else(|| not_found(format!("task not found: {}", task_id)))
}

// ============ QA ============

#[derive(Deserialize)]
struct QaBody {
    question: String,
    #[serde(default)]
    source_ids: Vec<String>,
    #[serde(default)]
    llm_model: String,
    #[serde(default)]
    summary_id: Option<String>,
}

async fn handle_qa(
    State(state): State<AppState>,
    Json(body): Json<QaBody>,
) -> ApiResult<Json<docqa_core::models::AnswerResult>> {
    if body.source_ids.is_empty() {
        return Err(bad_request("source_ids must not be empty"));
    }
    require_non_blank(&body.question, "question")?;

    let persisted_index = match &body.summary_id {
        Some(summary_id) => {
            let summary = summaries::get_summary(&state.pool, summary_id)
                .await?
                .ok_or_else(|| not_found(format!("summary not found: {}", summary_id)))?;
            summary.vector_index_path.map(|path| PersistedIndex {
                path: PathBuf::from(path),
                source_ids: summary.source_ids,
            })
        }
        None => None,
    };

    let request = QaRequest {
        question: body.question,
        source_ids: body.source_ids,
        llm_model: body.llm_model,
        persisted_index,
    };
    Ok(Json(state.pipeline.answer(&request).await?))
}

// ============ Summaries ============

#[derive(Deserialize)]
struct SummaryListQuery {
    #[serde(default)]
    named_only: bool,
}

async fn handle_list_summaries(
    State(state): State<AppState>,
    Query(query): Query<SummaryListQuery>,
) -> ApiResult<Json<Vec<Summary>>> {
    Ok(Json(summaries::list_summaries(&state.pool, query.named_only).await?))
}

async fn handle_get_summary(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Summary>> {
    summaries::get_summary(&state.pool, &id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(format!("summary not found: {}", id)))
}

#[derive(Deserialize)]
struct RenameSummary {
    name: String,
}

async fn handle_rename_summary(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<RenameSummary>,
) -> ApiResult<Json<Summary>> {
    require_non_blank(&body.name, "name")?;
    summaries::rename_summary(&state.pool, &id, body.name.trim())
        .await?
        .map(Json)
        .ok_or_else(|| not_found(format!("summary not found: {}", id)))
}

async fn handle_delete_summary(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let summary = summaries::delete_summary(&state.pool, &id)
        .await?
        .ok_or_else(|| not_found(format!("summary not found: {}", id)))?;
    if let Some(path) = summary.vector_index_path {
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::warn!(path = %path, error = %e, "could not remove summary index");
        }
    }
    Ok(StatusCode::NO_CONTENT)
}

// ============ Notes ============

#[derive(Deserialize)]
struct NoteListQuery {
    source_summary_id: Option<String>,
}

async fn handle_create_note(
    State(state): State<AppState>,
    Json(body): Json<NewNote>,
) -> ApiResult<(StatusCode, Json<Note>)> {
    require_non_blank(&body.name, "name")?;
    let note = notes::create_note(&state.pool, &body).await?;
    Ok((StatusCode::CREATED, Json(note)))
}

async fn handle_list_notes(
    State(state): State<AppState>,
    Query(query): Query<NoteListQuery>,
) -> ApiResult<Json<Vec<Note>>> {
    Ok(Json(
        notes::list_notes(&state.pool, query.source_summary_id.as_deref()).await?,
    ))
}

async fn handle_get_note(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Note>> {
    notes::get_note(&state.pool, &id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(format!("note not found: {}", id)))
}

async fn handle_update_note(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<NoteUpdate>,
) -> ApiResult<Json<Note>> {
    if let Some(name) = &body.name {
        require_non_blank(name, "name")?;
    }
    notes::update_note(&state.pool, &id, &body)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(format!("note not found: {}", id)))
}

async fn handle_delete_note(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    if notes::delete_note(&state.pool, &id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(format!("note not found: {}", id)))
    }
}

// ============ History ============

#[derive(Deserialize)]
struct HistoryBody {
    conversation: String,
}

async fn handle_create_history(
    State(state): State<AppState>,
    Json(body): Json<HistoryBody>,
) -> ApiResult<Json<History>> {
    Ok(Json(
        history::create_history(&state.pool, &body.conversation).await?,
    ))
}

async fn handle_list_histories(State(state): State<AppState>) -> ApiResult<Json<Vec<History>>> {
    Ok(Json(history::list_histories(&state.pool).await?))
}

async fn handle_get_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<History>> {
    history::get_history(&state.pool, &id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(format!("history not found: {}", id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_core::index::IndexError;

    #[test]
    fn rag_errors_map_to_http() {
        let cases = [
            (RagError::SourceNotFound("S9".into()), StatusCode::NOT_FOUND, "not_found"),
            (RagError::EmptyCorpus("none".into()), StatusCode::UNPROCESSABLE_ENTITY, "empty_corpus"),
            (RagError::InvalidRequest("blank".into()), StatusCode::BAD_REQUEST, "bad_request"),
            (RagError::embedding("timeout"), StatusCode::BAD_GATEWAY, "upstream_failure"),
            (RagError::generation("503"), StatusCode::BAD_GATEWAY, "upstream_failure"),
            (RagError::Index(IndexError::InvalidK), StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        ];
        for (err, status, code) in cases {
            let app = AppError::from(err);
            assert_eq!(app.status(), status);
            assert_eq!(app.code(), code);
        }
    }

    #[test]
    fn blank_values_rejected() {
        assert!(require_non_blank("  ", "name").is_err());
        assert!(require_non_blank("x", "name").is_ok());
    }
}
