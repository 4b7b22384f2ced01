//! Background summarization tasks and their status store.
//!
//! A task moves `pending → processing → completed | failed`. The store is
//! injected (see [`TaskStore`]) so handlers and tests never touch global
//! state. [`InMemoryTaskStore`] keeps everything behind one mutex; task
//! records are small and updated a handful of times each.
//!
//! Finished tasks are evicted on every `create`: anything terminal and
//! older than the TTL goes first, then the oldest terminal tasks until the
//! map fits `max_entries`. Pending and processing tasks are never evicted.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use uuid::Uuid;

use crate::config::{Config, TasksConfig};
use crate::db;
use crate::rag::RagPipeline;
use crate::summaries;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryTaskResult {
    pub markdown: String,
    pub summary_id: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub task_id: String,
    pub status: TaskStatus,
    pub result: Option<SummaryTaskResult>,
    pub error: Option<String>,
    #[serde(skip)]
    updated_at: Instant,
}

pub trait TaskStore: Send + Sync {
    /// Register a new pending task and return its id.
    fn create(&self) -> String;

    /// Overwrite status, result and error. Unknown ids are inserted.
    fn update(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: Option<SummaryTaskResult>,
        error: Option<String>,
    );

    fn get(&self, task_id: &str) -> Option<Task>;
}

pub struct InMemoryTaskStore {
    tasks: Mutex<HashMap<String, Task>>,
    max_entries: usize,
    ttl: Duration,
}

impl InMemoryTaskStore {
    pub fn new(config: &TasksConfig) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            max_entries: config.max_entries.max(1),
            ttl: Duration::from_secs(config.ttl_secs),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Task>> {
        // A panic while holding the lock cannot leave a task half-written.
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn evict(&self, tasks: &mut HashMap<String, Task>) {
        let ttl = self.ttl;
        tasks.retain(|_, t| !(t.status.is_terminal() && t.updated_at.elapsed() >= ttl));

        if tasks.len() < self.max_entries {
            return;
        }
        let mut terminal: Vec<(Instant, String)> = tasks
            .iter()
            .filter(|(_, t)| t.status.is_terminal())
            .map(|(id, t)| (t.updated_at, id.clone()))
            .collect();
        terminal.sort();
        let excess = tasks.len() + 1 - self.max_entries;
        for (_, id) in terminal.into_iter().take(excess) {
            tasks.remove(&id);
        }
    }
}

impl TaskStore for InMemoryTaskStore {
    fn create(&self) -> String {
        let task_id = Uuid::new_v4().to_string();
        let mut tasks = self.lock();
        self.evict(&mut tasks);
        tasks.insert(
            task_id.clone(),
            Task {
                task_id: task_id.clone(),
                status: TaskStatus::Pending,
                result: None,
                error: None,
                updated_at: Instant::now(),
            },
        );
        task_id
    }

    fn update(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: Option<SummaryTaskResult>,
        error: Option<String>,
    ) {
        let mut tasks = self.lock();
        tasks.insert(
            task_id.to_string(),
            Task {
                task_id: task_id.to_string(),
                status,
                result,
                error,
                updated_at: Instant::now(),
            },
        );
    }

    fn get(&self, task_id: &str) -> Option<Task> {
        self.lock().get(task_id).cloned()
    }
}

/// Everything a background summarization run needs.
pub struct SummaryJob {
    pub task_id: String,
    pub source_ids: Vec<String>,
    pub paths: Vec<PathBuf>,
    pub llm_model: String,
}

/// Run `job` on the runtime and record its outcome in `store`.
///
/// The job opens its own database pool; the request that scheduled it may
/// be long gone by the time it writes the summary.
pub fn spawn_summary_job(
    store: Arc<dyn TaskStore>,
    pipeline: Arc<RagPipeline>,
    config: Arc<Config>,
    job: SummaryJob,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let task_id = job.task_id.clone();
        store.update(&task_id, TaskStatus::Processing, None, None);
        tracing::info!(task_id = %task_id, sources = job.source_ids.len(), "summarization started");

        match run_summary_job(&pipeline, &config, job).await {
            Ok(result) => {
                tracing::info!(task_id = %task_id, summary_id = %result.summary_id, "summarization completed");
                store.update(&task_id, TaskStatus::Completed, Some(result), None);
            }
            Err(e) => {
                tracing::error!(task_id = %task_id, error = %format!("{:#}", e), "summarization failed");
                store.update(&task_id, TaskStatus::Failed, None, Some(format!("{:#}", e)));
            }
        }
    })
}

async fn run_summary_job(
    pipeline: &RagPipeline,
    config: &Config,
    job: SummaryJob,
) -> anyhow::Result<SummaryTaskResult> {
    let output = pipeline.summarize(&job.paths, &job.llm_model).await?;

    let pool = db::connect(config).await?;
    let index_path = output
        .index_path
        .as_ref()
        .map(|p| p.display().to_string());
    let saved = summaries::save_summary(
        &pool,
        &job.source_ids,
        &output.markdown,
        None,
        index_path.as_deref(),
    )
    .await;
    pool.close().await;
    let summary = saved?;

    Ok(SummaryTaskResult {
        markdown: summary.markdown,
        summary_id: summary.id,
        created_at: summary.created_at,
    })
}
