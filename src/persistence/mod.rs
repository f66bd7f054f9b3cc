//! Persistence layer for workflow run history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteExecutionStore;

pub use crate::core::ExecutionStatus;
use crate::core::{JobState, TriggerEvent, Workflow};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Result of one job in a stored run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: String,

    /// success, failure, skipped, cancelled or pending
    pub result: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of a workflow run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// Unique execution ID
    pub execution_id: Uuid,

    pub workflow_name: String,

    /// push or pull_request
    pub event: String,

    pub git_ref: String,

    pub status: ExecutionStatus,

    pub started_at: DateTime<Utc>,

    pub completed_at: Option<DateTime<Utc>>,

    /// Progress (0.0 to 1.0)
    pub progress: f64,

    pub total_jobs: usize,

    pub completed_jobs: usize,

    pub failed_jobs: usize,

    /// Per-job results in execution order
    #[serde(default)]
    pub jobs: Vec<JobSummary>,
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a workflow run
    async fn save_execution(&self, execution: &ExecutionSummary) -> Result<()>;

    /// Load a run by ID
    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionSummary>>;

    /// List all runs of a workflow, newest first
    async fn list_executions(&self, workflow_name: &str) -> Result<Vec<ExecutionSummary>>;

    /// List all workflow names
    async fn list_workflows(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or ephemeral use)
pub struct InMemoryPersistence {
    executions: tokio::sync::RwLock<std::collections::HashMap<Uuid, ExecutionSummary>>,
    by_workflow: tokio::sync::RwLock<std::collections::HashMap<String, Vec<Uuid>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self {
            executions: tokio::sync::RwLock::new(std::collections::HashMap::new()),
            by_workflow: tokio::sync::RwLock::new(std::collections::HashMap::new()),
        }
    }
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_execution(&self, execution: &ExecutionSummary) -> Result<()> {
        let mut execs = self.executions.write().await;
        let replaced = execs
            .insert(execution.execution_id, execution.clone())
            .is_some();

        if !replaced {
            let mut by_workflow = self.by_workflow.write().await;
            by_workflow
                .entry(execution.workflow_name.clone())
                .or_default()
                .push(execution.execution_id);
        }

        Ok(())
    }

    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionSummary>> {
        let execs = self.executions.read().await;
        Ok(execs.get(&execution_id).cloned())
    }

    async fn list_executions(&self, workflow_name: &str) -> Result<Vec<ExecutionSummary>> {
        let execs = self.executions.read().await;
        let by_workflow = self.by_workflow.read().await;

        let mut result: Vec<ExecutionSummary> = by_workflow
            .get(workflow_name)
            .map(|ids| ids.iter().filter_map(|id| execs.get(id).cloned()).collect())
            .unwrap_or_default();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(result)
    }

    async fn list_workflows(&self) -> Result<Vec<String>> {
        let by_workflow = self.by_workflow.read().await;
        let mut names: Vec<String> = by_workflow.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

/// Stable name of a status in storage
pub fn status_name(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Pending => "pending",
        ExecutionStatus::Running => "running",
        ExecutionStatus::Completed => "completed",
        ExecutionStatus::Failed => "failed",
        ExecutionStatus::Cancelled => "cancelled",
        ExecutionStatus::NotTriggered => "not_triggered",
    }
}

pub fn parse_status(name: &str) -> ExecutionStatus {
    match name {
        "running" => ExecutionStatus::Running,
        "completed" => ExecutionStatus::Completed,
        "failed" => ExecutionStatus::Failed,
        "cancelled" => ExecutionStatus::Cancelled,
        "not_triggered" => ExecutionStatus::NotTriggered,
        _ => ExecutionStatus::Pending,
    }
}

/// Create a summary from a finished workflow
pub fn create_summary(workflow: &Workflow, event: &TriggerEvent) -> ExecutionSummary {
    let jobs = workflow
        .execution_order()
        .iter()
        .filter_map(|id| workflow.job(id))
        .map(|job| {
            let (result, error) = match &job.state {
                JobState::Completed { .. } => ("success", None),
                JobState::Failed { error, .. } => ("failure", Some(error.clone())),
                JobState::Skipped { reason } => ("skipped", Some(reason.clone())),
                JobState::Cancelled { reason } => ("cancelled", Some(reason.clone())),
                JobState::Pending | JobState::Running { .. } => ("pending", None),
            };
            JobSummary {
                job_id: job.id.clone(),
                result: result.to_string(),
                error,
            }
        })
        .collect();

    ExecutionSummary {
        execution_id: workflow.state.execution_id,
        workflow_name: workflow.name.clone(),
        event: event.kind.to_string(),
        git_ref: event.git_ref.clone(),
        status: workflow.state.status,
        started_at: workflow.state.started_at.unwrap_or_else(Utc::now),
        completed_at: workflow.state.completed_at,
        progress: workflow.state.progress(),
        total_jobs: workflow.state.total_jobs,
        completed_jobs: workflow.state.completed_jobs,
        failed_jobs: workflow.state.failed_jobs,
        jobs,
    }
}
