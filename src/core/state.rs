//! Execution state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Overall workflow execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Workflow has not started
    Pending,
    /// Workflow is currently running
    Running,
    /// Every job completed or was skipped, none failed
    Completed,
    /// At least one job failed
    Failed,
    /// Workflow was interrupted
    Cancelled,
    /// The triggering event does not match the workflow's `on:` filters
    NotTriggered,
}

/// State of a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StepState {
    /// Step has not run yet
    Pending,
    /// Step is currently running
    Running {
        started_at: DateTime<Utc>,
    },
    /// Step completed successfully
    Completed {
        output: String,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    /// Step failed (non-zero exit, timeout or action error)
    Failed {
        error: String,
        output: String,
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
    /// Step did not run because an earlier step failed
    Skipped {
        reason: String,
    },
    /// Step was interrupted
    Cancelled,
}

impl StepState {
    /// Check if step is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepState::Completed { .. }
                | StepState::Failed { .. }
                | StepState::Skipped { .. }
                | StepState::Cancelled
        )
    }

    /// The `steps.<id>.outcome` value
    pub fn outcome(&self) -> &'static str {
        match self {
            StepState::Completed { .. } => "success",
            StepState::Failed { .. } => "failure",
            StepState::Skipped { .. } => "skipped",
            StepState::Cancelled => "cancelled",
            StepState::Pending | StepState::Running { .. } => "",
        }
    }
}

/// State of a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobState {
    /// Waiting for its `needs` to finish
    Pending,
    /// Steps are running
    Running {
        started_at: DateTime<Utc>,
    },
    /// Every step completed (or failed with `continue-on-error`)
    Completed {
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    /// A step failed
    Failed {
        error: String,
        failed_step: Option<String>,
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
    /// Job was not run (unselected, or a needed job did not succeed)
    Skipped {
        reason: String,
    },
    /// Job was interrupted
    Cancelled {
        reason: String,
    },
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed { .. }
                | JobState::Failed { .. }
                | JobState::Skipped { .. }
                | JobState::Cancelled { .. }
        )
    }

    /// Terminal states other than success block dependent jobs
    pub fn blocks_dependents(&self) -> bool {
        matches!(
            self,
            JobState::Failed { .. } | JobState::Skipped { .. } | JobState::Cancelled { .. }
        )
    }
}

/// Overall workflow state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    /// Unique execution ID
    pub execution_id: Uuid,

    /// Current execution status
    pub status: ExecutionStatus,

    pub started_at: Option<DateTime<Utc>>,

    pub completed_at: Option<DateTime<Utc>>,

    pub total_jobs: usize,

    pub completed_jobs: usize,

    pub failed_jobs: usize,

    pub skipped_jobs: usize,

    pub running_jobs: usize,
}

impl WorkflowState {
    pub fn new() -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            status: ExecutionStatus::Pending,
            started_at: None,
            completed_at: None,
            total_jobs: 0,
            completed_jobs: 0,
            failed_jobs: 0,
            skipped_jobs: 0,
            running_jobs: 0,
        }
    }

    /// Mark workflow as started
    pub fn start(&mut self, total_jobs: usize) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
        self.total_jobs = total_jobs;
    }

    /// Record the final status
    pub fn finish(&mut self, status: ExecutionStatus) {
        self.status = status;
        self.completed_at = Some(Utc::now());
    }

    /// Calculate progress percentage (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_jobs == 0 {
            return 0.0;
        }
        (self.completed_jobs + self.failed_jobs + self.skipped_jobs) as f64 / self.total_jobs as f64
    }
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self::new()
    }
}
