//! Workflow domain model

use crate::core::{
    config::WorkflowConfig,
    job::Job,
    state::{ExecutionStatus, JobState, WorkflowState},
    trigger::{TriggerConfig, TriggerEvent},
};
use anyhow::Result;
use std::collections::{HashMap, HashSet};

/// A workflow definition with its runtime state
#[derive(Debug, Clone)]
pub struct Workflow {
    /// Workflow name
    pub name: String,

    /// Trigger filters
    pub on: TriggerConfig,

    /// Env applied to every job
    pub env: HashMap<String, String>,

    /// Jobs keyed by id
    pub jobs: HashMap<String, Job>,

    /// Execution state
    pub state: WorkflowState,

    /// Job order respecting `needs` (deterministic)
    execution_order: Vec<String>,
}

impl Workflow {
    /// Create a workflow from a validated configuration
    pub fn from_config(config: &WorkflowConfig) -> Result<Self> {
        let jobs = config
            .jobs
            .iter()
            .map(|(id, job)| Job::from_config(id, job).map(|j| (id.clone(), j)))
            .collect::<Result<HashMap<_, _>>>()?;

        let execution_order = Self::topological_sort(&jobs);

        Ok(Workflow {
            name: config.name.clone(),
            on: config.on.clone(),
            env: config.env_map(),
            jobs,
            state: WorkflowState::new(),
            execution_order,
        })
    }

    pub fn job(&self, id: &str) -> Option<&Job> {
        self.jobs.get(id)
    }

    pub fn job_mut(&mut self, id: &str) -> Option<&mut Job> {
        self.jobs.get_mut(id)
    }

    /// Check whether the event matches the workflow's `on:` filters
    pub fn is_triggered_by(&self, event: &TriggerEvent) -> bool {
        self.on.matches(event)
    }

    /// Restrict the run to `selected` jobs and everything they transitively need
    pub fn select_jobs(&mut self, selected: &[String]) -> Result<()> {
        if selected.is_empty() {
            return Ok(());
        }

        let mut keep = HashSet::new();
        let mut stack: Vec<String> = Vec::new();
        for id in selected {
            if !self.jobs.contains_key(id) {
                anyhow::bail!("Job '{}' not found in workflow '{}'", id, self.name);
            }
            stack.push(id.clone());
        }

        while let Some(id) = stack.pop() {
            if keep.insert(id.clone()) {
                if let Some(job) = self.jobs.get(&id) {
                    stack.extend(job.needs.iter().cloned());
                }
            }
        }

        for (id, job) in self.jobs.iter_mut() {
            if !keep.contains(id) {
                job.state = JobState::Skipped {
                    reason: "not selected".to_string(),
                };
                job.skip_remaining_steps("job not selected");
            }
        }

        Ok(())
    }

    fn succeeded_jobs(&self) -> HashSet<String> {
        self.jobs
            .values()
            .filter(|j| matches!(j.state, JobState::Completed { .. }))
            .map(|j| j.id.clone())
            .collect()
    }

    /// Get jobs ready to execute, in execution order
    pub fn ready_jobs(&self) -> Vec<&Job> {
        let succeeded = self.succeeded_jobs();

        self.execution_order
            .iter()
            .filter_map(|id| self.jobs.get(id))
            .filter(|j| matches!(j.state, JobState::Pending) && j.needs_met(&succeeded))
            .collect()
    }

    /// Get all currently running jobs
    pub fn running_jobs(&self) -> Vec<&Job> {
        self.jobs
            .values()
            .filter(|j| matches!(j.state, JobState::Running { .. }))
            .collect()
    }

    /// Skip pending jobs whose needed jobs did not succeed
    ///
    /// Returns the skipped job ids with the reason. Applied repeatedly until
    /// nothing changes so skips propagate down dependency chains.
    pub fn skip_blocked_jobs(&mut self) -> Vec<(String, String)> {
        let mut skipped = Vec::new();

        loop {
            let blocked: Vec<(String, String)> = self
                .execution_order
                .iter()
                .filter_map(|id| self.jobs.get(id))
                .filter(|j| matches!(j.state, JobState::Pending))
                .filter_map(|j| {
                    j.needs
                        .iter()
                        .find(|dep| {
                            self.jobs
                                .get(*dep)
                                .is_some_and(|d| d.state.blocks_dependents())
                        })
                        .map(|dep| (j.id.clone(), format!("needed job '{}' did not succeed", dep)))
                })
                .collect();

            if blocked.is_empty() {
                break;
            }

            for (id, reason) in blocked {
                if let Some(job) = self.jobs.get_mut(&id) {
                    job.state = JobState::Skipped {
                        reason: reason.clone(),
                    };
                    job.skip_remaining_steps(&reason);
                }
                skipped.push((id, reason));
            }
        }

        skipped
    }

    /// Check if every job reached a terminal state
    pub fn is_complete(&self) -> bool {
        self.jobs.values().all(|j| j.state.is_terminal())
    }

    /// Check if any job has failed
    pub fn has_failed(&self) -> bool {
        self.jobs
            .values()
            .any(|j| matches!(j.state, JobState::Failed { .. }))
    }

    /// Status the workflow ends with once every job is terminal
    pub fn final_status(&self) -> ExecutionStatus {
        if self
            .jobs
            .values()
            .any(|j| matches!(j.state, JobState::Cancelled { .. }))
        {
            ExecutionStatus::Cancelled
        } else if self.has_failed() {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Completed
        }
    }

    /// Refresh the job counters in `state`
    pub fn update_counts(&mut self) {
        let count = |f: fn(&JobState) -> bool| self.jobs.values().filter(|j| f(&j.state)).count();

        self.state.total_jobs = self.jobs.len();
        self.state.completed_jobs = count(|s| matches!(s, JobState::Completed { .. }));
        self.state.failed_jobs = count(|s| matches!(s, JobState::Failed { .. }));
        self.state.skipped_jobs =
            count(|s| matches!(s, JobState::Skipped { .. } | JobState::Cancelled { .. }));
        self.state.running_jobs = count(|s| matches!(s, JobState::Running { .. }));
    }

    /// Get execution order (topological sort)
    pub fn execution_order(&self) -> &[String] {
        &self.execution_order
    }

    /// Calculate topological sort of jobs based on `needs`
    fn topological_sort(jobs: &HashMap<String, Job>) -> Vec<String> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();

        // Sort for deterministic order
        let mut job_ids: Vec<_> = jobs.keys().cloned().collect();
        job_ids.sort();

        for job_id in job_ids {
            Self::visit(&job_id, jobs, &mut visited, &mut result);
        }

        result
    }

    fn visit(
        job_id: &str,
        jobs: &HashMap<String, Job>,
        visited: &mut HashSet<String>,
        result: &mut Vec<String>,
    ) {
        if !visited.insert(job_id.to_string()) {
            return;
        }

        if let Some(job) = jobs.get(job_id) {
            for dep in &job.needs {
                Self::visit(dep, jobs, visited, result);
            }
        }

        result.push(job_id.to_string());
    }
}
