//! Job domain model

use crate::core::{
    config::{timeout_secs, JobConfig},
    state::{JobState, StepState},
    step::Step,
};
use anyhow::Result;
use std::collections::HashMap;

/// A job: an independently scheduled sequence of steps
#[derive(Debug, Clone)]
pub struct Job {
    /// Key under `jobs:`
    pub id: String,

    /// Display name
    pub name: String,

    /// Runner label from `runs-on`
    pub runs_on: Option<String>,

    /// Jobs that must succeed first
    pub needs: Vec<String>,

    /// Job-level env templates
    pub env: HashMap<String, String>,

    pub timeout_secs: Option<u64>,

    pub steps: Vec<Step>,

    pub state: JobState,
}

impl Job {
    pub fn from_config(id: &str, config: &JobConfig) -> Result<Self> {
        let steps = config
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| Step::from_config(index, step))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| anyhow::anyhow!("Job '{}': {}", id, e))?;

        Ok(Job {
            id: id.to_string(),
            name: config.name.clone().unwrap_or_else(|| id.to_string()),
            runs_on: config.runs_on.clone(),
            needs: config.needs.clone(),
            env: config.env.clone().into_iter().collect(),
            timeout_secs: timeout_secs(config.timeout_minutes)
                .map_err(|e| anyhow::anyhow!("Job '{}': {}", id, e))?,
            steps,
            state: JobState::Pending,
        })
    }

    /// Check that every needed job is in `succeeded`
    pub fn needs_met(&self, succeeded: &std::collections::HashSet<String>) -> bool {
        self.needs.iter().all(|dep| succeeded.contains(dep))
    }

    /// Mark every step that has not finished as skipped
    pub fn skip_remaining_steps(&mut self, reason: &str) {
        for step in self.steps.iter_mut().filter(|s| !s.state.is_terminal()) {
            step.state = StepState::Skipped {
                reason: reason.to_string(),
            };
        }
    }

    /// Look up a step by id
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id.as_deref() == Some(id))
    }

    /// Look up a step by id or display name
    pub fn step_by_key(&self, key: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.key() == key)
    }
}
