//! Job scheduler - determines which jobs to start next

use crate::core::Workflow;
use std::str::FromStr;

/// Strategy for scheduling job execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingStrategy {
    /// One job at a time, in dependency order
    Sequential,

    /// Every ready job at once
    Parallel,

    /// At most N jobs running at once
    LimitedParallel(usize),
}

impl Default for SchedulingStrategy {
    fn default() -> Self {
        SchedulingStrategy::Parallel
    }
}

impl FromStr for SchedulingStrategy {
    type Err = String;

    /// Accepts `sequential`, `parallel` or `parallel:<n>`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "sequential" => Ok(SchedulingStrategy::Sequential),
            "parallel" => Ok(SchedulingStrategy::Parallel),
            other => {
                let limit = other
                    .strip_prefix("parallel:")
                    .and_then(|n| n.parse::<usize>().ok())
                    .filter(|n| *n > 0)
                    .ok_or_else(|| {
                        format!(
                            "invalid strategy '{}' (expected sequential, parallel or parallel:<n>)",
                            other
                        )
                    })?;
                Ok(SchedulingStrategy::LimitedParallel(limit))
            }
        }
    }
}

/// Scheduler for determining which jobs to run
#[derive(Debug, Clone, Default)]
pub struct JobScheduler {
    strategy: SchedulingStrategy,
}

impl JobScheduler {
    pub fn new(strategy: SchedulingStrategy) -> Self {
        Self { strategy }
    }

    /// Ids of the jobs to start now
    pub fn next_jobs(&self, workflow: &Workflow) -> Vec<String> {
        let limit = match self.strategy {
            SchedulingStrategy::Sequential => 1,
            SchedulingStrategy::Parallel => usize::MAX,
            SchedulingStrategy::LimitedParallel(max) => max,
        };

        let remaining = limit.saturating_sub(workflow.running_jobs().len());
        if remaining == 0 {
            return vec![];
        }

        workflow
            .ready_jobs()
            .into_iter()
            .take(remaining)
            .map(|j| j.id.clone())
            .collect()
    }

    /// Check if there are more jobs to start
    pub fn has_more(&self, workflow: &Workflow) -> bool {
        !workflow.ready_jobs().is_empty()
    }
}
