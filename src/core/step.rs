//! Step domain model

use crate::actions::BuiltinAction;
use crate::core::{
    config::{timeout_secs, StepConfig},
    expression,
    state::StepState,
};
use anyhow::Result;
use std::collections::HashMap;

/// What a step does when it runs
#[derive(Debug, Clone)]
pub enum StepAction {
    /// `run:` shell command
    Run {
        command: String,
        shell: Option<String>,
    },
    /// `uses:` built-in action
    Uses(BuiltinAction),
}

/// A single step in a job
#[derive(Debug, Clone)]
pub struct Step {
    /// Position in the job (0-based)
    pub index: usize,

    /// Optional id for `steps.<id>` expressions
    pub id: Option<String>,

    /// Display name
    pub name: String,

    pub action: StepAction,

    /// Step-level env templates
    pub env: HashMap<String, String>,

    pub working_directory: Option<String>,

    /// Step timeout (None = runner default)
    pub timeout_secs: Option<u64>,

    /// Failure is recorded but does not fail the job
    pub continue_on_error: bool,

    /// Values written to `$GITHUB_OUTPUT` or set by an action
    pub outputs: HashMap<String, String>,

    /// Runtime state
    pub state: StepState,
}

impl Step {
    /// Create a step from a validated step config
    pub fn from_config(index: usize, config: &StepConfig) -> Result<Self> {
        let action = match (&config.run, &config.uses) {
            (Some(command), None) => StepAction::Run {
                command: command.clone(),
                shell: config.shell.clone(),
            },
            (None, Some(uses)) => StepAction::Uses(
                BuiltinAction::parse(uses, &config.with).map_err(|e| anyhow::anyhow!(e))?,
            ),
            _ => anyhow::bail!("Step {} must define exactly one of 'run' or 'uses'", index + 1),
        };

        Ok(Step {
            index,
            id: config.id.clone(),
            name: config.display_name(),
            action,
            env: config.env.clone().into_iter().collect(),
            working_directory: config.working_directory.clone(),
            timeout_secs: timeout_secs(config.timeout_minutes)?,
            continue_on_error: config.continue_on_error,
            outputs: HashMap::new(),
            state: StepState::Pending,
        })
    }

    /// Key used in events and reports: the id when present, else the display name
    pub fn key(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }

    /// Render the step's env templates
    pub fn render_env(&self, variables: &HashMap<String, String>) -> HashMap<String, String> {
        self.env
            .iter()
            .map(|(k, v)| (k.clone(), expression::render(v, variables)))
            .collect()
    }

    /// Render the command of a `run:` step
    pub fn render_command(&self, variables: &HashMap<String, String>) -> Option<String> {
        match &self.action {
            StepAction::Run { command, .. } => Some(expression::render(command, variables)),
            StepAction::Uses(_) => None,
        }
    }

    /// Check whether the step ended in success
    pub fn succeeded(&self) -> bool {
        matches!(self.state, StepState::Completed { .. })
    }

    /// Captured output of a finished step
    pub fn output(&self) -> Option<&str> {
        match &self.state {
            StepState::Completed { output, .. } | StepState::Failed { output, .. } => Some(output),
            _ => None,
        }
    }
}
