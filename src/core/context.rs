//! Job context - variables, environment layers, secrets and step outputs

use crate::core::trigger::TriggerEvent;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Execution context for one job
///
/// Holds the values expressions can reference and the environment every
/// command of the job starts from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobContext {
    /// `github.*` and `runner.*` values
    pub variables: HashMap<String, String>,

    /// Workflow env, then job env, then `$GITHUB_ENV` additions
    pub env: HashMap<String, String>,

    /// Secret values by name
    #[serde(skip_serializing)]
    pub secrets: HashMap<String, String>,

    /// Outputs of finished steps (step id -> key -> value)
    pub step_outputs: HashMap<String, HashMap<String, String>>,

    /// Outcomes of finished steps (step id -> success/failure/skipped)
    pub step_outcomes: HashMap<String, String>,

    /// Directory the job's steps run in
    pub workspace: PathBuf,
}

impl JobContext {
    /// Create a context for `job_id` of `workflow_name`
    pub fn new(
        workflow_name: &str,
        job_id: &str,
        event: &TriggerEvent,
        workspace: &Path,
    ) -> Self {
        let mut variables = HashMap::new();
        variables.insert("github.workflow".to_string(), workflow_name.to_string());
        variables.insert("github.job".to_string(), job_id.to_string());
        variables.insert("github.ref".to_string(), event.git_ref.clone());
        variables.insert("github.ref_name".to_string(), event.branch().to_string());
        variables.insert("github.event_name".to_string(), event.kind.to_string());
        variables.insert("github.sha".to_string(), event.sha.clone().unwrap_or_default());
        variables.insert("github.workspace".to_string(), workspace.display().to_string());
        variables.insert("runner.os".to_string(), runner_os().to_string());

        Self {
            variables,
            env: HashMap::new(),
            secrets: HashMap::new(),
            step_outputs: HashMap::new(),
            step_outcomes: HashMap::new(),
            workspace: workspace.to_path_buf(),
        }
    }

    /// Set a variable
    pub fn set_variable(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), value.into());
    }

    /// Get a variable
    pub fn get_variable(&self, key: &str) -> Option<&String> {
        self.variables.get(key)
    }

    /// Layer an env map over the current one (later layers win)
    pub fn extend_env(&mut self, env: HashMap<String, String>) {
        self.env.extend(env);
    }

    /// Render `layer` against the current values, then add it to the env
    pub fn layer_env(&mut self, layer: &HashMap<String, String>) {
        let vars = self.get_rendering_variables();
        let rendered = layer
            .iter()
            .map(|(k, v)| (k.clone(), crate::core::expression::render(v, &vars)))
            .collect();
        self.extend_env(rendered);
    }

    pub fn set_secrets(&mut self, secrets: HashMap<String, String>) {
        self.secrets = secrets;
    }

    /// Record a finished step
    pub fn set_step_result(&mut self, step_id: &str, outcome: &str, outputs: HashMap<String, String>) {
        self.step_outcomes.insert(step_id.to_string(), outcome.to_string());
        self.step_outputs.insert(step_id.to_string(), outputs);
    }

    /// Get one output of a finished step
    pub fn get_step_output(&self, step_id: &str, key: &str) -> Option<&String> {
        self.step_outputs.get(step_id).and_then(|o| o.get(key))
    }

    /// Flat map of every path expressions can reference
    pub fn get_rendering_variables(&self) -> HashMap<String, String> {
        let mut vars = self.variables.clone();

        for (key, value) in &self.env {
            vars.insert(format!("env.{}", key), value.clone());
        }

        for (key, value) in &self.secrets {
            vars.insert(format!("secrets.{}", key), value.clone());
        }

        for (step_id, outputs) in &self.step_outputs {
            for (key, value) in outputs {
                vars.insert(format!("steps.{}.outputs.{}", step_id, key), value.clone());
            }
        }

        for (step_id, outcome) in &self.step_outcomes {
            vars.insert(format!("steps.{}.outcome", step_id), outcome.clone());
        }

        vars
    }

    /// Process environment for a step: implicit `GITHUB_*` values, the job env,
    /// then the step's own env
    pub fn process_env(&self, step_env: &HashMap<String, String>) -> HashMap<String, String> {
        let var = |key: &str| self.variables.get(key).cloned().unwrap_or_default();

        let mut env = HashMap::new();
        env.insert("CI".to_string(), "true".to_string());
        env.insert("GITHUB_WORKFLOW".to_string(), var("github.workflow"));
        env.insert("GITHUB_JOB".to_string(), var("github.job"));
        env.insert("GITHUB_REF".to_string(), var("github.ref"));
        env.insert("GITHUB_REF_NAME".to_string(), var("github.ref_name"));
        env.insert("GITHUB_SHA".to_string(), var("github.sha"));
        env.insert("GITHUB_EVENT_NAME".to_string(), var("github.event_name"));
        env.insert("GITHUB_WORKSPACE".to_string(), var("github.workspace"));
        env.insert("RUNNER_OS".to_string(), var("runner.os"));
        if let Some(repository) = self.variables.get("github.repository") {
            env.insert("GITHUB_REPOSITORY".to_string(), repository.clone());
        }
        if let Some(run_id) = self.variables.get("github.run_id") {
            env.insert("GITHUB_RUN_ID".to_string(), run_id.clone());
        }

        env.extend(self.env.clone());
        env.extend(step_env.clone());
        env
    }

    /// Replace every secret value in `text` with `***`
    pub fn mask_secrets(&self, text: &str) -> String {
        let mut masked = text.to_string();
        for value in self.secrets.values().filter(|v| !v.is_empty()) {
            masked = masked.replace(value.as_str(), "***");
        }
        masked
    }
}

fn runner_os() -> &'static str {
    match std::env::consts::OS {
        "linux" => "Linux",
        "macos" => "macOS",
        "windows" => "Windows",
        other => other,
    }
}
