//! Workflow configuration from YAML

use crate::actions::BuiltinAction;
use crate::core::{expression, trigger::TriggerConfig, Workflow};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

/// Longest `timeout-minutes` accepted on a job or step (one week)
pub const MAX_TIMEOUT_MINUTES: u64 = 7 * 24 * 60;

/// Convert a `timeout-minutes` value to seconds, rejecting zero and values
/// above [`MAX_TIMEOUT_MINUTES`]
pub fn timeout_secs(minutes: Option<u64>) -> Result<Option<u64>> {
    let Some(minutes) = minutes else {
        return Ok(None);
    };
    if minutes == 0 || minutes > MAX_TIMEOUT_MINUTES {
        anyhow::bail!(
            "timeout-minutes must be between 1 and {}, got {}",
            MAX_TIMEOUT_MINUTES,
            minutes
        );
    }
    Ok(minutes.checked_mul(60))
}

/// Top-level workflow configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Workflow name
    #[serde(default = "default_workflow_name")]
    pub name: String,

    /// Events that trigger the workflow
    #[serde(default)]
    pub on: TriggerConfig,

    /// Environment applied to every step of every job
    #[serde(default, deserialize_with = "deserialize_string_map")]
    pub env: BTreeMap<String, String>,

    /// Jobs keyed by id
    #[serde(default)]
    pub jobs: BTreeMap<String, JobConfig>,
}

fn default_workflow_name() -> String {
    "workflow".to_string()
}

/// Job configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JobConfig {
    /// Display name (defaults to the job id)
    #[serde(default)]
    pub name: Option<String>,

    /// Runner label; recorded but every job runs on the local host
    #[serde(default)]
    pub runs_on: Option<String>,

    /// Jobs that must succeed before this one starts
    #[serde(default, deserialize_with = "deserialize_needs")]
    pub needs: Vec<String>,

    #[serde(default, deserialize_with = "deserialize_string_map")]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub timeout_minutes: Option<u64>,

    pub steps: Vec<StepConfig>,
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StepConfig {
    /// Id used by `steps.<id>` expressions
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    /// Shell command(s) to run
    #[serde(default)]
    pub run: Option<String>,

    /// Built-in action reference
    #[serde(default)]
    pub uses: Option<String>,

    /// Action inputs
    #[serde(default, deserialize_with = "deserialize_string_map")]
    pub with: BTreeMap<String, String>,

    #[serde(default, deserialize_with = "deserialize_string_map")]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub working_directory: Option<String>,

    #[serde(default)]
    pub shell: Option<String>,

    #[serde(default)]
    pub timeout_minutes: Option<u64>,

    #[serde(default)]
    pub continue_on_error: bool,
}

impl StepConfig {
    /// Name shown in output: explicit name, else the command or action
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        if let Some(uses) = &self.uses {
            return format!("Run {}", uses);
        }
        match &self.run {
            Some(run) => format!("Run {}", run.lines().next().unwrap_or("").trim()),
            None => "Unnamed step".to_string(),
        }
    }

    /// Every template string this step renders at run time
    fn templates(&self) -> impl Iterator<Item = &String> {
        self.run
            .iter()
            .chain(self.with.values())
            .chain(self.env.values())
            .chain(self.working_directory.iter())
    }
}

/// YAML scalars (strings, numbers, booleans) as strings
fn deserialize_string_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Value>> = Option::deserialize(deserializer)?;
    let mut map = BTreeMap::new();
    for (key, value) in raw.unwrap_or_default() {
        let value = match value {
            Value::String(s) => s,
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Null => String::new(),
            other => {
                return Err(serde::de::Error::custom(format!(
                    "value of '{}' must be a scalar, got {:?}",
                    key, other
                )))
            }
        };
        map.insert(key, value);
    }
    Ok(map)
}

/// `needs: build` or `needs: [build, lint]`
fn deserialize_needs<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Needs {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<Needs>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(Needs::One(job)) => vec![job],
        Some(Needs::Many(jobs)) => jobs,
    })
}

impl WorkflowConfig {
    /// Load workflow configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read workflow file {}: {}", path.display(), e))?;
        Self::from_yaml(&content)
    }

    /// Parse workflow configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: WorkflowConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the workflow configuration
    pub fn validate(&self) -> Result<()> {
        if self.jobs.is_empty() {
            anyhow::bail!("Workflow '{}' defines no jobs", self.name);
        }

        for value in self.env.values() {
            expression::check_syntax(value)
                .map_err(|e| anyhow::anyhow!("Workflow env: {}", e))?;
        }

        for (job_id, job) in &self.jobs {
            if job.steps.is_empty() {
                anyhow::bail!("Job '{}' has no steps", job_id);
            }

            for dep in &job.needs {
                if !self.jobs.contains_key(dep) {
                    anyhow::bail!("Job '{}' needs non-existent job '{}'", job_id, dep);
                }
            }

            for value in job.env.values() {
                expression::check_syntax(value)
                    .map_err(|e| anyhow::anyhow!("Job '{}' env: {}", job_id, e))?;
            }

            timeout_secs(job.timeout_minutes)
                .map_err(|e| anyhow::anyhow!("Job '{}': {}", job_id, e))?;

            self.validate_steps(job_id, job)?;
        }

        // Check for cycles in the job dependency graph
        self.check_cycles()?;

        Ok(())
    }

    fn validate_steps(&self, job_id: &str, job: &JobConfig) -> Result<()> {
        let mut seen_ids: HashSet<&str> = HashSet::new();

        for (index, step) in job.steps.iter().enumerate() {
            let label = format!("Job '{}' step {} ({})", job_id, index + 1, step.display_name());

            match (&step.run, &step.uses) {
                (Some(_), Some(_)) => anyhow::bail!("{}: 'run' and 'uses' are mutually exclusive", label),
                (None, None) => anyhow::bail!("{}: one of 'run' or 'uses' is required", label),
                (None, Some(uses)) => {
                    BuiltinAction::parse(uses, &step.with)
                        .map_err(|e| anyhow::anyhow!("{}: {}", label, e))?;
                }
                (Some(_), None) => {}
            }

            timeout_secs(step.timeout_minutes).map_err(|e| anyhow::anyhow!("{}: {}", label, e))?;

            // Expressions may only look back at steps that already ran
            for template in step.templates() {
                expression::check_syntax(template)
                    .map_err(|e| anyhow::anyhow!("{}: {}", label, e))?;

                for path in expression::references(template) {
                    if let Some(referenced) = expression::referenced_step(&path) {
                        if !seen_ids.contains(referenced) {
                            anyhow::bail!(
                                "{}: expression '{}' references step '{}' which does not run before it",
                                label,
                                path,
                                referenced
                            );
                        }
                    }
                }
            }

            if let Some(id) = &step.id {
                if !seen_ids.insert(id.as_str()) {
                    anyhow::bail!("Job '{}' has duplicate step ID: {}", job_id, id);
                }
            }
        }

        Ok(())
    }

    /// Check for cycles in the `needs` graph
    fn check_cycles(&self) -> Result<()> {
        let mut visited = HashSet::new();
        let mut recursion_stack = HashSet::new();

        for job_id in self.jobs.keys() {
            if !visited.contains(job_id) {
                self.dfs_check(job_id, &mut visited, &mut recursion_stack)?;
            }
        }

        Ok(())
    }

    fn dfs_check(
        &self,
        job_id: &str,
        visited: &mut HashSet<String>,
        recursion_stack: &mut HashSet<String>,
    ) -> Result<()> {
        visited.insert(job_id.to_string());
        recursion_stack.insert(job_id.to_string());

        if let Some(job) = self.jobs.get(job_id) {
            for dep in &job.needs {
                if recursion_stack.contains(dep) {
                    anyhow::bail!("Cycle detected in job dependencies involving '{}'", dep);
                }
                if !visited.contains(dep) {
                    self.dfs_check(dep, visited, recursion_stack)?;
                }
            }
        }

        recursion_stack.remove(job_id);
        Ok(())
    }

    /// Workflow env as a plain map
    pub fn env_map(&self) -> HashMap<String, String> {
        self.env.clone().into_iter().collect()
    }

    /// Convert config to a Workflow domain model
    pub fn to_workflow(&self) -> Result<Workflow> {
        Workflow::from_config(self)
    }
}
