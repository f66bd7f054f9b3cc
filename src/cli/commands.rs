//! CLI command definitions

use crate::core::TriggerEvent;
use crate::execution::SchedulingStrategy;
use clap::Args;
use std::path::PathBuf;

/// Run a workflow
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to workflow YAML file
    #[arg(short, long)]
    pub file: String,

    #[command(flatten)]
    pub trigger: TriggerArgs,

    /// Only run these jobs (repeatable)
    #[arg(long)]
    pub job: Vec<String>,

    /// Secret available as `secrets.<KEY>` (key=value)
    #[arg(long, value_parser = parse_key_value)]
    pub secret: Vec<(String, String)>,

    /// Token for release steps, exposed as `secrets.GITHUB_TOKEN`
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Extra workflow-level env (key=value), overriding the file's `env:`
    #[arg(long, value_parser = parse_key_value)]
    pub env: Vec<(String, String)>,

    /// Directory checked out into each job workspace
    #[arg(long, default_value = ".")]
    pub source: PathBuf,

    /// Root for per-run job workspaces
    #[arg(long)]
    pub workspace: Option<PathBuf>,

    /// Publish releases into this directory
    #[arg(long, conflicts_with = "github_repo")]
    pub release_dir: Option<PathBuf>,

    /// Publish releases to this GitHub repository (owner/name)
    #[arg(long)]
    pub github_repo: Option<String>,

    /// sequential, parallel or parallel:<n>
    #[arg(long, default_value = "parallel", value_parser = parse_strategy)]
    pub strategy: SchedulingStrategy,

    /// Print commands instead of running them and publish nothing
    #[arg(long)]
    pub dry_run: bool,

    /// Run even if the event does not match the workflow's `on:` filters
    #[arg(long)]
    pub force: bool,

    /// Don't save execution to history
    #[arg(long)]
    pub no_history: bool,

    /// Keep job workspaces after the run
    #[arg(long)]
    pub keep_workspace: bool,
}

/// The simulated repository event
#[derive(Debug, Args, Clone)]
pub struct TriggerArgs {
    /// Event kind
    #[arg(long, value_enum, default_value_t = EventArg::Push)]
    pub event: EventArg,

    /// Branch pushed to, or base branch of the pull request
    #[arg(long = "ref", default_value = "master")]
    pub git_ref: String,

    /// Commit SHA exposed as `github.sha`
    #[arg(long)]
    pub sha: Option<String>,
}

impl TriggerArgs {
    pub fn to_event(&self) -> TriggerEvent {
        let event = match self.event {
            EventArg::Push => TriggerEvent::push(&self.git_ref),
            EventArg::PullRequest => TriggerEvent::pull_request(&self.git_ref),
        };
        match &self.sha {
            Some(sha) => event.with_sha(sha),
            None => event,
        }
    }
}

/// Event kind argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EventArg {
    Push,
    PullRequest,
}

/// Validate a workflow file
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to workflow YAML file
    #[arg(short, long)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show the jobs an event would run
#[derive(Debug, Args, Clone)]
pub struct PlanCommand {
    /// Path to workflow YAML file
    #[arg(short, long)]
    pub file: String,

    #[command(flatten)]
    pub trigger: TriggerArgs,
}

/// List workflows with recorded runs
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Show execution counts
    #[arg(long)]
    pub with_counts: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show execution history
///
/// The global `--verbose` flag adds per-job results.
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Workflow name to filter by
    #[arg(short, long)]
    pub workflow: Option<String>,

    /// Number of recent executions to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a single execution
    #[arg(long)]
    pub execution_id: Option<String>,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Invalid key=value pair: {}", s)),
    }
}

fn parse_strategy(s: &str) -> Result<SchedulingStrategy, String> {
    s.parse()
}
