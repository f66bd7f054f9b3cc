//! Test utilities for biscuit-ci scenarios

#![allow(dead_code)]

use async_trait::async_trait;
use biscuit_ci::actions::{archive, LocalReleasePublisher, ReleasePublisher};
use biscuit_ci::core::config::WorkflowConfig;
use biscuit_ci::core::{ExecutionStatus, Job, JobState, Step, StepState, TriggerEvent, Workflow};
use biscuit_ci::execution::{ExecutionEngine, ExecutionEvent, SchedulingStrategy};
use biscuit_ci::runner::{
    CommandExecutor, CommandOutput, CommandRequest, OutputCallback, OutputLine, RunnerConfig,
    RunnerError,
};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Something a mocked command does to the filesystem
#[derive(Debug, Clone)]
pub enum MockEffect {
    /// Write a file relative to the working directory
    File { path: String, contents: String },
    /// `tar czf <output> <dir>` relative to the working directory
    Archive { dir: String, output: String },
}

/// Scripted result of one command
#[derive(Debug, Clone, Default)]
pub struct MockResponse {
    pub exit_code: i32,
    pub stdout: String,
    pub outputs: Vec<(String, String)>,
    pub env: Vec<(String, String)>,
    pub effects: Vec<MockEffect>,
    pub delay: Option<Duration>,
}

impl MockResponse {
    pub fn ok(stdout: &str) -> Self {
        Self {
            stdout: stdout.to_string(),
            ..Self::default()
        }
    }

    pub fn fail(exit_code: i32, stdout: &str) -> Self {
        Self {
            exit_code,
            stdout: stdout.to_string(),
            ..Self::default()
        }
    }

    /// Append `key=value` to `$GITHUB_OUTPUT`
    pub fn with_output(mut self, key: &str, value: &str) -> Self {
        self.outputs.push((key.to_string(), value.to_string()));
        self
    }

    /// Append `key=value` to `$GITHUB_ENV`
    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_file(mut self, path: &str, contents: &str) -> Self {
        self.effects.push(MockEffect::File {
            path: path.to_string(),
            contents: contents.to_string(),
        });
        self
    }

    pub fn with_archive(mut self, dir: &str, output: &str) -> Self {
        self.effects.push(MockEffect::Archive {
            dir: dir.to_string(),
            output: output.to_string(),
        });
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Command executor that answers from a script instead of spawning processes
///
/// The first rule whose pattern is a substring of the command wins; commands
/// matching no rule succeed with no output.
#[derive(Clone, Default)]
pub struct MockExecutor {
    rules: Arc<Vec<(String, MockResponse)>>,
    requests: Arc<Mutex<Vec<CommandRequest>>>,
}

impl MockExecutor {
    pub fn new(rules: Vec<(&str, MockResponse)>) -> Self {
        Self {
            rules: Arc::new(
                rules
                    .into_iter()
                    .map(|(pattern, response)| (pattern.to_string(), response))
                    .collect(),
            ),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every command received, in order
    pub fn requests(&self) -> Vec<CommandRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.command).collect()
    }

    /// The request whose command contains `pattern`
    pub fn request_for(&self, pattern: &str) -> Option<CommandRequest> {
        self.requests()
            .into_iter()
            .find(|r| r.command.contains(pattern))
    }

    fn response_for(&self, command: &str) -> MockResponse {
        self.rules
            .iter()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_default()
    }
}

fn append_lines(path: Option<&String>, pairs: &[(String, String)]) {
    let Some(path) = path else {
        return;
    };
    if pairs.is_empty() {
        return;
    }
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .unwrap();
    for (key, value) in pairs {
        writeln!(file, "{}={}", key, value).unwrap();
    }
}

#[async_trait]
impl CommandExecutor for MockExecutor {
    async fn execute(
        &self,
        request: &CommandRequest,
        callback: Option<&dyn OutputCallback>,
    ) -> Result<CommandOutput, RunnerError> {
        self.requests.lock().unwrap().push(request.clone());
        let response = self.response_for(&request.command);

        if let Some(delay) = response.delay {
            if delay > request.timeout {
                tokio::time::sleep(request.timeout).await;
                return Err(RunnerError::Timeout(request.timeout.as_secs()));
            }
            tokio::time::sleep(delay).await;
        }

        for effect in &response.effects {
            match effect {
                MockEffect::File { path, contents } => {
                    let target = request.working_dir.join(path);
                    if let Some(parent) = target.parent() {
                        std::fs::create_dir_all(parent).unwrap();
                    }
                    std::fs::write(target, contents).unwrap();
                }
                MockEffect::Archive { dir, output } => {
                    archive::create_tar_gz(
                        &request.working_dir.join(dir),
                        &request.working_dir.join(output),
                    )
                    .await
                    .unwrap();
                }
            }
        }

        append_lines(request.env.get("GITHUB_OUTPUT"), &response.outputs);
        append_lines(request.env.get("GITHUB_ENV"), &response.env);

        if let Some(cb) = callback {
            for line in response.stdout.lines() {
                cb.on_line(&OutputLine::stdout(line));
            }
        }

        Ok(CommandOutput {
            exit_code: response.exit_code,
            stdout: response.stdout.clone(),
            stderr: String::new(),
            combined: response.stdout,
        })
    }
}

/// Temporary source tree, workspace root and release directory for one test
pub struct TestEnv {
    pub source: TempDir,
    pub workspace: TempDir,
    pub releases: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        let source = tempfile::tempdir().unwrap();
        std::fs::write(
            source.path().join("Cargo.toml"),
            "[package]\nname = \"biscuit-auth\"\nversion = \"0.1.0\"\n",
        )
        .unwrap();
        std::fs::create_dir_all(source.path().join("src")).unwrap();
        std::fs::write(source.path().join("src/lib.rs"), "pub fn biscuit() {}\n").unwrap();

        Self {
            source,
            workspace: tempfile::tempdir().unwrap(),
            releases: tempfile::tempdir().unwrap(),
        }
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig::new()
            .with_source_dir(self.source.path())
            .with_workspace_root(self.workspace.path())
    }

    pub fn publisher(&self) -> LocalReleasePublisher {
        LocalReleasePublisher::new(self.releases.path())
    }

    /// Workspace of `job_id` in the run `result` came from
    pub fn job_workspace(&self, result: &WorkflowTestResult, job_id: &str) -> PathBuf {
        self.runner_config()
            .job_workspace(&result.workflow.state.execution_id.to_string(), job_id)
    }
}

/// Options for one test run
pub struct RunOptions {
    pub event: TriggerEvent,
    pub strategy: SchedulingStrategy,
    pub secrets: HashMap<String, String>,
    pub force: bool,
    pub cancel_after: Option<Duration>,
    /// Overrides the runner's default step timeout
    pub step_timeout_secs: Option<u64>,
    /// Upper bound on the whole run before the test gives up
    pub run_timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            event: TriggerEvent::push("master"),
            strategy: SchedulingStrategy::Parallel,
            secrets: HashMap::new(),
            force: false,
            cancel_after: None,
            step_timeout_secs: None,
            run_timeout: Duration::from_secs(30),
        }
    }
}

/// Run a workflow with `executor`, collecting every emitted event
pub async fn run_workflow_with<E: CommandExecutor + 'static>(
    workflow: &mut Workflow,
    executor: E,
    env: &TestEnv,
    options: RunOptions,
) -> WorkflowTestResult {
    let publisher: Arc<dyn ReleasePublisher> = Arc::new(env.publisher());
    let mut config = env.runner_config();
    if let Some(secs) = options.step_timeout_secs {
        config = config.with_timeout(secs);
    }
    let engine = ExecutionEngine::new(executor, publisher, config, options.strategy)
        .with_force(options.force);

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    engine.add_event_handler(move |event| sink.lock().unwrap().push(event));

    if let Some(after) = options.cancel_after {
        let flag = engine.cancel_flag();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
        });
    }

    let status = tokio::time::timeout(
        options.run_timeout,
        engine.execute(workflow, &options.event, options.secrets),
    )
    .await
    .expect("workflow run timed out")
    .expect("engine error");

    let events = events.lock().unwrap().clone();
    WorkflowTestResult {
        workflow: workflow.clone(),
        status,
        events,
    }
}

/// Run with a mock executor and default options
pub async fn run_workflow_with_mock(
    workflow: &mut Workflow,
    executor: MockExecutor,
    env: &TestEnv,
) -> WorkflowTestResult {
    run_workflow_with(workflow, executor, env, RunOptions::default()).await
}

/// Outcome of one test run
#[derive(Debug, Clone)]
pub struct WorkflowTestResult {
    pub workflow: Workflow,
    pub status: ExecutionStatus,
    pub events: Vec<ExecutionEvent>,
}

impl WorkflowTestResult {
    pub fn job(&self, job_id: &str) -> &Job {
        self.workflow
            .job(job_id)
            .unwrap_or_else(|| panic!("Job '{}' not found in result", job_id))
    }

    pub fn step(&self, job_id: &str, step_key: &str) -> &Step {
        self.job(job_id)
            .step_by_key(step_key)
            .unwrap_or_else(|| panic!("Step '{}' not found in job '{}'", step_key, job_id))
    }

    /// Keys of the job's steps that ran (completed or failed), in order
    pub fn steps_run(&self, job_id: &str) -> Vec<String> {
        self.job(job_id)
            .steps
            .iter()
            .filter(|s| matches!(s.state, StepState::Completed { .. } | StepState::Failed { .. }))
            .map(|s| s.key().to_string())
            .collect()
    }

    /// Output lines emitted for `job_id`
    pub fn output_lines(&self, job_id: &str) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ExecutionEvent::StepOutput { job_id: id, line, .. } if id == job_id => {
                    Some(line.clone())
                }
                _ => None,
            })
            .collect()
    }

    pub fn summary(&self) -> String {
        let jobs: Vec<String> = self
            .workflow
            .execution_order()
            .iter()
            .filter_map(|id| self.workflow.job(id))
            .map(|j| format!("{}={:?}", j.id, j.state))
            .collect();
        format!("{:?}: {}", self.status, jobs.join(", "))
    }
}

pub fn assert_workflow_completed(result: &WorkflowTestResult) {
    assert_eq!(
        result.status,
        ExecutionStatus::Completed,
        "Workflow should have completed, but was: {}",
        result.summary()
    );
}

pub fn assert_workflow_failed(result: &WorkflowTestResult) {
    assert_eq!(
        result.status,
        ExecutionStatus::Failed,
        "Workflow should have failed, but was: {}",
        result.summary()
    );
}

pub fn assert_job_succeeded(result: &WorkflowTestResult, job_id: &str) {
    let job = result.job(job_id);
    assert!(
        matches!(job.state, JobState::Completed { .. }),
        "Job '{}' should have succeeded, but was in state: {:?}",
        job_id,
        job.state
    );
}

pub fn assert_job_failed(result: &WorkflowTestResult, job_id: &str, expected_error: &str) {
    let job = result.job(job_id);
    match &job.state {
        JobState::Failed { error, .. } => assert!(
            error.contains(expected_error),
            "Job '{}' error:\n{}\n\ndoes not contain:\n{}",
            job_id,
            error,
            expected_error
        ),
        other => panic!("Job '{}' should have failed, but was in state: {:?}", job_id, other),
    }
}

pub fn assert_job_skipped(result: &WorkflowTestResult, job_id: &str) {
    let job = result.job(job_id);
    assert!(
        matches!(job.state, JobState::Skipped { .. }),
        "Job '{}' should have been skipped, but was in state: {:?}",
        job_id,
        job.state
    );
}

pub fn assert_step_skipped(result: &WorkflowTestResult, job_id: &str, step_key: &str) {
    let step = result.step(job_id, step_key);
    assert!(
        matches!(step.state, StepState::Skipped { .. }),
        "Step '{}' should have been skipped, but was in state: {:?}",
        step_key,
        step.state
    );
}

/// Parse a workflow from YAML string
pub fn workflow_from_yaml(yaml: &str) -> Workflow {
    WorkflowConfig::from_yaml(yaml)
        .and_then(|config| config.to_workflow())
        .unwrap_or_else(|e| panic!("Failed to parse workflow YAML: {:#}", e))
}

pub fn biscuit_workflow_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("workflows/biscuit.yml")
}

/// The shipped biscuit workflow
pub fn biscuit_workflow() -> Workflow {
    WorkflowConfig::from_file(biscuit_workflow_path())
        .and_then(|config| config.to_workflow())
        .unwrap_or_else(|e| panic!("Failed to load biscuit workflow: {:#}", e))
}

/// Mock answers for the biscuit workflow where every command succeeds and
/// `cargo cinstall` installs a small C API tree
pub fn biscuit_commands() -> Vec<(&'static str, MockResponse)> {
    vec![
        ("cargo build", MockResponse::ok("Compiling biscuit-auth v0.1.0\nFinished dev")),
        ("cargo test", MockResponse::ok("test result: ok. 42 passed")),
        ("cargo install cargo-c", MockResponse::ok("Installed package `cargo-c`")),
        (
            "cargo cinstall",
            MockResponse::ok("Installing biscuit_auth.h")
                .with_file("biscuit/usr/lib/libbiscuit_auth.so", "\x7fELF")
                .with_file("biscuit/usr/lib/pkgconfig/biscuit_auth.pc", "Name: biscuit_auth")
                .with_file("biscuit/usr/include/biscuit_auth/biscuit_auth.h", "#pragma once"),
        ),
        (
            "tar czvf biscuit.tar.gz biscuit",
            MockResponse::ok("biscuit/").with_archive("biscuit", "biscuit.tar.gz"),
        ),
    ]
}
