//! Job executor - runs the steps of one job in order

use crate::{
    actions::{self, ActionContext, ReleasePublisher},
    core::{JobContext, Job, JobState, Step, StepAction, StepState, TriggerEvent},
    execution::engine::{EventEmitter, ExecutionEvent},
    runner::{
        CommandExecutor, CommandRequest, OutputCallback, OutputLine, RunnerConfig, RunnerError,
        Shell,
    },
};
use chrono::Utc;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{timeout, Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Values shared by every job of one run
#[derive(Debug, Clone)]
pub struct RunContext {
    pub execution_id: Uuid,
    pub workflow_name: String,
    pub workflow_env: HashMap<String, String>,
    pub event: TriggerEvent,
    pub secrets: HashMap<String, String>,
}

/// Result of executing a step
#[derive(Debug, Clone)]
pub enum ExecutionResult {
    Success {
        output: String,
        outputs: HashMap<String, String>,
        env: HashMap<String, String>,
    },
    Failed {
        error: String,
        output: String,
    },
    Cancelled,
}

/// Forwards command output to the event handlers, secrets masked
struct StepOutputForwarder<'a> {
    job_id: &'a str,
    step: &'a str,
    context: &'a JobContext,
    events: &'a EventEmitter,
}

impl OutputCallback for StepOutputForwarder<'_> {
    fn on_line(&self, line: &OutputLine) {
        self.events.emit(ExecutionEvent::StepOutput {
            job_id: self.job_id.to_string(),
            step: self.step.to_string(),
            stream: line.stream,
            line: self.context.mask_secrets(&line.text),
        });
    }
}

/// Executes jobs step by step
pub struct JobExecutor<E> {
    commands: Arc<E>,
    publisher: Arc<dyn ReleasePublisher>,
    config: Arc<RunnerConfig>,
}

impl<E: CommandExecutor> JobExecutor<E> {
    pub fn new(commands: E, publisher: Arc<dyn ReleasePublisher>, config: RunnerConfig) -> Self {
        Self {
            commands: Arc::new(commands),
            publisher,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run every step of `job`, leaving the final job and step states on it
    ///
    /// Steps run in order. The first failing step (without
    /// `continue-on-error`) fails the job and the remaining steps are skipped.
    pub async fn execute(
        &self,
        job: &mut Job,
        run: &RunContext,
        events: &EventEmitter,
        cancelled: &AtomicBool,
    ) {
        let started_at = match job.state {
            JobState::Running { started_at } => started_at,
            _ => Utc::now(),
        };
        info!("Executing job: {}", job.id);

        let exec_id = run.execution_id.to_string();
        let workspace = self.config.job_workspace(&exec_id, &job.id);
        let temp_dir = self.config.job_temp_dir(&exec_id, &job.id);
        for dir in [&workspace, &temp_dir] {
            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                let error = format!("Failed to create {}: {}", dir.display(), e);
                error!("{}", error);
                self.fail_job(job, error, None, started_at, events);
                return;
            }
        }

        let mut context = self.build_context(job, run, &workspace);
        let deadline = job
            .timeout_secs
            .map(|secs| Instant::now() + Duration::from_secs(secs));

        for index in 0..job.steps.len() {
            if cancelled.load(Ordering::SeqCst) {
                self.cancel_job(job, "workflow cancelled", events);
                return;
            }

            let step_key = job.steps[index].key().to_string();
            let step_started = Utc::now();
            job.steps[index].state = StepState::Running {
                started_at: step_started,
            };
            events.emit(ExecutionEvent::StepStarted {
                job_id: job.id.clone(),
                step: step_key.clone(),
                index,
            });

            let result = self
                .execute_step(
                    &job.id,
                    &job.steps[index],
                    &context,
                    &temp_dir,
                    deadline,
                    events,
                    cancelled,
                )
                .await;

            let step = &mut job.steps[index];
            match result {
                ExecutionResult::Success {
                    output,
                    outputs,
                    env,
                } => {
                    step.state = StepState::Completed {
                        output,
                        started_at: step_started,
                        completed_at: Utc::now(),
                    };
                    if let Some(id) = &step.id {
                        context.set_step_result(id, "success", outputs.clone());
                    }
                    step.outputs = outputs;
                    context.extend_env(env);
                    events.emit(ExecutionEvent::StepCompleted {
                        job_id: job.id.clone(),
                        step: step_key,
                    });
                }
                ExecutionResult::Failed { error, output } => {
                    warn!("Step {} of job {} failed: {}", step_key, job.id, error);
                    step.state = StepState::Failed {
                        error: error.clone(),
                        output,
                        started_at: step_started,
                        failed_at: Utc::now(),
                    };
                    if let Some(id) = &step.id {
                        context.set_step_result(id, "failure", HashMap::new());
                    }
                    let continue_on_error = step.continue_on_error;
                    events.emit(ExecutionEvent::StepFailed {
                        job_id: job.id.clone(),
                        step: step_key.clone(),
                        error: error.clone(),
                        continue_on_error,
                    });

                    if !continue_on_error {
                        self.fail_job(job, error, Some(step_key), started_at, events);
                        return;
                    }
                }
                ExecutionResult::Cancelled => {
                    step.state = StepState::Cancelled;
                    self.cancel_job(job, "workflow cancelled", events);
                    return;
                }
            }
        }

        info!("Job {} completed successfully", job.id);
        job.state = JobState::Completed {
            started_at,
            completed_at: Utc::now(),
        };
    }

    fn build_context(&self, job: &Job, run: &RunContext, workspace: &Path) -> JobContext {
        let mut context = JobContext::new(&run.workflow_name, &job.id, &run.event, workspace);
        context.set_variable("github.run_id", run.execution_id.to_string());
        if let Some(repository) = &self.config.repository {
            context.set_variable("github.repository", repository.clone());
        }
        if let Some(runs_on) = &job.runs_on {
            context.set_variable("runner.label", runs_on.clone());
        }
        context.set_secrets(run.secrets.clone());

        // Each env layer may reference the layers below it
        context.layer_env(&run.workflow_env);
        context.layer_env(&job.env);

        context
    }

    /// Time a step may run: its own limit capped by what is left of the job's
    fn step_timeout(&self, step: &Step, deadline: Option<Instant>) -> Duration {
        let own = Duration::from_secs(step.timeout_secs.unwrap_or(self.config.default_timeout_secs));
        match deadline {
            Some(deadline) => own.min(deadline.saturating_duration_since(Instant::now())),
            None => own,
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute_step(
        &self,
        job_id: &str,
        step: &Step,
        context: &JobContext,
        temp_dir: &Path,
        deadline: Option<Instant>,
        events: &EventEmitter,
        cancelled: &AtomicBool,
    ) -> ExecutionResult {
        let step_timeout = self.step_timeout(step, deadline);
        if step_timeout.is_zero() {
            return ExecutionResult::Failed {
                error: "Job timeout exceeded".to_string(),
                output: String::new(),
            };
        }

        let vars = context.get_rendering_variables();
        let step_env = step.render_env(&vars);

        match &step.action {
            StepAction::Run { shell, .. } => {
                let command = step.render_command(&vars).unwrap_or_default();
                let shell = shell
                    .as_deref()
                    .map(Shell::parse)
                    .unwrap_or_else(|| self.config.default_shell.clone());
                self.run_command(
                    job_id, step, command, shell, step_env, context, temp_dir, step_timeout,
                    events, cancelled,
                )
                .await
            }
            StepAction::Uses(action) => {
                let inputs = action.render_inputs(&vars);
                let token = step_env
                    .get("GITHUB_TOKEN")
                    .or_else(|| context.env.get("GITHUB_TOKEN"))
                    .or_else(|| context.secrets.get("GITHUB_TOKEN"))
                    .filter(|t| !t.is_empty())
                    .cloned();
                let action_ctx = ActionContext {
                    workspace: &context.workspace,
                    source_dir: &self.config.source_dir,
                    publisher: self.publisher.as_ref(),
                    token: token.as_deref(),
                };

                let run = timeout(step_timeout, actions::run_action(action, &inputs, &action_ctx));
                let result = tokio::select! {
                    result = run => result,
                    _ = wait_for_cancel(cancelled) => return ExecutionResult::Cancelled,
                };

                match result {
                    Ok(Ok(outcome)) => {
                        let log = context.mask_secrets(&outcome.log);
                        events.emit(ExecutionEvent::StepOutput {
                            job_id: job_id.to_string(),
                            step: step.key().to_string(),
                            stream: crate::runner::OutputStream::Stdout,
                            line: log.clone(),
                        });
                        ExecutionResult::Success {
                            output: log,
                            outputs: outcome.outputs,
                            env: HashMap::new(),
                        }
                    }
                    Ok(Err(e)) => ExecutionResult::Failed {
                        error: context.mask_secrets(&e.to_string()),
                        output: String::new(),
                    },
                    Err(_) => ExecutionResult::Failed {
                        error: format!("Timeout after {} seconds", step_timeout.as_secs()),
                        output: String::new(),
                    },
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_command(
        &self,
        job_id: &str,
        step: &Step,
        command: String,
        shell: Shell,
        step_env: HashMap<String, String>,
        context: &JobContext,
        temp_dir: &Path,
        step_timeout: Duration,
        events: &EventEmitter,
        cancelled: &AtomicBool,
    ) -> ExecutionResult {
        let output_file = temp_dir.join(format!("output_{}", step.index));
        let env_file = temp_dir.join(format!("env_{}", step.index));
        for file in [&output_file, &env_file] {
            if let Err(e) = tokio::fs::write(file, b"").await {
                return ExecutionResult::Failed {
                    error: format!("Failed to create {}: {}", file.display(), e),
                    output: String::new(),
                };
            }
        }

        let mut env = context.process_env(&step_env);
        env.insert("GITHUB_OUTPUT".to_string(), output_file.display().to_string());
        env.insert("GITHUB_ENV".to_string(), env_file.display().to_string());
        env.insert("RUNNER_TEMP".to_string(), temp_dir.display().to_string());

        let working_dir = match &step.working_directory {
            Some(dir) => {
                let dir = crate::core::expression::render(dir, &context.get_rendering_variables());
                context.workspace.join(dir)
            }
            None => context.workspace.clone(),
        };

        let request = CommandRequest {
            command,
            shell,
            working_dir,
            env,
            timeout: step_timeout,
        };
        debug!(
            "Running step {} of job {}: {}",
            step.key(),
            job_id,
            context.mask_secrets(&request.command)
        );

        let forwarder = StepOutputForwarder {
            job_id,
            step: step.key(),
            context,
            events,
        };

        let result = tokio::select! {
            result = self.commands.execute(&request, Some(&forwarder)) => result,
            _ = wait_for_cancel(cancelled) => Err(RunnerError::Cancelled),
        };

        match result {
            Ok(output) => {
                let combined = context.mask_secrets(&output.combined);
                if !output.succeeded() {
                    return ExecutionResult::Failed {
                        error: format!("Process completed with exit code {}", output.exit_code),
                        output: combined,
                    };
                }
                ExecutionResult::Success {
                    output: combined,
                    outputs: read_key_value_file(&output_file).await,
                    env: read_key_value_file(&env_file).await,
                }
            }
            Err(RunnerError::Cancelled) => ExecutionResult::Cancelled,
            Err(e) => ExecutionResult::Failed {
                error: context.mask_secrets(&e.to_string()),
                output: String::new(),
            },
        }
    }

    fn fail_job(
        &self,
        job: &mut Job,
        error: String,
        failed_step: Option<String>,
        started_at: chrono::DateTime<Utc>,
        events: &EventEmitter,
    ) {
        self.skip_remaining(job, "a previous step failed", events);
        job.state = JobState::Failed {
            error,
            failed_step,
            started_at,
            failed_at: Utc::now(),
        };
    }

    fn cancel_job(&self, job: &mut Job, reason: &str, events: &EventEmitter) {
        info!("Job {} cancelled", job.id);
        for step in job.steps.iter_mut().filter(|s| !s.state.is_terminal()) {
            step.state = StepState::Cancelled;
        }
        events.emit(ExecutionEvent::JobCancelled {
            job_id: job.id.clone(),
        });
        job.state = JobState::Cancelled {
            reason: reason.to_string(),
        };
    }

    fn skip_remaining(&self, job: &mut Job, reason: &str, events: &EventEmitter) {
        for step in job.steps.iter().filter(|s| !s.state.is_terminal()) {
            events.emit(ExecutionEvent::StepSkipped {
                job_id: job.id.clone(),
                step: step.key().to_string(),
                reason: reason.to_string(),
            });
        }
        job.skip_remaining_steps(reason);
    }
}

async fn wait_for_cancel(cancelled: &AtomicBool) {
    while !cancelled.load(Ordering::SeqCst) {
        tokio::time::sleep(CANCEL_POLL_INTERVAL).await;
    }
}

/// Parse a `$GITHUB_OUTPUT` / `$GITHUB_ENV` file
///
/// Supports `key=value` lines and the multi-line form
/// `key<<DELIM` ... `DELIM`. A missing file yields no entries.
pub async fn read_key_value_file(path: &Path) -> HashMap<String, String> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => parse_key_value_lines(&contents),
        Err(_) => HashMap::new(),
    }
}

pub fn parse_key_value_lines(contents: &str) -> HashMap<String, String> {
    let mut values = HashMap::new();
    let mut lines = contents.lines();

    while let Some(line) = lines.next() {
        if line.trim().is_empty() {
            continue;
        }

        let heredoc = line
            .find("<<")
            .filter(|&at| line.find('=').map_or(true, |eq| at < eq));
        if let Some(at) = heredoc {
            let delimiter = &line[at + 2..];
            let mut value = Vec::new();
            for body in lines.by_ref() {
                if body == delimiter {
                    break;
                }
                value.push(body);
            }
            values.insert(line[..at].trim().to_string(), value.join("\n"));
            continue;
        }

        match line.split_once('=') {
            Some((key, value)) => {
                values.insert(key.trim().to_string(), value.to_string());
            }
            None => warn!("Ignoring malformed line in step file: {}", line),
        }
    }

    values
}
