//! Main execution engine - orchestrates the entire workflow run

use crate::{
    actions::ReleasePublisher,
    core::{ExecutionStatus, JobState, StepState, TriggerEvent, Workflow},
    execution::{JobExecutor, JobScheduler, RunContext, SchedulingStrategy},
    runner::{CommandExecutor, OutputStream, RunnerConfig},
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during workflow execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    WorkflowStarted {
        execution_id: Uuid,
        workflow_name: String,
        event: TriggerEvent,
    },
    JobStarted {
        job_id: String,
    },
    StepStarted {
        job_id: String,
        step: String,
        index: usize,
    },
    StepOutput {
        job_id: String,
        step: String,
        stream: OutputStream,
        line: String,
    },
    StepCompleted {
        job_id: String,
        step: String,
    },
    StepFailed {
        job_id: String,
        step: String,
        error: String,
        continue_on_error: bool,
    },
    StepSkipped {
        job_id: String,
        step: String,
        reason: String,
    },
    JobCompleted {
        job_id: String,
    },
    JobFailed {
        job_id: String,
        error: String,
    },
    JobSkipped {
        job_id: String,
        reason: String,
    },
    JobCancelled {
        job_id: String,
    },
    WorkflowCompleted {
        execution_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Shared list of event handlers
#[derive(Clone, Default)]
pub struct EventEmitter {
    handlers: Arc<Mutex<Vec<EventHandler>>>,
}

impl EventEmitter {
    pub fn add<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.push(Arc::new(handler));
        }
    }

    /// Emit an event to all handlers
    pub fn emit(&self, event: ExecutionEvent) {
        // Handlers run outside the lock so they may register others
        let handlers: Vec<EventHandler> = match self.handlers.lock() {
            Ok(handlers) => handlers.clone(),
            Err(_) => return,
        };
        for handler in handlers {
            handler(event.clone());
        }
    }
}

/// Error types for the engine itself; job failures are reported through
/// the workflow state instead
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("job task panicked: {0}")]
    JobPanicked(String),
}

/// Main workflow execution engine
pub struct ExecutionEngine<E> {
    scheduler: JobScheduler,
    executor: Arc<JobExecutor<E>>,
    events: EventEmitter,
    cancelled: Arc<AtomicBool>,
    force: bool,
}

impl<E: CommandExecutor + 'static> ExecutionEngine<E> {
    pub fn new(
        commands: E,
        publisher: Arc<dyn ReleasePublisher>,
        config: RunnerConfig,
        strategy: SchedulingStrategy,
    ) -> Self {
        Self {
            scheduler: JobScheduler::new(strategy),
            executor: Arc::new(JobExecutor::new(commands, publisher, config)),
            events: EventEmitter::default(),
            cancelled: Arc::new(AtomicBool::new(false)),
            force: false,
        }
    }

    /// Run even when the event does not match the workflow's `on:` filters
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.events.add(handler);
    }

    /// Flag that cancels the run when set
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Execute the workflow for `event`
    ///
    /// Returns the final status. Independent jobs run concurrently (subject
    /// to the scheduling strategy); a job whose needed jobs did not succeed
    /// is skipped.
    pub async fn execute(
        &self,
        workflow: &mut Workflow,
        event: &TriggerEvent,
        secrets: HashMap<String, String>,
    ) -> Result<ExecutionStatus, EngineError> {
        let execution_id = workflow.state.execution_id;

        if !self.force && !workflow.is_triggered_by(event) {
            info!(
                "Workflow {} is not triggered by {} on {}",
                workflow.name, event.kind, event.git_ref
            );
            workflow.state.finish(ExecutionStatus::NotTriggered);
            self.events.emit(ExecutionEvent::WorkflowCompleted {
                execution_id,
                status: ExecutionStatus::NotTriggered,
            });
            return Ok(ExecutionStatus::NotTriggered);
        }

        info!("Starting workflow execution: {} ({})", workflow.name, execution_id);
        self.events.emit(ExecutionEvent::WorkflowStarted {
            execution_id,
            workflow_name: workflow.name.clone(),
            event: event.clone(),
        });

        workflow.state.start(workflow.jobs.len());
        let run = Arc::new(RunContext {
            execution_id,
            workflow_name: workflow.name.clone(),
            workflow_env: workflow.env.clone(),
            event: event.clone(),
            secrets,
        });

        let mut running = JoinSet::new();

        loop {
            for (job_id, reason) in workflow.skip_blocked_jobs() {
                info!("Skipping job {}: {}", job_id, reason);
                self.events.emit(ExecutionEvent::JobSkipped { job_id, reason });
            }

            if self.cancelled.load(Ordering::SeqCst) {
                self.cancel_pending_jobs(workflow);
            } else {
                for job_id in self.scheduler.next_jobs(workflow) {
                    self.spawn_job(workflow, &job_id, &run, &mut running);
                }
            }
            workflow.update_counts();

            let Some(joined) = running.join_next().await else {
                break;
            };

            match joined {
                Ok(job) => {
                    match &job.state {
                        JobState::Completed { .. } => {
                            info!("Job {} completed", job.id);
                            self.events.emit(ExecutionEvent::JobCompleted {
                                job_id: job.id.clone(),
                            });
                        }
                        JobState::Failed { error, .. } => {
                            warn!("Job {} failed: {}", job.id, error);
                            self.events.emit(ExecutionEvent::JobFailed {
                                job_id: job.id.clone(),
                                error: error.clone(),
                            });
                        }
                        _ => {}
                    }
                    let job_id = job.id.clone();
                    workflow.jobs.insert(job_id, job);
                }
                Err(e) => {
                    error!("Job task failed: {}", e);
                    running.abort_all();
                    self.cancel_running_jobs(workflow, &format!("job task failed: {}", e));
                    self.cancel_pending_jobs(workflow);
                    workflow.update_counts();
                    workflow.state.finish(ExecutionStatus::Failed);
                    return Err(EngineError::JobPanicked(e.to_string()));
                }
            }
        }

        // Jobs left pending here can never become ready
        for job in workflow.jobs.values_mut().filter(|j| !j.state.is_terminal()) {
            let reason = "needed jobs never completed".to_string();
            job.skip_remaining_steps(&reason);
            job.state = JobState::Skipped { reason };
        }

        workflow.update_counts();
        let status = workflow.final_status();
        workflow.state.finish(status);

        if self.executor.config().cleanup {
            let run_dir = self
                .executor
                .config()
                .workspace_root
                .join(execution_id.to_string());
            if let Err(e) = tokio::fs::remove_dir_all(&run_dir).await {
                warn!("Failed to clean up {}: {}", run_dir.display(), e);
            }
        }

        info!("Workflow execution finished: {} - {:?}", workflow.name, status);
        self.events.emit(ExecutionEvent::WorkflowCompleted {
            execution_id,
            status,
        });

        Ok(status)
    }

    fn spawn_job(
        &self,
        workflow: &mut Workflow,
        job_id: &str,
        run: &Arc<RunContext>,
        running: &mut JoinSet<crate::core::Job>,
    ) {
        let Some(job) = workflow.job_mut(job_id) else {
            return;
        };
        job.state = JobState::Running {
            started_at: chrono::Utc::now(),
        };
        let mut job = job.clone();

        self.events.emit(ExecutionEvent::JobStarted {
            job_id: job.id.clone(),
        });

        let executor = self.executor.clone();
        let run = run.clone();
        let events = self.events.clone();
        let cancelled = self.cancelled.clone();
        running.spawn(async move {
            executor.execute(&mut job, &run, &events, &cancelled).await;
            job
        });
    }

    /// Jobs whose tasks were aborted; their own copies are lost with the task
    fn cancel_running_jobs(&self, workflow: &mut Workflow, reason: &str) {
        for job in workflow
            .jobs
            .values_mut()
            .filter(|j| matches!(j.state, JobState::Running { .. }))
        {
            for step in job.steps.iter_mut().filter(|s| !s.state.is_terminal()) {
                step.state = StepState::Cancelled;
            }
            job.state = JobState::Cancelled {
                reason: reason.to_string(),
            };
            self.events.emit(ExecutionEvent::JobCancelled {
                job_id: job.id.clone(),
            });
        }
    }

    fn cancel_pending_jobs(&self, workflow: &mut Workflow) {
        for job in workflow
            .jobs
            .values_mut()
            .filter(|j| matches!(j.state, JobState::Pending))
        {
            for step in &mut job.steps {
                step.state = StepState::Cancelled;
            }
            job.state = JobState::Cancelled {
                reason: "workflow cancelled".to_string(),
            };
            self.events.emit(ExecutionEvent::JobCancelled {
                job_id: job.id.clone(),
            });
        }
    }
}
