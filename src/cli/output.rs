//! CLI output formatting

use crate::{
    core::{ExecutionStatus, Job, JobState, StepState},
    execution::ExecutionEvent,
    persistence::ExecutionSummary,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub use console::style;

pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");

/// Progress bar counting finished jobs
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} jobs {msg}")
    {
        progress.set_style(style.progress_chars("#>-"));
    }
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

pub fn format_step_state(state: &StepState) -> String {
    match state {
        StepState::Pending => style("PENDING").dim().to_string(),
        StepState::Running { .. } => style("RUNNING").yellow().to_string(),
        StepState::Completed { .. } => style("SUCCESS").green().to_string(),
        StepState::Failed { .. } => style("FAILURE").red().to_string(),
        StepState::Skipped { .. } => style("SKIPPED").dim().to_string(),
        StepState::Cancelled => style("CANCELLED").yellow().to_string(),
    }
}

pub fn format_job_state(state: &JobState) -> String {
    match state {
        JobState::Pending => style("PENDING").dim().to_string(),
        JobState::Running { .. } => style("RUNNING").yellow().to_string(),
        JobState::Completed { .. } => style("SUCCESS").green().to_string(),
        JobState::Failed { .. } => style("FAILURE").red().to_string(),
        JobState::Skipped { .. } => style("SKIPPED").dim().to_string(),
        JobState::Cancelled { .. } => style("CANCELLED").yellow().to_string(),
    }
}

/// Final state of a job followed by one line per step
pub fn format_job_report(job: &Job) -> Vec<String> {
    let mut lines = vec![format!(
        "  {} {}",
        format_job_state(&job.state),
        style(&job.name).bold()
    )];
    for step in &job.steps {
        let detail = match &step.state {
            StepState::Failed { error, .. } => format!(" ({})", style(error).red()),
            _ => String::new(),
        };
        lines.push(format!(
            "      {} {}{}",
            format_step_state(&step.state),
            step.name,
            detail
        ));
    }
    lines
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Completed => style("COMPLETED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
        ExecutionStatus::Cancelled => style("CANCELLED").yellow().to_string(),
        ExecutionStatus::NotTriggered => style("NOT TRIGGERED").dim().to_string(),
    }
}

fn short_id(id: &uuid::Uuid) -> String {
    id.to_string()[..8].to_string()
}

/// One-line summary of a stored run
pub fn format_execution_summary(summary: &ExecutionSummary) -> String {
    let status_icon = match summary.status {
        ExecutionStatus::Completed => CHECK,
        ExecutionStatus::Failed => CROSS,
        ExecutionStatus::Running => SPINNER,
        ExecutionStatus::Cancelled => WARN,
        _ => INFO,
    };

    format!(
        "{} {} - {} - {} on {} - {} ({}/{} jobs, {} failed)",
        status_icon,
        style(short_id(&summary.execution_id)).dim(),
        style(&summary.workflow_name).bold(),
        summary.event,
        summary.git_ref,
        format_status(summary.status),
        summary.completed_jobs,
        summary.total_jobs,
        summary.failed_jobs,
    )
}

/// Format an execution event for display
///
/// Returns `None` for events that are not shown as status lines
/// (step output is printed by the terminal streamer).
pub fn format_execution_event(event: &ExecutionEvent) -> Option<String> {
    let line = match event {
        ExecutionEvent::WorkflowStarted {
            execution_id,
            workflow_name,
            event,
        } => format!(
            "{} Starting workflow {} for {} on {} ({})",
            ROCKET,
            style(workflow_name).bold(),
            event.kind,
            event.git_ref,
            style(short_id(execution_id)).dim()
        ),
        ExecutionEvent::JobStarted { job_id } => {
            format!("{} Job {}", SPINNER, style(job_id).cyan().bold())
        }
        ExecutionEvent::StepStarted { job_id, step, .. } => {
            format!("{} [{}] {}", SPINNER, style(job_id).dim(), style(step).cyan())
        }
        ExecutionEvent::StepOutput { .. } => return None,
        ExecutionEvent::StepCompleted { job_id, step } => {
            format!("{} [{}] {}", CHECK, style(job_id).dim(), style(step).green())
        }
        ExecutionEvent::StepFailed {
            job_id,
            step,
            error,
            continue_on_error,
        } => {
            let suffix = if *continue_on_error {
                format!(" {}", style("(continue-on-error)").yellow())
            } else {
                String::new()
            };
            format!(
                "{} [{}] {}: {}{}",
                CROSS,
                style(job_id).dim(),
                style(step).red(),
                style(error).dim(),
                suffix
            )
        }
        ExecutionEvent::StepSkipped { job_id, step, reason } => format!(
            "{} [{}] {} ({})",
            SKIP,
            style(job_id).dim(),
            style(step).dim(),
            reason
        ),
        ExecutionEvent::JobCompleted { job_id } => {
            format!("{} Job {} succeeded", CHECK, style(job_id).green().bold())
        }
        ExecutionEvent::JobFailed { job_id, error } => format!(
            "{} Job {} failed: {}",
            CROSS,
            style(job_id).red().bold(),
            style(error).dim()
        ),
        ExecutionEvent::JobSkipped { job_id, reason } => {
            format!("{} Job {} skipped: {}", SKIP, style(job_id).dim(), reason)
        }
        ExecutionEvent::JobCancelled { job_id } => {
            format!("{} Job {} cancelled", WARN, style(job_id).yellow())
        }
        ExecutionEvent::WorkflowCompleted {
            execution_id,
            status,
        } => {
            let status_str = match status {
                ExecutionStatus::Completed => format!("{} completed", style("successfully").green()),
                ExecutionStatus::Failed => style("failed").red().to_string(),
                ExecutionStatus::Cancelled => style("was cancelled").yellow().to_string(),
                ExecutionStatus::NotTriggered => "was not triggered".to_string(),
                other => format!("{:?}", other),
            };
            format!(
                "{} Workflow ({}) {}",
                INFO,
                style(short_id(execution_id)).dim(),
                status_str
            )
        }
    };
    Some(line)
}

/// Format step output with truncation
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.to_string()
    } else {
        let truncated = lines[..max_lines].join("\n");
        format!(
            "{}\n{}... ({} more lines)",
            truncated,
            style("[truncated]").dim(),
            lines.len() - max_lines
        )
    }
}

/// Human-readable duration: `42s`, `3m 05s`, `1h 02m`
pub fn format_duration(duration: chrono::Duration) -> String {
    let secs = duration.num_seconds().max(0);
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
    }
}
