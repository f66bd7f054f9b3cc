use anyhow::{Context, Result};
use biscuit_ci::actions::{
    DryRunPublisher, GitHubReleasePublisher, LocalReleasePublisher, ReleasePublisher,
};
use biscuit_ci::cli::commands::{
    HistoryCommand, ListCommand, PlanCommand, RunCommand, ValidateCommand,
};
use biscuit_ci::cli::output::*;
use biscuit_ci::cli::terminal_output::TerminalOutput;
use biscuit_ci::cli::{Cli, Command};
use biscuit_ci::core::config::WorkflowConfig;
use biscuit_ci::core::{ExecutionStatus, JobContext, StepAction, TriggerEvent, Workflow};
use biscuit_ci::execution::{ExecutionEngine, ExecutionEvent};
use biscuit_ci::persistence::{create_summary, ExecutionSummary, PersistenceBackend};
use biscuit_ci::runner::{CommandExecutor, DryRunExecutor, RunnerConfig, ShellExecutor};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    match &cli.command {
        Command::Run(cmd) => run_workflow(cmd, cli.stream).await?,
        Command::Validate(cmd) => validate_workflow(cmd)?,
        Command::Plan(cmd) => plan_workflow(cmd)?,
        Command::List(cmd) => list_workflows(cmd).await?,
        Command::History(cmd) => show_history(cmd, cli.verbose).await?,
    }

    Ok(())
}

async fn open_store() -> Result<Arc<dyn PersistenceBackend>> {
    #[cfg(feature = "sqlite")]
    {
        let store = biscuit_ci::persistence::SqliteExecutionStore::with_default_path().await?;
        Ok(Arc::new(store))
    }

    #[cfg(not(feature = "sqlite"))]
    {
        warn!("Built without the sqlite feature; history is not kept between runs");
        Ok(Arc::new(biscuit_ci::persistence::InMemoryPersistence::new()))
    }
}

fn build_publisher(
    cmd: &RunCommand,
    config: &RunnerConfig,
) -> Result<Arc<dyn ReleasePublisher>> {
    if cmd.dry_run {
        return Ok(Arc::new(DryRunPublisher::new()));
    }

    if let Some(repo) = &cmd.github_repo {
        let publisher = GitHubReleasePublisher::new(repo.clone())
            .context("Failed to create GitHub client")?;
        return Ok(Arc::new(publisher));
    }

    let root = cmd
        .release_dir
        .clone()
        .unwrap_or_else(|| config.workspace_root.join("releases"));
    println!(
        "{} Releases are published to {}",
        INFO,
        style(root.display()).dim()
    );
    Ok(Arc::new(LocalReleasePublisher::new(root)))
}

async fn run_workflow(cmd: &RunCommand, stream: bool) -> Result<()> {
    let config = WorkflowConfig::from_file(&cmd.file).context("Failed to load workflow")?;

    println!("{} Loaded workflow: {}", INFO, style(&config.name).bold());

    let mut workflow = config.to_workflow()?;
    for (key, value) in &cmd.env {
        workflow.env.insert(key.clone(), value.clone());
        println!(
            "{} Env override: {} = {}",
            INFO,
            style(key).cyan(),
            style(value).dim()
        );
    }
    workflow.select_jobs(&cmd.job)?;

    let mut secrets: HashMap<String, String> = cmd.secret.iter().cloned().collect();
    if let Some(token) = &cmd.github_token {
        secrets
            .entry("GITHUB_TOKEN".to_string())
            .or_insert_with(|| token.clone());
    }

    let mut runner_config = RunnerConfig::new()
        .with_source_dir(&cmd.source)
        .with_cleanup(!cmd.keep_workspace);
    if let Some(workspace) = &cmd.workspace {
        runner_config = runner_config.with_workspace_root(workspace);
    }
    if let Some(repo) = &cmd.github_repo {
        runner_config = runner_config.with_repository(repo.clone());
    }

    let store: Option<Arc<dyn PersistenceBackend>> = if cmd.no_history {
        None
    } else {
        Some(open_store().await?)
    };

    let publisher = build_publisher(cmd, &runner_config)?;
    let event = cmd.trigger.to_event();

    let status = if cmd.dry_run {
        let engine = ExecutionEngine::new(DryRunExecutor::new(), publisher, runner_config, cmd.strategy);
        execute(engine, &mut workflow, &event, secrets, stream, cmd.force).await?
    } else {
        let engine = ExecutionEngine::new(ShellExecutor::new(), publisher, runner_config, cmd.strategy);
        execute(engine, &mut workflow, &event, secrets, stream, cmd.force).await?
    };

    if let Some(store) = store {
        let summary = create_summary(&workflow, &event);
        store.save_execution(&summary).await?;
        println!(
            "\n{} Execution saved to history (ID: {})",
            INFO,
            style(&summary.execution_id.to_string()[..8]).dim()
        );
    }

    println!();
    for id in workflow.execution_order() {
        if let Some(job) = workflow.job(id) {
            for line in format_job_report(job) {
                println!("{}", line);
            }
        }
    }

    match status {
        ExecutionStatus::Completed => {
            println!(
                "\n{} {} completed {}",
                CHECK,
                style(&workflow.name).bold(),
                style("successfully").green()
            );
        }
        ExecutionStatus::NotTriggered => {
            println!(
                "\n{} {} is not triggered by {} on {} (use --force to run anyway)",
                INFO,
                style(&workflow.name).bold(),
                event.kind,
                event.git_ref
            );
        }
        other => {
            println!(
                "\n{} {} {}",
                CROSS,
                style(&workflow.name).bold(),
                format_status(other)
            );
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn execute<E: CommandExecutor + 'static>(
    engine: ExecutionEngine<E>,
    workflow: &mut Workflow,
    event: &TriggerEvent,
    secrets: HashMap<String, String>,
    stream: bool,
    force: bool,
) -> Result<ExecutionStatus> {
    let engine = engine.with_force(force);

    let progress = create_progress_bar(workflow.jobs.len());
    let bar = progress.clone();
    let terminal = TerminalOutput::new();
    engine.add_event_handler(move |event| {
        match &event {
            ExecutionEvent::JobCompleted { .. }
            | ExecutionEvent::JobFailed { .. }
            | ExecutionEvent::JobSkipped { .. }
            | ExecutionEvent::JobCancelled { .. } => bar.inc(1),
            _ => {}
        }

        if stream {
            bar.suspend(|| terminal.on_event(&event));
        }
        if let Some(line) = format_execution_event(&event) {
            bar.println(line);
        }
    });

    let cancel = engine.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let result = engine.execute(workflow, event, secrets).await;
    progress.finish_and_clear();

    result.map_err(|e| {
        error!("{}", e);
        anyhow::anyhow!(e)
    })
}

fn validate_workflow(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating workflow...", INFO);

    let result = WorkflowConfig::from_file(&cmd.file).and_then(|config| {
        config.to_workflow()?;
        Ok(config)
    });

    match result {
        Ok(config) => {
            println!("{} Workflow is valid!", CHECK);
            println!("  Name: {}", style(&config.name).bold());
            println!("  Jobs: {}", style(config.jobs.len()).cyan());
            println!(
                "  Steps: {}",
                style(config.jobs.values().map(|j| j.steps.len()).sum::<usize>()).cyan()
            );
            println!("  Env: {}", style(config.env.len()).cyan());

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

fn plan_workflow(cmd: &PlanCommand) -> Result<()> {
    let config = WorkflowConfig::from_file(&cmd.file).context("Failed to load workflow")?;
    let workflow = config.to_workflow()?;
    let event = cmd.trigger.to_event();

    if !workflow.is_triggered_by(&event) {
        println!(
            "{} {} is not triggered by {} on {}",
            INFO,
            style(&workflow.name).bold(),
            event.kind,
            event.git_ref
        );
        return Ok(());
    }

    println!(
        "{} {} runs for {} on {}:",
        ROCKET,
        style(&workflow.name).bold(),
        event.kind,
        event.git_ref
    );

    for id in workflow.execution_order() {
        let Some(job) = workflow.job(id) else {
            continue;
        };

        let mut header = format!("\n  {}", style(&job.id).cyan().bold());
        if let Some(runs_on) = &job.runs_on {
            header.push_str(&format!(" ({})", runs_on));
        }
        if !job.needs.is_empty() {
            header.push_str(&format!(" needs {}", job.needs.join(", ")));
        }
        println!("{}", header);

        let mut context = JobContext::new(&workflow.name, &job.id, &event, Path::new("$GITHUB_WORKSPACE"));
        context.layer_env(&workflow.env);
        context.layer_env(&job.env);
        let vars = context.get_rendering_variables();

        for step in &job.steps {
            println!("    {}. {}", step.index + 1, style(&step.name).bold());
            match &step.action {
                StepAction::Run { .. } => {
                    let command = step.render_command(&vars).unwrap_or_default();
                    for line in command.lines() {
                        println!("       $ {}", style(line).dim());
                    }
                }
                StepAction::Uses(action) => {
                    println!("       uses {}", style(&action.reference).dim());
                    for (key, value) in action.render_inputs(&vars) {
                        println!("       {}: {}", key, style(value).dim());
                    }
                }
            }
        }
    }

    Ok(())
}

async fn list_workflows(cmd: &ListCommand) -> Result<()> {
    let store = open_store().await?;
    let workflows = store.list_workflows().await?;

    if cmd.json {
        let mut json_data = Vec::new();
        for name in &workflows {
            let executions = store.list_executions(name).await?;
            json_data.push(serde_json::json!({
                "name": name,
                "execution_count": executions.len()
            }));
        }
        let data = serde_json::json!({ "workflows": json_data });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if workflows.is_empty() {
        println!("{} No workflows found in history", INFO);
        return Ok(());
    }

    println!("{} Workflows in history:", INFO);

    for name in &workflows {
        if cmd.with_counts {
            let executions = store.list_executions(name).await?;
            let count = |status| executions.iter().filter(|e| e.status == status).count();
            println!(
                "  {} ({} runs: {} succeeded, {} failed)",
                style(name).bold(),
                style(executions.len()).cyan(),
                style(count(ExecutionStatus::Completed)).green(),
                style(count(ExecutionStatus::Failed)).red()
            );
        } else {
            println!("  {}", style(name).bold());
        }
    }

    Ok(())
}

async fn show_history(cmd: &HistoryCommand, verbose: bool) -> Result<()> {
    let store = open_store().await?;

    if let Some(exec_id_str) = &cmd.execution_id {
        let exec_id = uuid::Uuid::parse_str(exec_id_str).context("Invalid execution ID format")?;

        match store.load_execution(exec_id).await? {
            Some(summary) if cmd.json => println!("{}", serde_json::to_string_pretty(&summary)?),
            Some(summary) => print_execution_details(&summary, verbose),
            None => println!("{} Execution not found", WARN),
        }
        return Ok(());
    }

    let mut executions = match &cmd.workflow {
        Some(name) => store.list_executions(name).await?,
        None => {
            let mut all = Vec::new();
            for name in store.list_workflows().await? {
                all.extend(store.list_executions(&name).await?);
            }
            all.sort_by(|a, b| b.started_at.cmp(&a.started_at));
            all
        }
    };
    executions.truncate(cmd.limit);

    if cmd.json {
        let data = serde_json::json!({ "executions": executions });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if executions.is_empty() {
        println!("{} No executions found", INFO);
        return Ok(());
    }

    println!("{} Execution history (showing latest {}):", INFO, executions.len());
    for summary in &executions {
        println!("  {}", format_execution_summary(summary));
        if verbose {
            print_job_results(summary, "      ");
        }
    }

    Ok(())
}

fn print_execution_details(summary: &ExecutionSummary, verbose: bool) {
    println!("{} Execution Details", INFO);
    println!("  ID: {}", style(summary.execution_id).cyan());
    println!("  Workflow: {}", style(&summary.workflow_name).bold());
    println!("  Event: {} on {}", summary.event, summary.git_ref);
    println!("  Status: {}", format_status(summary.status));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        println!(
            "  Duration: {}",
            style(format_duration(completed.signed_duration_since(summary.started_at))).dim()
        );
    }
    println!(
        "  Progress: {} ({}/{} jobs, {} failed)",
        style(format!("{:.0}%", summary.progress * 100.0)).cyan(),
        summary.completed_jobs,
        summary.total_jobs,
        summary.failed_jobs
    );

    if verbose || !summary.jobs.is_empty() {
        println!("\n  {}", style("Jobs:").bold());
        print_job_results(summary, "    ");
    }
}

fn print_job_results(summary: &ExecutionSummary, indent: &str) {
    for job in &summary.jobs {
        let icon = match job.result.as_str() {
            "success" => CHECK,
            "failure" => CROSS,
            "cancelled" => WARN,
            _ => SKIP,
        };
        match &job.error {
            Some(error) => println!("{}{}{} ({})", indent, icon, job.job_id, style(error).dim()),
            None => println!("{}{}{}", indent, icon, job.job_id),
        }
    }
}
