//! Jobs, `needs` and scheduling strategies

use crate::helpers::*;
use biscuit_ci::core::ExecutionStatus;
use biscuit_ci::execution::{ExecutionEvent, SchedulingStrategy};
use std::time::Duration;

const CHAIN: &str = r#"
name: Chain
on: push
jobs:
  lint:
    steps:
      - run: cargo clippy
  build:
    needs: lint
    steps:
      - run: cargo build
  package:
    needs: [build]
    steps:
      - run: cargo package
  docs:
    steps:
      - run: cargo doc
"#;

#[tokio::test]
async fn test_needs_run_in_order() {
    let env = TestEnv::new();
    let mut workflow = workflow_from_yaml(CHAIN);
    let executor = MockExecutor::new(vec![]);

    let result = run_workflow_with_mock(&mut workflow, executor.clone(), &env).await;

    assert_workflow_completed(&result);
    let commands = executor.commands();
    let position = |cmd: &str| commands.iter().position(|c| c == cmd).unwrap();
    assert!(position("cargo clippy") < position("cargo build"));
    assert!(position("cargo build") < position("cargo package"));
}

#[tokio::test]
async fn test_failed_need_skips_dependents_transitively() {
    let env = TestEnv::new();
    let mut workflow = workflow_from_yaml(CHAIN);
    let executor = MockExecutor::new(vec![("cargo clippy", MockResponse::fail(1, "warning"))]);

    let result = run_workflow_with_mock(&mut workflow, executor.clone(), &env).await;

    assert_workflow_failed(&result);
    assert_job_failed(&result, "lint", "exit code 1");
    assert_job_skipped(&result, "build");
    assert_job_skipped(&result, "package");
    assert_job_succeeded(&result, "docs");
    assert_step_skipped(&result, "package", "Run cargo package");

    let commands = executor.commands();
    assert!(!commands.contains(&"cargo build".to_string()));
    assert!(!commands.contains(&"cargo package".to_string()));

    let skipped: Vec<&str> = result
        .events
        .iter()
        .filter_map(|e| match e {
            ExecutionEvent::JobSkipped { job_id, .. } => Some(job_id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(skipped, vec!["build", "package"]);
}

#[tokio::test]
async fn test_sequential_strategy_runs_one_job_at_a_time() {
    let env = TestEnv::new();
    let yaml = r#"
name: Fan out
on: push
jobs:
  a:
    steps:
      - run: job-a
  b:
    steps:
      - run: job-b
  c:
    steps:
      - run: job-c
"#;
    let mut workflow = workflow_from_yaml(yaml);
    let executor = MockExecutor::new(vec![
        ("job-a", MockResponse::ok("a").with_delay(Duration::from_millis(50))),
        ("job-b", MockResponse::ok("b").with_delay(Duration::from_millis(50))),
    ]);

    let options = RunOptions {
        strategy: SchedulingStrategy::Sequential,
        ..RunOptions::default()
    };
    let result = run_workflow_with(&mut workflow, executor, &env, options).await;
    assert_workflow_completed(&result);

    // With one job at a time every JobStarted follows the previous job's end
    let mut running = 0;
    for event in &result.events {
        match event {
            ExecutionEvent::JobStarted { .. } => {
                running += 1;
                assert_eq!(running, 1, "more than one job running: {:?}", result.events);
            }
            ExecutionEvent::JobCompleted { .. } | ExecutionEvent::JobFailed { .. } => running -= 1,
            _ => {}
        }
    }
}

#[tokio::test]
async fn test_parallel_jobs_overlap() {
    let env = TestEnv::new();
    let yaml = r#"
name: Parallel
on: push
jobs:
  slow:
    steps:
      - run: sleep-a
  fast:
    steps:
      - run: sleep-b
"#;
    let mut workflow = workflow_from_yaml(yaml);
    let executor = MockExecutor::new(vec![
        ("sleep-a", MockResponse::ok("").with_delay(Duration::from_millis(300))),
        ("sleep-b", MockResponse::ok("").with_delay(Duration::from_millis(300))),
    ]);

    let result = run_workflow_with_mock(&mut workflow, executor, &env).await;
    assert_workflow_completed(&result);

    let first_completion = result
        .events
        .iter()
        .position(|e| matches!(e, ExecutionEvent::JobCompleted { .. }))
        .unwrap();
    let starts_before = result.events[..first_completion]
        .iter()
        .filter(|e| matches!(e, ExecutionEvent::JobStarted { .. }))
        .count();
    assert_eq!(starts_before, 2);
}

#[tokio::test]
async fn test_selected_job_pulls_in_its_needs() {
    let env = TestEnv::new();
    let mut workflow = workflow_from_yaml(CHAIN);
    workflow.select_jobs(&["build".to_string()]).unwrap();
    let executor = MockExecutor::new(vec![]);

    let result = run_workflow_with_mock(&mut workflow, executor.clone(), &env).await;

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(executor.commands(), vec!["cargo clippy", "cargo build"]);
    assert_job_skipped(&result, "package");
    assert_job_skipped(&result, "docs");
}

#[tokio::test]
async fn test_job_env_overrides_workflow_env() {
    let env = TestEnv::new();
    let yaml = r#"
name: Env
on: push
env:
  PROFILE: debug
  CARGO_TERM_COLOR: always
jobs:
  release:
    env:
      PROFILE: release
      TARGET_DIR: target/${{ env.PROFILE }}
    steps:
      - run: echo release
        env:
          STEP_ONLY: "yes"
      - run: echo second
"#;
    let mut workflow = workflow_from_yaml(yaml);
    let executor = MockExecutor::new(vec![]);

    let result = run_workflow_with_mock(&mut workflow, executor.clone(), &env).await;
    assert_workflow_completed(&result);

    let first = executor.request_for("echo release").unwrap();
    assert_eq!(first.env["PROFILE"], "release");
    assert_eq!(first.env["TARGET_DIR"], "target/debug");
    assert_eq!(first.env["CARGO_TERM_COLOR"], "always");
    assert_eq!(first.env["STEP_ONLY"], "yes");

    let second = executor.request_for("echo second").unwrap();
    assert!(!second.env.contains_key("STEP_ONLY"));
}
