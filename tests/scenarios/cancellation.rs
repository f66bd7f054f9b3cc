//! Interrupts and timeouts

use crate::helpers::*;
use biscuit_ci::core::{ExecutionStatus, JobState, StepState};
use biscuit_ci::execution::ExecutionEvent;
use std::time::Duration;

const LONG_BUILD: &str = r#"
name: Long build
on: push
jobs:
  build:
    steps:
      - run: cargo build --release
      - run: cargo test --release
  package:
    needs: build
    steps:
      - run: cargo package
"#;

#[tokio::test]
async fn test_cancel_stops_running_job() {
    let env = TestEnv::new();
    let mut workflow = workflow_from_yaml(LONG_BUILD);
    let executor = MockExecutor::new(vec![(
        "cargo build",
        MockResponse::ok("").with_delay(Duration::from_secs(10)),
    )]);

    let options = RunOptions {
        cancel_after: Some(Duration::from_millis(200)),
        ..RunOptions::default()
    };
    let started = std::time::Instant::now();
    let result = run_workflow_with(&mut workflow, executor.clone(), &env, options).await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(result.status, ExecutionStatus::Cancelled);
    assert!(matches!(result.job("build").state, JobState::Cancelled { .. }));
    assert!(matches!(
        result.step("build", "Run cargo build --release").state,
        StepState::Cancelled
    ));
    assert!(!executor.commands().iter().any(|c| c.contains("cargo test")));
    assert!(!matches!(result.job("package").state, JobState::Completed { .. }));
}

#[tokio::test]
async fn test_step_timeout_fails_job() {
    let env = TestEnv::new();
    let mut workflow = workflow_from_yaml(LONG_BUILD);
    let executor = MockExecutor::new(vec![(
        "cargo build",
        MockResponse::ok("").with_delay(Duration::from_secs(10)),
    )]);

    let options = RunOptions {
        step_timeout_secs: Some(1),
        ..RunOptions::default()
    };
    let result = run_workflow_with(&mut workflow, executor, &env, options).await;

    assert_workflow_failed(&result);
    assert_job_failed(&result, "build", "Timeout after 1 seconds");
    assert_step_skipped(&result, "build", "Run cargo test --release");
    assert_job_skipped(&result, "package");
}

const JOB_DEADLINE: &str = r#"
name: Job deadline
on: push
jobs:
  build:
    timeout-minutes: 1
    steps:
      - run: cargo build --release
      - run: cargo test --release
      - run: cargo doc
  package:
    needs: build
    steps:
      - run: cargo package
"#;

#[tokio::test(start_paused = true)]
async fn test_job_timeout_caps_step_timeout() {
    let env = TestEnv::new();
    let mut workflow = workflow_from_yaml(JOB_DEADLINE);
    let executor = MockExecutor::new(vec![
        (
            "cargo build",
            MockResponse::ok("").with_delay(Duration::from_secs(40)),
        ),
        (
            "cargo test",
            MockResponse::ok("").with_delay(Duration::from_secs(300)),
        ),
    ]);

    let options = RunOptions {
        run_timeout: Duration::from_secs(600),
        ..RunOptions::default()
    };
    let result = run_workflow_with(&mut workflow, executor.clone(), &env, options).await;

    assert_workflow_failed(&result);
    let build_timeout = executor.request_for("cargo build").unwrap().timeout;
    assert!(
        build_timeout <= Duration::from_secs(60) && build_timeout > Duration::from_secs(59),
        "{:?}",
        build_timeout
    );
    let test_timeout = executor.request_for("cargo test").unwrap().timeout;
    assert!(
        test_timeout <= Duration::from_secs(20) && test_timeout > Duration::from_secs(19),
        "{:?}",
        test_timeout
    );

    assert_job_failed(&result, "build", "Timeout after");
    match &result.job("build").state {
        JobState::Failed { failed_step, .. } => {
            assert_eq!(failed_step.as_deref(), Some("Run cargo test --release"))
        }
        other => panic!("Expected failed job, got {:?}", other),
    }
    assert!(result.events.iter().any(|e| matches!(
        e,
        ExecutionEvent::StepFailed { step, .. } if step == "Run cargo test --release"
    )));
    assert_step_skipped(&result, "build", "Run cargo doc");
    assert_job_skipped(&result, "package");
    assert!(!executor.commands().iter().any(|c| c.contains("cargo doc")));
}
