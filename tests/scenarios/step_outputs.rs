//! Step outputs, `$GITHUB_ENV`, continue-on-error and secret masking

use crate::helpers::*;
use biscuit_ci::core::StepState;
use biscuit_ci::execution::ExecutionEvent;
use std::collections::HashMap;

#[tokio::test]
async fn test_step_outputs_feed_later_steps() {
    let env = TestEnv::new();
    let yaml = r#"
name: Outputs
on: push
jobs:
  version:
    steps:
      - id: meta
        run: ./detect-version
      - name: Tag
        run: git tag v${{ steps.meta.outputs.version }}
        env:
          PREVIOUS: ${{ steps.meta.outcome }}
"#;
    let mut workflow = workflow_from_yaml(yaml);
    let executor = MockExecutor::new(vec![(
        "detect-version",
        MockResponse::ok("detected").with_output("version", "2.1.0"),
    )]);

    let result = run_workflow_with_mock(&mut workflow, executor.clone(), &env).await;

    assert_workflow_completed(&result);
    assert_eq!(result.step("version", "meta").outputs["version"], "2.1.0");
    let tag = executor.request_for("git tag").unwrap();
    assert_eq!(tag.command, "git tag v2.1.0");
    assert_eq!(tag.env["PREVIOUS"], "success");
}

#[tokio::test]
async fn test_github_env_applies_to_later_steps_only() {
    let env = TestEnv::new();
    let yaml = r#"
name: Env file
on: push
jobs:
  build:
    steps:
      - run: ./configure
      - run: ./make
"#;
    let mut workflow = workflow_from_yaml(yaml);
    let executor = MockExecutor::new(vec![(
        "configure",
        MockResponse::ok("").with_env("RUSTFLAGS", "-Dwarnings"),
    )]);

    let result = run_workflow_with_mock(&mut workflow, executor.clone(), &env).await;

    assert_workflow_completed(&result);
    let configure = executor.request_for("configure").unwrap();
    assert!(!configure.env.contains_key("RUSTFLAGS"));
    let make = executor.request_for("make").unwrap();
    assert_eq!(make.env["RUSTFLAGS"], "-Dwarnings");
    assert_ne!(configure.env["GITHUB_OUTPUT"], make.env["GITHUB_OUTPUT"]);
}

#[tokio::test]
async fn test_continue_on_error_keeps_job_going() {
    let env = TestEnv::new();
    let yaml = r#"
name: Optional
on: push
jobs:
  check:
    steps:
      - id: audit
        run: cargo audit
        continue-on-error: true
      - run: echo audit=${{ steps.audit.outcome }}
"#;
    let mut workflow = workflow_from_yaml(yaml);
    let executor = MockExecutor::new(vec![("cargo audit", MockResponse::fail(1, "vulnerable"))]);

    let result = run_workflow_with_mock(&mut workflow, executor.clone(), &env).await;

    assert_workflow_completed(&result);
    assert_job_succeeded(&result, "check");
    assert!(matches!(
        result.step("check", "audit").state,
        StepState::Failed { .. }
    ));
    assert!(executor.commands().contains(&"echo audit=failure".to_string()));
    assert!(result.events.iter().any(|e| matches!(
        e,
        ExecutionEvent::StepFailed {
            continue_on_error: true,
            ..
        }
    )));
}

#[tokio::test]
async fn test_secrets_are_masked_in_output() {
    let env = TestEnv::new();
    let yaml = r#"
name: Secrets
on: push
jobs:
  publish:
    steps:
      - run: ./publish
        env:
          TOKEN: ${{ secrets.CRATES_TOKEN }}
"#;
    let mut workflow = workflow_from_yaml(yaml);
    let executor = MockExecutor::new(vec![(
        "publish",
        MockResponse::ok("using token hunter2\nuploaded"),
    )]);

    let options = RunOptions {
        secrets: HashMap::from([("CRATES_TOKEN".to_string(), "hunter2".to_string())]),
        ..RunOptions::default()
    };
    let result = run_workflow_with(&mut workflow, executor.clone(), &env, options).await;

    assert_workflow_completed(&result);
    assert_eq!(executor.request_for("publish").unwrap().env["TOKEN"], "hunter2");
    assert_eq!(result.output_lines("publish"), vec!["using token ***", "uploaded"]);
    let output = result.step("publish", "Run ./publish").output().unwrap();
    assert!(!output.contains("hunter2"));
}

#[tokio::test]
async fn test_working_directory_is_inside_workspace() {
    let env = TestEnv::new();
    let yaml = r#"
name: Subdir
on: push
jobs:
  ffi:
    steps:
      - run: mkdir -p biscuit-capi
      - run: cargo build
        working-directory: biscuit-capi
"#;
    let mut workflow = workflow_from_yaml(yaml);
    let executor = MockExecutor::new(vec![]);

    let result = run_workflow_with_mock(&mut workflow, executor.clone(), &env).await;

    let workspace = env.job_workspace(&result, "ffi");
    assert_eq!(executor.request_for("mkdir").unwrap().working_dir, workspace);
    assert_eq!(
        executor.request_for("cargo build").unwrap().working_dir,
        workspace.join("biscuit-capi")
    );
    assert_eq!(
        executor.request_for("cargo build").unwrap().env["GITHUB_WORKSPACE"],
        workspace.display().to_string()
    );
}
