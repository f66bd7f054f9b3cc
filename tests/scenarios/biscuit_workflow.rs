//! The shipped biscuit workflow: build/test on master, C API release packaging

use crate::helpers::*;
use biscuit_ci::actions::archive::list_tar_gz;
use biscuit_ci::core::{ExecutionStatus, TriggerEvent};

#[tokio::test]
async fn test_push_to_master_runs_both_jobs() {
    let env = TestEnv::new();
    let mut workflow = biscuit_workflow();
    let executor = MockExecutor::new(biscuit_commands());

    let result = run_workflow_with_mock(&mut workflow, executor.clone(), &env).await;

    assert_workflow_completed(&result);
    assert_job_succeeded(&result, "build");
    assert_job_succeeded(&result, "capi");
    assert_eq!(
        result.steps_run("build"),
        vec!["Run actions/checkout@v2", "Build", "Run tests"]
    );

    let commands = executor.commands();
    let build = commands.iter().position(|c| c == "cargo build --verbose").unwrap();
    let test = commands.iter().position(|c| c == "cargo test --verbose").unwrap();
    assert!(build < test, "build must run before test: {:?}", commands);
}

#[tokio::test]
async fn test_pull_request_to_master_triggers() {
    let env = TestEnv::new();
    let mut workflow = biscuit_workflow();
    let executor = MockExecutor::new(biscuit_commands());

    let options = RunOptions {
        event: TriggerEvent::pull_request("master"),
        ..RunOptions::default()
    };
    let result = run_workflow_with(&mut workflow, executor.clone(), &env, options).await;

    assert_workflow_completed(&result);
    let request = executor.request_for("cargo build").unwrap();
    assert_eq!(request.env["GITHUB_EVENT_NAME"], "pull_request");
}

#[tokio::test]
async fn test_failing_build_skips_tests() {
    let env = TestEnv::new();
    let mut workflow = biscuit_workflow();
    let mut commands = vec![(
        "cargo build",
        MockResponse::fail(101, "error[E0425]: cannot find value `x`"),
    )];
    commands.extend(biscuit_commands());
    let executor = MockExecutor::new(commands);

    let result = run_workflow_with_mock(&mut workflow, executor.clone(), &env).await;

    assert_workflow_failed(&result);
    assert_job_failed(&result, "build", "exit code 101");
    assert_step_skipped(&result, "build", "Run tests");
    assert!(!executor.commands().iter().any(|c| c.starts_with("cargo test")));
}

#[tokio::test]
async fn test_failing_tests_fail_the_build_job() {
    let env = TestEnv::new();
    let mut workflow = biscuit_workflow();
    let mut commands = vec![("cargo test", MockResponse::fail(101, "test result: FAILED"))];
    commands.extend(biscuit_commands());

    let result = run_workflow_with_mock(&mut workflow, MockExecutor::new(commands), &env).await;

    assert_workflow_failed(&result);
    assert_job_failed(&result, "build", "exit code 101");
    assert_eq!(
        result.steps_run("build"),
        vec!["Run actions/checkout@v2", "Build", "Run tests"]
    );
}

#[tokio::test]
async fn test_failing_build_does_not_stop_capi() {
    let env = TestEnv::new();
    let mut workflow = biscuit_workflow();
    let mut commands = vec![("cargo build", MockResponse::fail(101, "build failed"))];
    commands.extend(biscuit_commands());

    let result = run_workflow_with_mock(&mut workflow, MockExecutor::new(commands), &env).await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_job_failed(&result, "build", "exit code 101");
    assert_job_succeeded(&result, "capi");
}

#[tokio::test]
async fn test_capi_publishes_archive_as_release() {
    let env = TestEnv::new();
    let mut workflow = biscuit_workflow();

    let result =
        run_workflow_with_mock(&mut workflow, MockExecutor::new(biscuit_commands()), &env).await;

    assert_job_succeeded(&result, "capi");

    let archive = env.job_workspace(&result, "capi").join("biscuit.tar.gz");
    let entries = list_tar_gz(&archive).unwrap();
    assert!(entries.contains(&"biscuit/usr/lib/libbiscuit_auth.so".to_string()), "{:?}", entries);
    assert!(entries.contains(&"biscuit/usr/include/biscuit_auth/biscuit_auth.h".to_string()));
    assert!(entries.iter().all(|e| e.starts_with("biscuit")), "{:?}", entries);

    let release = env.publisher().load_release("bin-refs/heads/master").unwrap();
    assert_eq!(release.name, "bin-refs/heads/master");
    assert!(release.draft);
    assert!(!release.prerelease);
    assert_eq!(release.assets.len(), 1);
    assert_eq!(release.assets[0].name, "biscuit.tar.gz");
    assert_eq!(release.assets[0].content_type, "application/gzip");

    let published = env
        .publisher()
        .release_dir("bin-refs/heads/master")
        .unwrap()
        .join("biscuit.tar.gz");
    assert_eq!(list_tar_gz(&published).unwrap(), entries);

    let upload_url = &result.step("capi", "create_release").outputs["upload_url"];
    assert!(upload_url.starts_with("file://"));
}

#[tokio::test]
async fn test_cargo_term_color_visible_to_every_step() {
    let env = TestEnv::new();
    let mut workflow = biscuit_workflow();
    let executor = MockExecutor::new(biscuit_commands());

    let result = run_workflow_with_mock(&mut workflow, executor.clone(), &env).await;

    assert_workflow_completed(&result);
    let requests = executor.requests();
    assert_eq!(requests.len(), 5);
    for request in requests {
        assert_eq!(
            request.env.get("CARGO_TERM_COLOR").map(String::as_str),
            Some("always"),
            "missing CARGO_TERM_COLOR for {}",
            request.command
        );
    }
}

#[tokio::test]
async fn test_push_to_other_branch_does_not_trigger() {
    let env = TestEnv::new();
    let mut workflow = biscuit_workflow();
    let executor = MockExecutor::new(biscuit_commands());

    let options = RunOptions {
        event: TriggerEvent::push("feature/datalog"),
        ..RunOptions::default()
    };
    let result = run_workflow_with(&mut workflow, executor.clone(), &env, options).await;

    assert_eq!(result.status, ExecutionStatus::NotTriggered);
    assert!(executor.commands().is_empty());
    assert!(env.publisher().load_release("bin-refs/heads/feature/datalog").is_err());
}

#[tokio::test]
async fn test_force_runs_untriggered_workflow() {
    let env = TestEnv::new();
    let mut workflow = biscuit_workflow();
    let executor = MockExecutor::new(biscuit_commands());

    let options = RunOptions {
        event: TriggerEvent::push("develop"),
        force: true,
        ..RunOptions::default()
    };
    let result = run_workflow_with(&mut workflow, executor, &env, options).await;

    assert_workflow_completed(&result);
    assert!(env.publisher().load_release("bin-refs/heads/develop").is_ok());
}

#[tokio::test]
async fn test_second_release_for_same_ref_fails() {
    let env = TestEnv::new();

    let mut first = biscuit_workflow();
    let result = run_workflow_with_mock(&mut first, MockExecutor::new(biscuit_commands()), &env).await;
    assert_workflow_completed(&result);

    let mut second = biscuit_workflow();
    let result =
        run_workflow_with_mock(&mut second, MockExecutor::new(biscuit_commands()), &env).await;
    assert_job_succeeded(&result, "build");
    assert_job_failed(&result, "capi", "already exists");
    assert_step_skipped(&result, "capi", "Upload release asset");
}

#[tokio::test]
async fn test_checkout_copies_source_into_each_job() {
    let env = TestEnv::new();
    let mut workflow = biscuit_workflow();

    let result =
        run_workflow_with_mock(&mut workflow, MockExecutor::new(biscuit_commands()), &env).await;

    for job in ["build", "capi"] {
        let workspace = env.job_workspace(&result, job);
        assert!(workspace.join("Cargo.toml").exists(), "no checkout in {}", job);
        assert!(workspace.join("src/lib.rs").exists());
    }
    // capi's install tree stays in its own workspace
    assert!(!env.job_workspace(&result, "build").join("biscuit").exists());
}
