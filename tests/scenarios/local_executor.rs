//! Test: running a compiled build through the local executor

use crate::helpers::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use vela::compiler::{Compiler, YamlCompiler};
use vela::core::{Build, BuildMetadata, ExecutionContext, Phase};
use vela::execution::{
    BuildOrchestrator, Executor, ExecutorError, LocalExecutor, LocalExecutorConfig, StepEvent,
};
use vela::runtime::Runtime;
use vela::PipelineError;

const PIPELINE: &str = r#"
services:
  - name: redis
    image: redis:7

steps:
  - name: build
    image: rust:1
    commands: [cargo build]
  - name: test
    image: rust:1-slim
    pull: always
    commands: [cargo test]
"#;

fn compile(yaml: &str) -> Build {
    YamlCompiler::new()
        .with_build_id("vela-test")
        .compile(yaml, &BuildMetadata::new())
        .unwrap()
}

fn executor(
    build: Build,
    runtime: Arc<FakeRuntime>,
) -> (Arc<LocalExecutor>, Arc<CollectingCallback>) {
    let (collected, callback) = collecting_callback();
    let runtime: Arc<dyn Runtime> = runtime;
    let config = LocalExecutorConfig::new()
        .with_workspace("/home/dev/project")
        .with_callback(callback);
    (Arc::new(LocalExecutor::new(build, runtime, config)), collected)
}

async fn run(executor: Arc<LocalExecutor>) -> Result<(), PipelineError> {
    BuildOrchestrator::new(executor)
        .run_with_signal(&ExecutionContext::new(), std::future::pending())
        .await
}

/// Services start first, steps run in order, logs reach the callback, and
/// everything is removed in reverse
#[tokio::test]
async fn test_successful_build() {
    let runtime = Arc::new(
        FakeRuntime::new()
            .with_local_image("rust:1")
            .with_local_image("rust:1-slim")
            .with_logs("vela-test_build", &["Compiling vela", "Finished"])
            .with_logs("vela-test_test", &["test result: ok"]),
    );
    let (executor, collected) = executor(compile(PIPELINE), runtime.clone());

    run(executor).await.unwrap();

    assert_eq!(
        runtime.calls_to("run_container"),
        vec![
            "run_container vela-test_service_redis",
            "run_container vela-test_build",
            "run_container vela-test_test",
        ]
    );

    // redis is missing locally; rust:1-slim is present but `test` always pulls it
    assert_eq!(
        runtime.calls_to("pull_image"),
        vec!["pull_image redis:7", "pull_image rust:1-slim"]
    );

    assert_eq!(
        collected.log_lines(),
        vec!["Compiling vela", "Finished", "test result: ok"]
    );

    let calls = runtime.calls();
    let teardown: Vec<_> = calls
        .iter()
        .skip_while(|c| !c.starts_with("remove_"))
        .cloned()
        .collect();
    assert_eq!(
        teardown,
        vec![
            "remove_container vela-test_test",
            "remove_container vela-test_build",
            "remove_container vela-test_service_redis",
            "remove_volume vela-test",
            "remove_network vela-test",
        ]
    );
}

/// The init step is announced but never started as a container
#[tokio::test]
async fn test_init_is_not_a_container() {
    let runtime = Arc::new(FakeRuntime::new());
    let build = compile("steps: [{ name: test, image: alpine }]");
    let (executor, collected) = executor(build, runtime.clone());

    run(executor).await.unwrap();

    assert!(!runtime.calls().iter().any(|c| c.contains("_init")));
    assert!(collected.events().contains(&StepEvent::Finished {
        label: "[step: init]".into(),
        exit_code: 0,
    }));
}

/// A non-zero exit stops the build at that step
#[tokio::test]
async fn test_failing_step() {
    let runtime = Arc::new(FakeRuntime::new().with_exit_code("vela-test_build", 101));
    let (executor, _) = executor(compile(PIPELINE), runtime.clone());

    let err = run(executor).await.unwrap_err();

    match err {
        PipelineError::Phase(e) => {
            assert_eq!(e.phase, Phase::Exec);
            assert!(matches!(
                e.source,
                ExecutorError::StepFailed { ref step, exit_code: 101 } if step == "[step: build]"
            ));
        }
        other => panic!("unexpected error: {}", other),
    }

    assert!(!runtime.calls().contains(&"run_container vela-test_test".to_string()));
    assert!(runtime.calls().contains(&"remove_network vela-test".to_string()));
}

/// `continue: true` lets the build go on after a failure
#[tokio::test]
async fn test_continue_on_error() {
    let yaml = r#"
steps:
  - name: flaky
    image: alpine
    ruleset:
      continue: true
  - name: after
    image: alpine
"#;
    let runtime = Arc::new(FakeRuntime::new().with_exit_code("vela-test_flaky", 1));
    let (executor, _) = executor(compile(yaml), runtime.clone());

    run(executor).await.unwrap();
    assert!(runtime.calls().contains(&"run_container vela-test_after".to_string()));
}

/// A detached step starts in its place and is never waited on
#[tokio::test]
async fn test_detached_step_keeps_its_position() {
    let yaml = r#"
steps:
  - name: first
    image: alpine
  - name: bg
    image: alpine
    detach: true
  - name: last
    image: alpine
"#;
    let runtime = Arc::new(FakeRuntime::new().hanging("vela-test_bg"));
    let (executor, _) = executor(compile(yaml), runtime.clone());

    tokio::time::timeout(Duration::from_secs(5), run(executor))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        runtime.calls_to("run_container"),
        vec![
            "run_container vela-test_first",
            "run_container vela-test_bg",
            "run_container vela-test_last",
        ]
    );
    assert!(runtime.calls().contains(&"remove_container vela-test_bg".to_string()));
}

/// A container that fails to start is still removed
#[tokio::test]
async fn test_failed_start_is_torn_down() {
    let runtime = Arc::new(FakeRuntime::new().failing_run("vela-test_build"));
    let (executor, _) = executor(compile(PIPELINE), runtime.clone());

    let err = run(executor).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Phase(ref e) if e.phase == Phase::Exec
            && matches!(e.source, ExecutorError::Runtime(_))
    ));
    assert!(runtime.calls().contains(&"remove_container vela-test_build".to_string()));
    assert!(!runtime.calls().contains(&"run_container vela-test_test".to_string()));
}

/// Exec never waits on a stream that is not reading
#[tokio::test]
async fn test_exec_does_not_wait_for_stream() {
    let lines: Vec<String> = (0..3000).map(|i| format!("line {}", i)).collect();
    let lines: Vec<&str> = lines.iter().map(String::as_str).collect();
    let runtime = Arc::new(FakeRuntime::new().with_logs("vela-test_build", &lines));
    let (executor, _) = executor(compile(PIPELINE), runtime.clone());
    let ctx = ExecutionContext::new();

    executor.create_build(&ctx).await.unwrap();
    executor.plan_build(&ctx).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), executor.exec_build(&ctx))
        .await
        .unwrap()
        .unwrap();

    assert!(runtime.calls().contains(&"run_container vela-test_test".to_string()));
}

/// Teardown failures do not fail an otherwise successful build
#[tokio::test]
async fn test_teardown_failure_is_logged_only() {
    let runtime = Arc::new(FakeRuntime::new().failing_network_removal());
    let (executor, _) = executor(compile(PIPELINE), runtime.clone());

    assert!(run(executor).await.is_ok());
}

/// Calling destroy directly still reports the first teardown failure
#[tokio::test]
async fn test_destroy_returns_first_error() {
    let runtime = Arc::new(FakeRuntime::new().failing_network_removal());
    let (executor, _) = executor(compile(PIPELINE), runtime.clone());
    let ctx = ExecutionContext::new();

    executor.create_build(&ctx).await.unwrap();
    let err = executor.destroy_build(&ctx).await.unwrap_err();

    assert!(err.to_string().contains("network has active endpoints"));
}

/// Planning a build with nothing but init fails
#[tokio::test]
async fn test_nothing_to_run() {
    let runtime = Arc::new(FakeRuntime::new());
    let (executor, _) = executor(Build::from_steps(vec![vela::Step::init()]), runtime);

    let err = executor
        .plan_build(&ExecutionContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutorError::NothingToRun));
}

/// An interrupt stops the running container and still tears everything down
#[tokio::test]
async fn test_interrupt_stops_running_step() {
    let runtime = Arc::new(FakeRuntime::new().hanging("vela-test_build"));
    let (executor, _) = executor(compile(PIPELINE), runtime.clone());
    let (tx, rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        BuildOrchestrator::new(executor)
            .run_with_signal(&ExecutionContext::new(), async move {
                let _ = rx.await;
            })
            .await
    });

    let started = "run_container vela-test_build".to_string();
    tokio::time::timeout(Duration::from_secs(5), async {
        while !runtime.calls().contains(&started) {
            runtime.container_started.notified().await;
        }
    })
    .await
    .unwrap();
    tx.send(()).unwrap();

    let err = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap_err();

    assert!(
        matches!(err, PipelineError::Phase(ref e) if e.phase == Phase::Exec && e.is_cancelled())
    );
    assert!(runtime.calls().contains(&"stop_container vela-test_build".to_string()));
    assert!(runtime.calls().contains(&"remove_container vela-test_build".to_string()));
    assert!(!runtime.calls().contains(&"run_container vela-test_test".to_string()));
}
