// tests/incremental.rs

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use taskdag::graph::TaskGraph;
use taskdag::runner::{Action, Runner, RunnerOptions, TaskOutcome};
use taskdag::store::FileStateStore;
use taskdag::tasks::{CopyTask, GenerateFileTask};
use taskdag::TaskId;
use taskdag_test_utils::{ExecutionLog, GraphBuilder, ScriptedTask, init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn store(root: &Path) -> Box<FileStateStore> {
    Box::new(FileStateStore::new(root))
}

/// Tasks are recreated per run the way a build tool reloads its project
/// definition; identity continuity comes from names and structural keys.
fn chain(log: &ExecutionLog, key_of_first: serde_json::Value) -> (Arc<TaskGraph>, TaskId) {
    let mut b = GraphBuilder::new();
    let first = b.task(
        "first",
        ScriptedTask::succeeding("first", log).with_key(key_of_first),
    );
    let second = b.task("second", ScriptedTask::succeeding("second", log));
    b.dep(second, first);
    b.build()
}

#[tokio::test]
async fn unchanged_tasks_are_up_to_date_on_the_second_run() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let log = ExecutionLog::new();

    let (graph, root) = chain(&log, json!(1));
    let report = with_timeout(
        Runner::new(graph, root, Action::Build)
            .with_store(store(dir.path()))
            .run(),
    )
    .await?;
    assert!(!report.failed);
    assert_eq!(log.count(), 2);

    let (graph, root) = chain(&log, json!(1));
    let report = with_timeout(
        Runner::new(graph, root, Action::Build)
            .with_store(store(dir.path()))
            .run(),
    )
    .await?;

    assert!(!report.failed);
    assert_eq!(report.outcome_of("test:first"), Some(TaskOutcome::UpToDate));
    assert_eq!(report.outcome_of("test:second"), Some(TaskOutcome::UpToDate));
    // Nothing actually ran again.
    assert_eq!(log.count(), 2);
    Ok(())
}

#[tokio::test]
async fn changed_structural_key_forces_a_rerun() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let log = ExecutionLog::new();

    let (graph, root) = chain(&log, json!(1));
    with_timeout(
        Runner::new(graph, root, Action::Build)
            .with_store(store(dir.path()))
            .run(),
    )
    .await?;
    assert_eq!(log.count(), 2);

    // Same names, different configuration for "first".
    let (graph, root) = chain(&log, json!(2));
    let report = with_timeout(
        Runner::new(graph, root, Action::Build)
            .with_store(store(dir.path()))
            .run(),
    )
    .await?;

    assert_eq!(report.outcome_of("test:first"), Some(TaskOutcome::Success));
    assert_eq!(report.outcome_of("test:second"), Some(TaskOutcome::UpToDate));
    assert_eq!(log.count(), 3);
    Ok(())
}

#[tokio::test]
async fn force_reruns_even_when_up_to_date() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let log = ExecutionLog::new();

    let (graph, root) = chain(&log, json!(1));
    with_timeout(
        Runner::new(graph, root, Action::Build)
            .with_store(store(dir.path()))
            .run(),
    )
    .await?;

    let (graph, root) = chain(&log, json!(1));
    let options = RunnerOptions {
        force: true,
        ..RunnerOptions::default()
    };
    let report = with_timeout(
        Runner::new(graph, root, Action::Build)
            .with_store(store(dir.path()))
            .with_options(options)
            .run(),
    )
    .await?;

    assert_eq!(report.outcome_of("test:first"), Some(TaskOutcome::Success));
    assert_eq!(log.count(), 4);
    Ok(())
}

#[tokio::test]
async fn failed_run_is_not_recorded_as_success() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let log = ExecutionLog::new();

    let build = |log: &ExecutionLog, fail: bool| {
        let mut b = GraphBuilder::new();
        if fail {
            b.task("flaky", ScriptedTask::failing("flaky", log));
        } else {
            b.task("flaky", ScriptedTask::succeeding("flaky", log));
        }
        b.build()
    };

    let (graph, root) = build(&log, true);
    let report = with_timeout(
        Runner::new(graph, root, Action::Build)
            .with_store(store(dir.path()))
            .run(),
    )
    .await?;
    assert!(report.failed);

    // The next run must not consider the failed task up to date.
    let (graph, root) = build(&log, false);
    let report = with_timeout(
        Runner::new(graph, root, Action::Build)
            .with_store(store(dir.path()))
            .run(),
    )
    .await?;
    assert_eq!(report.outcome_of("test:flaky"), Some(TaskOutcome::Success));
    assert_eq!(log.count(), 2);
    Ok(())
}

#[tokio::test]
async fn content_based_check_is_consulted_even_without_recorded_history() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let target = dir.path().join("gen/config.h");
    std::fs::create_dir_all(target.parent().unwrap())?;
    std::fs::write(&target, "#define N 7\n")?;

    let mut b = GraphBuilder::new();
    b.task("config", GenerateFileTask::new(&target, "#define N 7\n"));
    let (graph, root) = b.build();

    // Fresh store, so there is no success record; the task's own check
    // still finds the file already correct and nothing runs.
    let report = with_timeout(
        Runner::new(graph, root, Action::Build)
            .with_store(store(dir.path()))
            .run(),
    )
    .await?;
    assert!(!report.failed);
    assert_eq!(report.outcome_of("test:config"), Some(TaskOutcome::UpToDate));
    Ok(())
}

#[tokio::test]
async fn copy_task_copies_pairs_and_reruns_on_source_change() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let src_a = dir.path().join("a.txt");
    let src_b = dir.path().join("b.txt");
    std::fs::write(&src_a, "alpha")?;
    std::fs::write(&src_b, "beta")?;
    let dst_a = dir.path().join("out/a.txt");
    let dst_b = dir.path().join("out/b.txt");

    let build_graph = || {
        let mut b = GraphBuilder::new();
        b.task(
            "assets",
            CopyTask::new()
                .will_copy_file(&src_a, &dst_a)
                .will_copy_file(&src_b, &dst_b),
        );
        b.build()
    };

    let (graph, root) = build_graph();
    let report = with_timeout(
        Runner::new(graph, root, Action::Build)
            .with_store(store(dir.path()))
            .run(),
    )
    .await?;
    assert!(!report.failed);
    assert_eq!(std::fs::read_to_string(&dst_a)?, "alpha");
    assert_eq!(std::fs::read_to_string(&dst_b)?, "beta");

    let (graph, root) = build_graph();
    let report = with_timeout(
        Runner::new(graph, root, Action::Build)
            .with_store(store(dir.path()))
            .run(),
    )
    .await?;
    assert_eq!(report.outcome_of("test:assets"), Some(TaskOutcome::UpToDate));

    // Touching a source past the recorded success forces the copy again.
    std::thread::sleep(std::time::Duration::from_millis(20));
    std::fs::write(&src_b, "beta2")?;
    let (graph, root) = build_graph();
    let report = with_timeout(
        Runner::new(graph, root, Action::Build)
            .with_store(store(dir.path()))
            .run(),
    )
    .await?;
    assert_eq!(report.outcome_of("test:assets"), Some(TaskOutcome::Success));
    assert_eq!(std::fs::read_to_string(&dst_b)?, "beta2");
    Ok(())
}

#[tokio::test]
async fn generate_file_task_writes_skips_and_cleans() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let target = dir.path().join("out").join("version.h");

    let build_graph = |target: &Path| {
        let mut b = GraphBuilder::new();
        b.task(
            "version",
            GenerateFileTask::new(target, "#define VERSION 1\n"),
        );
        b.build()
    };

    let (graph, root) = build_graph(&target);
    let report = with_timeout(
        Runner::new(graph, root, Action::Build)
            .with_store(store(dir.path()))
            .run(),
    )
    .await?;
    assert!(!report.failed);
    assert_eq!(std::fs::read_to_string(&target)?, "#define VERSION 1\n");

    // Identical content on disk: nothing to do.
    let (graph, root) = build_graph(&target);
    let report = with_timeout(
        Runner::new(graph, root, Action::Build)
            .with_store(store(dir.path()))
            .run(),
    )
    .await?;
    assert_eq!(report.outcome_of("test:version"), Some(TaskOutcome::UpToDate));

    // Tampered content is regenerated.
    std::fs::write(&target, "tampered")?;
    let (graph, root) = build_graph(&target);
    let report = with_timeout(
        Runner::new(graph, root, Action::Build)
            .with_store(store(dir.path()))
            .run(),
    )
    .await?;
    assert_eq!(report.outcome_of("test:version"), Some(TaskOutcome::Success));
    assert_eq!(std::fs::read_to_string(&target)?, "#define VERSION 1\n");

    // Clean removes the produced file.
    let (graph, root) = build_graph(&target);
    let report = with_timeout(
        Runner::new(graph, root, Action::Clean)
            .with_store(store(dir.path()))
            .run(),
    )
    .await?;
    assert!(!report.failed);
    assert!(!target.exists());
    Ok(())
}
