//! End-to-end tests in local/offline mode: submit with `submit=false`, let
//! every array index run synchronously in-process, then poll and collect.
//!
//! The callable is `cat`, which echoes each item's JSON back as its result.

use std::path::Path;

use rstest::rstest;
use serde_json::{json, Map, Value};
use tempfile::TempDir;

use slurm_array::collect::{collect, Results};
use slurm_array::config::SlurmConfig;
use slurm_array::descriptor::TaskCommand;
use slurm_array::error::Error;
use slurm_array::layout;
use slurm_array::slurm::SlurmClient;
use slurm_array::status::{poll, JobState};
use slurm_array::submit::{submit_map, submit_single, submit_tabular, SubmitOptions};
use slurm_array::{classify_oom, cleanup};

fn identity() -> TaskCommand {
    TaskCommand::new("cat")
}

fn local_opts(root: &Path, name: &str) -> SubmitOptions {
    SubmitOptions {
        name: Some(name.to_string()),
        submit: false,
        root: Some(root.to_path_buf()),
        ..SubmitOptions::default()
    }
}

fn rows(n: usize) -> Vec<Map<String, Value>> {
    (0..n)
        .map(|i| {
            let mut row = Map::new();
            row.insert("x".to_string(), json!(i));
            row.insert("y".to_string(), json!(i * i));
            row
        })
        .collect()
}

#[rstest]
fn test_tabular_round_trip() {
    let temp = TempDir::new().unwrap();
    let client = SlurmClient::new(SlurmConfig::default());
    let opts = SubmitOptions {
        nodes: 2,
        capacity_per_node: 1,
        ..local_opts(temp.path(), "square")
    };

    let job = submit_tabular(
        &client,
        identity().param("x").param("y"),
        rows(10),
        opts,
    )
    .unwrap();

    // 10 items across 2 nodes: chunks of 5, 2 array tasks.
    assert_eq!(job.task_count, 2);
    assert!(job.external_id.is_none());
    assert_eq!(job.workdir, temp.path().join("_sarray_square"));

    // Local tasks leave the same log layout a scheduler run would.
    for index in 0..2 {
        assert!(job
            .workdir
            .join(layout::log_file_name(layout::LOCAL_JOB_ID, index))
            .exists());
    }

    let collected = collect(&client, &job, None, false).unwrap();
    assert!(collected.missing_files.is_empty());
    match collected.results {
        Some(Results::Tabular(out)) => {
            assert_eq!(out, rows(10));
        }
        other => panic!("expected tabular results, got {other:?}"),
    }

    // No scheduler id, so the job is terminal by definition.
    match poll(&client, &job).unwrap() {
        JobState::CompletedOrStopped(logs) => assert_eq!(logs.len(), 2),
        JobState::QueuedOrRunning(_) => panic!("local job reported as queued"),
    }
    assert!(classify_oom(&job).unwrap().is_empty());
}

#[rstest]
fn test_map_preserves_item_order() {
    let temp = TempDir::new().unwrap();
    let client = SlurmClient::new(SlurmConfig::default());
    let items: Vec<Value> = (0..7).map(|i| json!({"n": i})).collect();
    let opts = SubmitOptions {
        nodes: 3,
        capacity_per_node: 1,
        ..local_opts(temp.path(), "ordered")
    };

    let job = submit_map(&client, identity(), items.clone(), opts).unwrap();
    assert_eq!(job.task_count, 3);

    let collected = collect(&client, &job, None, false).unwrap();
    assert_eq!(collected.results, Some(Results::Opaque(items)));
}

#[rstest]
fn test_single_call_is_one_task() {
    let temp = TempDir::new().unwrap();
    let client = SlurmClient::new(SlurmConfig::default());
    let opts = SubmitOptions {
        // Wide settings are overridden for a single call.
        nodes: 8,
        capacity_per_node: 4,
        ..local_opts(temp.path(), "solo")
    };

    let job = submit_single(&client, identity(), vec![json!("a"), json!(2)], opts).unwrap();
    assert_eq!(job.task_count, 1);

    let collected = collect(&client, &job, None, false).unwrap();
    assert_eq!(
        collected.results,
        Some(Results::Opaque(vec![json!(["a", 2])]))
    );
}

#[rstest]
fn test_tabular_rejects_column_mismatch() {
    let temp = TempDir::new().unwrap();
    let client = SlurmClient::new(SlurmConfig::default());

    let mut bad = rows(3);
    bad[1].remove("y");
    let err = submit_tabular(
        &client,
        identity().param("x").param("y"),
        bad,
        local_opts(temp.path(), "mismatch"),
    )
    .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    // Validation failed before anything touched the filesystem.
    assert!(!temp.path().join("_sarray_mismatch").exists());
}

#[rstest]
fn test_tabular_requires_declared_params() {
    let temp = TempDir::new().unwrap();
    let client = SlurmClient::new(SlurmConfig::default());
    let err = submit_tabular(
        &client,
        identity(),
        rows(2),
        local_opts(temp.path(), "nodecl"),
    )
    .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[rstest]
fn test_existing_workdir_is_refused() {
    let temp = TempDir::new().unwrap();
    let client = SlurmClient::new(SlurmConfig::default());

    submit_map(
        &client,
        identity(),
        vec![json!(1)],
        local_opts(temp.path(), "dup"),
    )
    .unwrap();

    let err = submit_map(
        &client,
        identity(),
        vec![json!(1)],
        local_opts(temp.path(), "dup"),
    )
    .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[rstest]
fn test_failing_callable_leaves_log_but_no_result() {
    let temp = TempDir::new().unwrap();
    let client = SlurmClient::new(SlurmConfig::default());

    let job = submit_map(
        &client,
        TaskCommand::new("false"),
        vec![json!(1), json!(2)],
        SubmitOptions {
            nodes: 2,
            capacity_per_node: 1,
            ..local_opts(temp.path(), "broken")
        },
    )
    .unwrap();

    for index in 0..job.task_count {
        assert!(!job
            .workdir
            .join(layout::results_file_name(index))
            .exists());
        let log = job
            .workdir
            .join(layout::log_file_name(layout::LOCAL_JOB_ID, index));
        assert!(log.exists());
    }
    let collected = collect(&client, &job, None, false).unwrap();
    assert!(collected.results.is_none());
}

#[rstest]
fn test_cleanup_removes_the_workdir() {
    let temp = TempDir::new().unwrap();
    let client = SlurmClient::new(SlurmConfig::default());

    let job = submit_map(
        &client,
        identity(),
        vec![json!(1)],
        local_opts(temp.path(), "gone"),
    )
    .unwrap();
    assert!(job.workdir.exists());

    cleanup::cleanup(&client, &job, false).unwrap();
    assert!(!job.workdir.exists());
}
