//! Tests for result aggregation.

use std::fs;
use std::path::Path;

use rstest::rstest;
use serde_json::json;
use tempfile::TempDir;

use slurm_array::collect::{collect, Results};
use slurm_array::config::SlurmConfig;
use slurm_array::descriptor::{JobDescriptor, OutputKind};
use slurm_array::error::Error;
use slurm_array::layout;
use slurm_array::slurm::SlurmClient;

fn job(workdir: &Path, task_count: usize, kind: OutputKind) -> JobDescriptor {
    JobDescriptor {
        name: "agg".to_string(),
        external_id: None,
        task_count,
        output_kind: kind,
        workdir: workdir.to_path_buf(),
    }
}

fn write_chunk(workdir: &Path, index: usize, values: &[serde_json::Value]) {
    let path = workdir.join(layout::results_file_name(index));
    fs::write(path, serde_json::to_string(&values.to_vec()).unwrap()).unwrap();
}

#[rstest]
fn test_partial_results_name_the_gaps() {
    let temp = TempDir::new().unwrap();
    let client = SlurmClient::new(SlurmConfig::default());
    let job = job(temp.path(), 6, OutputKind::Opaque);

    for index in [0usize, 1, 3, 4] {
        write_chunk(temp.path(), index, &[json!(index * 10), json!(index * 10 + 1)]);
    }

    let collected = collect(&client, &job, None, false).unwrap();
    assert_eq!(
        collected.missing_files,
        vec!["results_2.json", "results_5.json"]
    );
    match collected.results {
        Some(Results::Opaque(values)) => {
            assert_eq!(
                values,
                vec![
                    json!(0),
                    json!(1),
                    json!(10),
                    json!(11),
                    json!(30),
                    json!(31),
                    json!(40),
                    json!(41)
                ]
            );
        }
        other => panic!("expected opaque results, got {other:?}"),
    }
}

#[rstest]
fn test_collection_is_repeatable() {
    let temp = TempDir::new().unwrap();
    let client = SlurmClient::new(SlurmConfig::default());
    let job = job(temp.path(), 3, OutputKind::Opaque);
    write_chunk(temp.path(), 1, &[json!("b")]);

    let first = collect(&client, &job, None, false).unwrap();
    let second = collect(&client, &job, None, false).unwrap();
    assert_eq!(first, second);
}

#[rstest]
fn test_no_results_yields_none() {
    let temp = TempDir::new().unwrap();
    let client = SlurmClient::new(SlurmConfig::default());
    let job = job(temp.path(), 2, OutputKind::Tabular);

    let collected = collect(&client, &job, None, false).unwrap();
    assert!(collected.results.is_none());
    assert_eq!(
        collected.missing_files,
        vec!["results_0.json", "results_1.json"]
    );
}

#[rstest]
fn test_tabular_rows_concatenate_in_order() {
    let temp = TempDir::new().unwrap();
    let client = SlurmClient::new(SlurmConfig::default());
    let job = job(temp.path(), 2, OutputKind::Tabular);
    write_chunk(temp.path(), 0, &[json!({"x": 1}), json!({"x": 2})]);
    write_chunk(temp.path(), 1, &[json!({"x": 3})]);

    let collected = collect(&client, &job, None, false).unwrap();
    assert!(collected.missing_files.is_empty());
    match collected.results {
        Some(Results::Tabular(rows)) => {
            let xs: Vec<_> = rows.iter().map(|r| r["x"].clone()).collect();
            assert_eq!(xs, vec![json!(1), json!(2), json!(3)]);
        }
        other => panic!("expected tabular results, got {other:?}"),
    }
}

#[rstest]
fn test_non_row_value_cannot_become_tabular() {
    let temp = TempDir::new().unwrap();
    let client = SlurmClient::new(SlurmConfig::default());
    let job = job(temp.path(), 1, OutputKind::Tabular);
    write_chunk(temp.path(), 0, &[json!(42)]);

    let err = collect(&client, &job, None, false).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[rstest]
fn test_kind_override_at_collect_time() {
    let temp = TempDir::new().unwrap();
    let client = SlurmClient::new(SlurmConfig::default());
    let job = job(temp.path(), 1, OutputKind::Tabular);
    write_chunk(temp.path(), 0, &[json!(42)]);

    // The same scalar that tabular coercion rejects is fine collected opaque.
    let collected = collect(&client, &job, Some(OutputKind::Opaque), false).unwrap();
    assert_eq!(collected.results, Some(Results::Opaque(vec![json!(42)])));
}
