//! Result aggregation.
//!
//! Discovers, validates, and concatenates per-task result files into one
//! ordered collection. Ordering is imposed here, at read time: ascending
//! array index, then the original intra-chunk item order, so a caller can
//! align results back to the work partition by position no matter when (or
//! whether) individual tasks finished.

use std::fs;

use log::warn;
use serde_json::{Map, Value};

use crate::descriptor::{JobDescriptor, OutputKind};
use crate::error::{Error, Result};
use crate::layout;
use crate::slurm::SlurmClient;
use crate::status;

/// The reassembled output of a job.
#[derive(Debug, Clone, PartialEq)]
pub enum Results {
    /// One row per original work item, in original order.
    Tabular(Vec<Map<String, Value>>),
    /// One opaque value per original work item, in original order.
    Opaque(Vec<Value>),
}

/// Outcome of a collection attempt. `results` is `None` only when zero
/// result files were present.
#[derive(Debug, Clone, PartialEq)]
pub struct Collected {
    pub results: Option<Results>,
    /// Names of the expected result files that were absent, ascending.
    pub missing_files: Vec<String>,
}

/// Read and concatenate every present result file for `job`.
///
/// Missing files are a recoverable condition: they are named in
/// `missing_files` (and warned about), never an error. With `block` set,
/// waits for the job to reach a terminal state first. `output_kind`
/// overrides the kind declared at submission. Collection has no side
/// effects, so calling it twice without intervening task completion
/// returns identical data and warnings.
pub fn collect(
    client: &SlurmClient,
    job: &JobDescriptor,
    output_kind: Option<OutputKind>,
    block: bool,
) -> Result<Collected> {
    if block {
        status::wait_for_completion(client, job)?;
    }

    let kind = output_kind.unwrap_or(job.output_kind);
    let mut missing_files = Vec::new();
    let mut per_item: Vec<Value> = Vec::new();
    let mut any_present = false;

    for index in 0..job.task_count {
        let file_name = layout::results_file_name(index);
        let path = job.workdir.join(&file_name);
        if !path.exists() {
            missing_files.push(file_name);
            continue;
        }
        any_present = true;
        let chunk: Vec<Value> = serde_json::from_str(&fs::read_to_string(&path)?)?;
        per_item.extend(chunk);
    }

    if !missing_files.is_empty() {
        warn!(
            "Job {} is missing {} of {} result files: {}",
            job.name,
            missing_files.len(),
            job.task_count,
            missing_files.join(", ")
        );
    }

    if !any_present {
        return Ok(Collected {
            results: None,
            missing_files,
        });
    }

    let results = match kind {
        OutputKind::Opaque => Results::Opaque(per_item),
        OutputKind::Tabular => {
            let mut rows = Vec::with_capacity(per_item.len());
            for value in per_item {
                match value {
                    Value::Object(row) => rows.push(row),
                    other => {
                        return Err(Error::Configuration(format!(
                            "cannot coerce non-row result to tabular output: {other}"
                        )))
                    }
                }
            }
            Results::Tabular(rows)
        }
    };

    Ok(Collected {
        results: Some(results),
        missing_files,
    })
}
