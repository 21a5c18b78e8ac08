//! Working-directory layout conventions.
//!
//! All coordination between the submitting host and the array tasks flows
//! through well-known file names under one working directory per job.
//! These parsers and builders are the single place that knows the naming
//! scheme; nothing else in the crate spells out a file name.

use std::path::{Path, PathBuf};

use regex::Regex;

/// Prefix of the per-job working directory, followed by the job name.
pub const JOB_DIR_PREFIX: &str = "_sarray_";

/// Serialized work partition (JSON array, one element per work item).
pub const PARAMS_FILE: &str = "params.json";
/// Serialized callable specification.
pub const CALLABLE_FILE: &str = "callable.json";
/// Persisted job manifest.
pub const MANIFEST_FILE: &str = "job.json";
/// Generated per-task driver script.
pub const DRIVER_SCRIPT: &str = "task.sh";
/// Generated scheduler submission directive.
pub const SUBMIT_SCRIPT: &str = "submit.sh";

/// File stem prefix for serialized auxiliary objects.
pub const OBJECT_PREFIX: &str = "obj_";

/// Scheduler options owned exclusively by the artifact generator. A caller
/// supplying any of these fails with a configuration error.
pub const RESERVED_SLURM_OPTIONS: &[&str] = &["array", "job-name", "cpus-per-task", "output"];

/// Auxiliary-object names that would collide with generated artifacts.
pub const RESERVED_OBJECT_NAMES: &[&str] = &["params", "callable", "job"];

/// Environment variable carrying the array task index, set by the scheduler.
pub const ARRAY_INDEX_ENV: &str = "SLURM_ARRAY_TASK_ID";
/// Environment variable naming the job working directory for child processes.
pub const WORKDIR_ENV: &str = "SARRAY_WORKDIR";
/// Environment variable carrying the global work-item position for a child
/// process.
pub const ITEM_INDEX_ENV: &str = "SARRAY_ITEM_INDEX";

/// Placeholder external id used in local-mode log file names.
pub const LOCAL_JOB_ID: &str = "local";

/// Working directory for a job name, under `root`.
pub fn job_dir(root: &Path, name: &str) -> PathBuf {
    root.join(format!("{JOB_DIR_PREFIX}{name}"))
}

/// Result file written by array task `index` on clean completion.
pub fn results_file_name(index: usize) -> String {
    format!("results_{index}.json")
}

/// Console/error log for array task `index` of job `external_id`.
/// Matches the `slurm-%A_%a.out` pattern declared in the submission
/// directive; local mode substitutes [`LOCAL_JOB_ID`].
pub fn log_file_name(external_id: &str, index: usize) -> String {
    format!("slurm-{external_id}_{index}.out")
}

/// Serialized auxiliary object file for `name`.
pub fn object_file_name(name: &str) -> String {
    format!("{OBJECT_PREFIX}{name}.json")
}

/// Parse the array index out of a result file name, if it is one.
pub fn parse_results_index(file_name: &str) -> Option<usize> {
    let re = results_regex();
    re.captures(file_name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Parse the array index out of a task log file name, if it is one.
pub fn parse_log_index(file_name: &str) -> Option<usize> {
    let re = log_regex();
    re.captures(file_name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn results_regex() -> Regex {
    Regex::new(r"^results_(\d+)\.json$").expect("static regex")
}

fn log_regex() -> Regex {
    Regex::new(r"^slurm-[^_]+_(\d+)\.out$").expect("static regex")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_results_index() {
        assert_eq!(parse_results_index("results_12.json"), Some(12));
        assert_eq!(parse_results_index("results_x.json"), None);
        assert_eq!(parse_results_index("params.json"), None);
    }

    #[test]
    fn test_parse_log_index() {
        assert_eq!(parse_log_index("slurm-48163_3.out"), Some(3));
        assert_eq!(parse_log_index("slurm-local_0.out"), Some(0));
        assert_eq!(parse_log_index("submit.sh"), None);
    }
}
