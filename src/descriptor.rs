//! Job descriptor and the on-disk job manifest.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::layout;

/// Shape of per-task results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Per-item results are coerced to rows of a single rectangular table.
    Tabular,
    /// Per-item results are kept as an ordered collection of opaque values.
    Opaque,
}

impl std::fmt::Display for OutputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputKind::Tabular => write!(f, "tabular"),
            OutputKind::Opaque => write!(f, "opaque"),
        }
    }
}

/// The explicit, enumerated callable shipped to each array task.
///
/// One child process is spawned per work item: the item is written to the
/// process's stdin as JSON and its stdout is parsed as the item's JSON
/// result. `params` declares the tabular parameter names the command
/// expects; `submit_tabular` validates the parameter table against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Declared parameter names, in no particular order. Empty for map-style
    /// and single-call jobs.
    #[serde(default)]
    pub params: Vec<String>,
}

impl TaskCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            params: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.params.push(name.into());
        self
    }
}

/// Handle identifying one submitted unit of distributed work.
///
/// Immutable once returned to the caller, except for `external_id`, which
/// the scheduler assigns at submission time. Local-mode jobs never get one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    /// Sanitized job name; also the suffix of the working directory name.
    pub name: String,
    /// Scheduler-assigned id. `None` in local/offline mode.
    pub external_id: Option<String>,
    /// Number of array tasks actually created. Always >= 1.
    pub task_count: usize,
    pub output_kind: OutputKind,
    /// The job's working directory on shared storage.
    pub workdir: PathBuf,
}

impl JobDescriptor {
    /// Load a descriptor back from a working directory's manifest.
    pub fn load(workdir: &Path) -> Result<Self> {
        Ok(JobManifest::load(workdir)?.descriptor(workdir))
    }
}

/// Everything an array task needs to know about its job, persisted as
/// `job.json` in the working directory. Written once at submission time
/// (the external id is filled in immediately after sbatch accepts the job,
/// before any task can observe results).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobManifest {
    pub name: String,
    pub external_id: Option<String>,
    pub item_count: usize,
    pub chunk_size: usize,
    pub task_count: usize,
    /// Upper bound on concurrent child processes within one task.
    pub parallelism: usize,
    pub output_kind: OutputKind,
}

impl JobManifest {
    pub fn load(workdir: &Path) -> Result<Self> {
        let path = workdir.join(layout::MANIFEST_FILE);
        let text = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, workdir: &Path) -> Result<()> {
        let path = workdir.join(layout::MANIFEST_FILE);
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn descriptor(&self, workdir: &Path) -> JobDescriptor {
        JobDescriptor {
            name: self.name.clone(),
            external_id: self.external_id.clone(),
            task_count: self.task_count,
            output_kind: self.output_kind,
            workdir: workdir.to_path_buf(),
        }
    }
}

/// Reduce a caller-supplied job name to an alphanumeric/underscore token.
///
/// Fails if nothing survives sanitization, so the working directory name is
/// never empty.
pub fn sanitize_name(name: &str) -> Result<String> {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if cleaned.chars().all(|c| c == '_') {
        return Err(Error::Configuration(format!(
            "job name {name:?} has no usable characters"
        )));
    }
    Ok(cleaned)
}

/// Generate a time-based job name for callers that did not supply one.
pub fn generate_name() -> String {
    format!("job{}", Utc::now().format("%Y%m%d%H%M%S%3f"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("my job.1").unwrap(), "my_job_1");
        assert_eq!(sanitize_name("ok_name").unwrap(), "ok_name");
        assert!(sanitize_name("...").is_err());
    }

    #[test]
    fn test_generated_name_is_sanitized() {
        let name = generate_name();
        assert_eq!(sanitize_name(&name).unwrap(), name);
    }
}
