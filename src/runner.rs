//! Per-array-index task driver.
//!
//! Each array task loads the shared artifacts, processes its contiguous
//! chunk of work items by spawning one child process per item (bounded by
//! the declared parallelism width), and persists the chunk's results under
//! the fixed naming convention. A task that fails never writes its result
//! file; the log it leaves behind is the only evidence it ran.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use log::{debug, info};
use serde_json::Value;

use crate::chunk::chunk_bounds;
use crate::descriptor::{JobManifest, OutputKind, TaskCommand};
use crate::error::{Error, Result};
use crate::layout;

fn task_error(msg: String) -> Error {
    Error::Io(std::io::Error::other(msg))
}

/// Run array index `index` of the job rooted at `workdir`.
///
/// `log` redirects child stderr to a file (used by local mode, where no
/// scheduler captures console output); remote tasks inherit stderr and let
/// Slurm write the `.out` file.
pub fn run_task(workdir: &Path, index: usize, log: Option<&Path>) -> Result<()> {
    let manifest = JobManifest::load(workdir)?;
    if index >= manifest.task_count {
        return Err(Error::Configuration(format!(
            "array index {} out of range for {} tasks",
            index, manifest.task_count
        )));
    }

    let items: Vec<Value> =
        serde_json::from_str(&fs::read_to_string(workdir.join(layout::PARAMS_FILE))?)?;
    let callable: TaskCommand =
        serde_json::from_str(&fs::read_to_string(workdir.join(layout::CALLABLE_FILE))?)?;

    let (start, end) = chunk_bounds(index, manifest.chunk_size, items.len());
    info!(
        "Task starting job={} index={} items={}..{}",
        manifest.name, index, start, end
    );

    let chunk = &items[start..end];
    let results = run_chunk(&callable, chunk, start, workdir, manifest.parallelism, log)?;

    if manifest.output_kind == OutputKind::Tabular {
        for (offset, value) in results.iter().enumerate() {
            if !value.is_object() {
                return Err(task_error(format!(
                    "tabular job produced a non-row result for item {}",
                    start + offset
                )));
            }
        }
    }

    let path = workdir.join(layout::results_file_name(index));
    fs::write(&path, serde_json::to_string(&results)?)?;
    info!(
        "Task finished job={} index={} results={}",
        manifest.name,
        index,
        results.len()
    );
    Ok(())
}

/// Fan `chunk` out across up to `width` local workers, preserving item
/// order in the returned results.
fn run_chunk(
    callable: &TaskCommand,
    chunk: &[Value],
    chunk_start: usize,
    workdir: &Path,
    width: usize,
    log: Option<&Path>,
) -> Result<Vec<Value>> {
    if chunk.is_empty() {
        return Ok(Vec::new());
    }

    let workers = width.max(1).min(chunk.len());
    let cursor = AtomicUsize::new(0);
    let slots: Mutex<Vec<Option<Result<Value>>>> =
        Mutex::new((0..chunk.len()).map(|_| None).collect());

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let i = cursor.fetch_add(1, Ordering::SeqCst);
                if i >= chunk.len() {
                    break;
                }
                let outcome = run_item(callable, &chunk[i], chunk_start + i, workdir, log);
                slots.lock().expect("worker panicked")[i] = Some(outcome);
            });
        }
    });

    let slots = slots.into_inner().expect("worker panicked");
    let mut results = Vec::with_capacity(chunk.len());
    for (i, slot) in slots.into_iter().enumerate() {
        match slot {
            Some(Ok(value)) => results.push(value),
            Some(Err(e)) => {
                return Err(task_error(format!("work item {} failed: {}", chunk_start + i, e)))
            }
            None => return Err(task_error(format!("work item {} was never run", chunk_start + i))),
        }
    }
    Ok(results)
}

/// Execute the callable for one work item: item JSON on stdin, result JSON
/// on stdout.
fn run_item(
    callable: &TaskCommand,
    item: &Value,
    item_index: usize,
    workdir: &Path,
    log: Option<&Path>,
) -> Result<Value> {
    debug!("Running item {} with {}", item_index, callable.program);

    let mut command = Command::new(&callable.program);
    command
        .args(&callable.args)
        .env(layout::WORKDIR_ENV, workdir)
        .env(layout::ITEM_INDEX_ENV, item_index.to_string())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped());
    if let Some(log_path) = log {
        let file = OpenOptions::new().create(true).append(true).open(log_path)?;
        command.stderr(Stdio::from(file));
    }

    let mut child = command.spawn().map_err(|e| {
        task_error(format!("failed to spawn {:?}: {}", callable.program, e))
    })?;

    let payload = serde_json::to_vec(item)?;
    child
        .stdin
        .take()
        .ok_or_else(|| task_error("child stdin unavailable".to_string()))?
        .write_all(&payload)?;

    let output = child.wait_with_output()?;
    if !output.status.success() {
        return Err(task_error(format!(
            "callable exited with {:?} for item {}",
            output.status.code(),
            item_index
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(stdout.trim()).map_err(|e| {
        task_error(format!(
            "callable produced invalid JSON for item {}: {}",
            item_index, e
        ))
    })
}

/// Run one index in local mode: child stderr goes to the conventional log
/// file so status polling and failure classification see the same layout
/// as a scheduler run.
pub fn run_task_local(workdir: &Path, index: usize) -> Result<()> {
    let log_path = local_log_path(workdir, index);
    // Touch the log first: its presence is the evidence the task started.
    File::create(&log_path)?;
    let result = run_task(workdir, index, Some(&log_path));
    if let Err(ref e) = result {
        let mut file = OpenOptions::new().append(true).open(&log_path)?;
        writeln!(file, "{e}")?;
    }
    result
}

fn local_log_path(workdir: &Path, index: usize) -> PathBuf {
    workdir.join(layout::log_file_name(layout::LOCAL_JOB_ID, index))
}
