//! Caller-facing submission entry points.
//!
//! Three shapes of work are supported: a parameter table applied row-wise
//! (`submit_tabular`), a generic item list (`submit_map`), and a single
//! heavy call (`submit_single`). All three produce the same artifact set
//! and return a [`JobDescriptor`]; every later operation is keyed off it.

use std::collections::BTreeSet;
use std::path::PathBuf;

use log::{error, info, warn};
use serde_json::{Map, Value};

use crate::artifacts::{self, AuxObjects, SlurmOptions};
use crate::chunk::plan_chunks;
use crate::descriptor::{generate_name, sanitize_name, JobDescriptor, JobManifest, OutputKind, TaskCommand};
use crate::error::{Error, Result};
use crate::layout;
use crate::runner;
use crate::slurm::SlurmClient;

/// Options shared by every submission entry point.
#[derive(Debug, Clone)]
pub struct SubmitOptions {
    /// Job name; generated from the current time when absent.
    pub name: Option<String>,
    /// Requested number of array tasks (nodes). The effective count may be
    /// smaller for small inputs.
    pub nodes: usize,
    /// Work items one node can process concurrently; also the default
    /// per-task parallelism width.
    pub capacity_per_node: usize,
    /// Override for the per-task parallelism width.
    pub parallelism: Option<usize>,
    /// Caller scheduler options, passed through to the submission
    /// directive verbatim (reserved names rejected).
    pub slurm_options: SlurmOptions,
    /// Named auxiliary objects serialized into the working directory.
    pub objects: AuxObjects,
    /// Submit to the external scheduler (`true`) or run every array index
    /// synchronously in this process (`false`).
    pub submit: bool,
    /// Directory under which the job working directory is created.
    /// Defaults to the current directory.
    pub root: Option<PathBuf>,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            name: None,
            nodes: 2,
            capacity_per_node: 2,
            parallelism: None,
            slurm_options: SlurmOptions::new(),
            objects: AuxObjects::new(),
            submit: true,
            root: None,
        }
    }
}

/// Apply `callable` to every row of a parameter table. Row keys must match
/// the callable's declared parameter names exactly.
pub fn submit_tabular(
    client: &SlurmClient,
    callable: TaskCommand,
    rows: Vec<Map<String, Value>>,
    opts: SubmitOptions,
) -> Result<JobDescriptor> {
    if callable.params.is_empty() {
        return Err(Error::Configuration(
            "tabular submission requires the callable to declare parameter names".to_string(),
        ));
    }
    let declared: BTreeSet<&str> = callable.params.iter().map(String::as_str).collect();
    if declared.len() != callable.params.len() {
        return Err(Error::Configuration(
            "callable declares a duplicate parameter name".to_string(),
        ));
    }
    for (i, row) in rows.iter().enumerate() {
        let got: BTreeSet<&str> = row.keys().map(String::as_str).collect();
        if got != declared {
            return Err(Error::Configuration(format!(
                "row {i} columns {got:?} do not match callable parameters {declared:?}"
            )));
        }
    }

    let items: Vec<Value> = rows.into_iter().map(Value::Object).collect();
    submit_items(client, callable, items, OutputKind::Tabular, opts)
}

/// Apply `callable` to every element of an item list. Constant extra
/// arguments belong in `callable.args`.
pub fn submit_map(
    client: &SlurmClient,
    callable: TaskCommand,
    items: Vec<Value>,
    opts: SubmitOptions,
) -> Result<JobDescriptor> {
    submit_items(client, callable, items, OutputKind::Opaque, opts)
}

/// Dispatch a single heavy call: one work item, one array task.
pub fn submit_single(
    client: &SlurmClient,
    callable: TaskCommand,
    args: Vec<Value>,
    mut opts: SubmitOptions,
) -> Result<JobDescriptor> {
    opts.nodes = 1;
    opts.capacity_per_node = 1;
    submit_items(client, callable, vec![Value::Array(args)], OutputKind::Opaque, opts)
}

fn submit_items(
    client: &SlurmClient,
    callable: TaskCommand,
    items: Vec<Value>,
    output_kind: OutputKind,
    opts: SubmitOptions,
) -> Result<JobDescriptor> {
    if opts.nodes == 0 || opts.capacity_per_node == 0 {
        return Err(Error::Configuration(
            "nodes and capacity_per_node must be >= 1".to_string(),
        ));
    }
    // Fail fast on reserved-name collisions before anything is written.
    artifacts::validate_inputs(&opts.slurm_options, &opts.objects)?;

    let name = match &opts.name {
        Some(n) => sanitize_name(n)?,
        None => generate_name(),
    };

    let plan = plan_chunks(items.len(), opts.nodes, opts.capacity_per_node);
    let parallelism = opts.parallelism.unwrap_or(opts.capacity_per_node).max(1);

    let root = opts.root.clone().unwrap_or_else(|| PathBuf::from("."));
    let workdir = layout::job_dir(&root, &name);
    if workdir.exists() {
        return Err(Error::Configuration(format!(
            "working directory {} already exists; clean up the previous job first",
            workdir.display()
        )));
    }

    let mut manifest = JobManifest {
        name: name.clone(),
        external_id: None,
        item_count: items.len(),
        chunk_size: plan.chunk_size,
        task_count: plan.task_count,
        parallelism,
        output_kind,
    };
    artifacts::write_artifacts(
        &workdir,
        &manifest,
        &items,
        &callable,
        &opts.objects,
        &opts.slurm_options,
        &client.runner_exec(),
    )?;

    info!(
        "Job prepared name={} items={} chunk_size={} task_count={} submit={}",
        name,
        items.len(),
        plan.chunk_size,
        plan.task_count,
        opts.submit
    );

    if opts.submit {
        if !client.is_available() {
            error!(
                "Scheduler tools are not available on this host; \
                 re-run with submit=false to execute locally"
            );
            return Err(Error::Submission(
                "scheduler unavailable (squeue probe failed)".to_string(),
            ));
        }
        let external_id = client.submit(&workdir.join(layout::SUBMIT_SCRIPT), &workdir)?;
        manifest.external_id = Some(external_id);
        manifest.save(&workdir)?;
    } else {
        // Local/offline mode: run every array index in order, in-process.
        // Array indices are independent; one failing does not stop the rest.
        for index in 0..manifest.task_count {
            if let Err(e) = runner::run_task_local(&workdir, index) {
                warn!("Local task failed job={} index={} error={}", name, index, e);
            }
        }
    }

    Ok(manifest.descriptor(&workdir))
}
