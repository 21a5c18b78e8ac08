//! Artifact generation: everything an array task needs, written once into
//! the job's working directory before submission.
//!
//! Nothing here executes work. The generated driver script is what each
//! array task runs; the submission directive is what sbatch consumes.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::debug;
use serde_json::Value;

use crate::descriptor::{JobManifest, TaskCommand};
use crate::error::{Error, Result};
use crate::layout;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Caller-supplied scheduler options, e.g. `partition` -> `debug`. Keys are
/// long-option names without the leading dashes.
pub type SlurmOptions = BTreeMap<String, String>;

/// Named auxiliary objects serialized alongside the partition.
pub type AuxObjects = BTreeMap<String, Value>;

/// Reject caller input that collides with generator-owned names. Runs
/// before anything touches the filesystem.
pub fn validate_inputs(options: &SlurmOptions, objects: &AuxObjects) -> Result<()> {
    for key in options.keys() {
        if layout::RESERVED_SLURM_OPTIONS.contains(&key.as_str()) {
            return Err(Error::Configuration(format!(
                "scheduler option {key:?} is reserved and set by the generator"
            )));
        }
    }
    for name in objects.keys() {
        if layout::RESERVED_OBJECT_NAMES.contains(&name.as_str()) {
            return Err(Error::Configuration(format!(
                "auxiliary object name {name:?} collides with a generated artifact"
            )));
        }
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::Configuration(format!(
                "auxiliary object name {name:?} must be an alphanumeric/underscore token"
            )));
        }
    }
    Ok(())
}

/// Write the full artifact set for a job into `workdir`.
///
/// The working directory holds the serialized work partition, the callable,
/// one file per auxiliary object, the job manifest, the per-task driver
/// script, and the scheduler submission directive. `runner` is the
/// executable the driver script hands each array index to; it must resolve
/// on the cluster nodes, not just on the submitting host.
pub fn write_artifacts(
    workdir: &Path,
    manifest: &JobManifest,
    items: &[Value],
    callable: &TaskCommand,
    objects: &AuxObjects,
    options: &SlurmOptions,
    runner: &str,
) -> Result<()> {
    validate_inputs(options, objects)?;

    fs::create_dir_all(workdir)?;

    fs::write(
        workdir.join(layout::PARAMS_FILE),
        serde_json::to_string(items)?,
    )?;
    fs::write(
        workdir.join(layout::CALLABLE_FILE),
        serde_json::to_string_pretty(callable)?,
    )?;
    for (name, value) in objects {
        fs::write(
            workdir.join(layout::object_file_name(name)),
            serde_json::to_string(value)?,
        )?;
    }
    manifest.save(workdir)?;

    write_driver_script(workdir, runner)?;
    write_submit_script(workdir, manifest, options)?;

    debug!("Wrote job artifacts under {}", workdir.display());
    Ok(())
}

fn write_driver_script(workdir: &Path, runner: &str) -> Result<()> {
    let script = format!(
        "#!/bin/bash\n\
         exec {} run-task --dir {} --index \"${{{}}}\"\n",
        runner,
        workdir.display(),
        layout::ARRAY_INDEX_ENV,
    );
    let path = workdir.join(layout::DRIVER_SCRIPT);
    fs::write(&path, script)?;
    make_executable(&path)?;
    Ok(())
}

fn write_submit_script(
    workdir: &Path,
    manifest: &JobManifest,
    options: &SlurmOptions,
) -> Result<()> {
    let mut script = format!(
        "#!/bin/bash\n\
         #SBATCH --array=0-{}\n\
         #SBATCH --job-name={}\n\
         #SBATCH --cpus-per-task={}\n\
         #SBATCH --output=slurm-%A_%a.out\n",
        manifest.task_count - 1,
        manifest.name,
        manifest.parallelism,
    );

    // Caller options pass through verbatim; the reserved set was rejected
    // up front in validate_inputs.
    for (key, value) in options {
        script.push_str(&format!("#SBATCH --{}={}\n", key, value));
    }

    script.push('\n');
    script.push_str(&format!("./{}\n", layout::DRIVER_SCRIPT));

    let path = workdir.join(layout::SUBMIT_SCRIPT);
    fs::write(&path, script)?;
    make_executable(&path)?;
    Ok(())
}

fn make_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms)?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
