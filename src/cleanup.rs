//! Job cancellation and working-directory cleanup.

use std::fs;

use log::info;

use crate::descriptor::JobDescriptor;
use crate::error::Result;
use crate::slurm::SlurmClient;
use crate::status;

/// Ask the scheduler to terminate every task sharing the job's name.
///
/// Advisory: already-written result files stay on disk, and this does not
/// block until termination is confirmed. Local-mode jobs have nothing to
/// cancel.
pub fn cancel(client: &SlurmClient, job: &JobDescriptor) -> Result<()> {
    if job.external_id.is_some() {
        client.cancel_by_name(&job.name)?;
    }
    Ok(())
}

/// Delete the job's working directory and everything in it: artifacts,
/// result files, and task logs. With `block` set, waits for the job to
/// reach a terminal state first so no task is left writing into a removed
/// directory.
pub fn cleanup(client: &SlurmClient, job: &JobDescriptor, block: bool) -> Result<()> {
    if block {
        status::wait_for_completion(client, job)?;
    }
    if job.workdir.exists() {
        fs::remove_dir_all(&job.workdir)?;
        info!("Removed working directory {}", job.workdir.display());
    }
    Ok(())
}
