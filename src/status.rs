//! Job status polling.
//!
//! A job is in exactly one of two observable states: the scheduler still
//! has queue entries for it, or it does not. There is no transition back;
//! once the queue query comes up empty the job is terminal and the only
//! remaining evidence is on disk.

use std::fs;

use log::debug;

use crate::descriptor::JobDescriptor;
use crate::error::Result;
use crate::layout;
use crate::slurm::{QueueRow, SlurmClient};

/// Observable state of a submitted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    /// The scheduler reported queue entries: raw per-task rows.
    QueuedOrRunning(Vec<QueueRow>),
    /// Terminal: no queue entries remain. Carries every task's console log
    /// text; a missing log file reads as empty.
    CompletedOrStopped(Vec<TaskLog>),
}

/// One array task's console/error log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskLog {
    pub index: usize,
    pub text: String,
}

/// Query the scheduler for the job's current state.
///
/// Local-mode jobs have no external id and are terminal by construction.
pub fn poll(client: &SlurmClient, job: &JobDescriptor) -> Result<JobState> {
    if let Some(external_id) = &job.external_id {
        let rows = client.queue_rows(external_id)?;
        if !rows.is_empty() {
            debug!("Job {} has {} queue entries", job.name, rows.len());
            return Ok(JobState::QueuedOrRunning(rows));
        }
    }
    Ok(JobState::CompletedOrStopped(read_task_logs(job)))
}

/// Block until the job reaches a terminal state.
///
/// Implemented by submitting a dependent no-op job with `--wait` rather
/// than busy-polling in this process. Local-mode jobs are already
/// synchronous, so this returns immediately.
pub fn wait_for_completion(client: &SlurmClient, job: &JobDescriptor) -> Result<()> {
    match &job.external_id {
        Some(external_id) => client.wait_for_job(external_id, &job.name),
        None => Ok(()),
    }
}

fn read_task_logs(job: &JobDescriptor) -> Vec<TaskLog> {
    let id = job.external_id.as_deref().unwrap_or(layout::LOCAL_JOB_ID);
    (0..job.task_count)
        .map(|index| {
            let path = job.workdir.join(layout::log_file_name(id, index));
            let text = fs::read_to_string(&path).unwrap_or_default();
            TaskLog { index, text }
        })
        .collect()
}
