//! Slurm scheduler interface.
//!
//! Thin wrapper over the sbatch/squeue/scancel command-line tools. The
//! string parsers over their output are the most fragile part of the whole
//! system, so they live here as small named functions and nowhere else.

use std::path::Path;
use std::process::Command;
use std::thread;
use std::time::Duration;

use log::{debug, error, info, trace, warn};

use crate::config::SlurmConfig;
use crate::error::{Error, Result};

/// One row of the scheduler's queue output for an array task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRow {
    pub node: String,
    pub state: String,
    pub elapsed: String,
}

/// Client for the external Slurm scheduler CLI.
pub struct SlurmClient {
    config: SlurmConfig,
}

impl SlurmClient {
    pub fn new(config: SlurmConfig) -> Self {
        Self { config }
    }

    /// Get the sbatch executable path (allows for testing with fake binary)
    fn sbatch_exec(&self) -> String {
        std::env::var("SARRAY_FAKE_SBATCH").unwrap_or_else(|_| self.config.sbatch.clone())
    }

    /// Get the squeue executable path (allows for testing with fake binary)
    fn squeue_exec(&self) -> String {
        std::env::var("SARRAY_FAKE_SQUEUE").unwrap_or_else(|_| self.config.squeue.clone())
    }

    /// Get the scancel executable path (allows for testing with fake binary)
    fn scancel_exec(&self) -> String {
        std::env::var("SARRAY_FAKE_SCANCEL").unwrap_or_else(|_| self.config.scancel.clone())
    }

    /// Get the executable the generated driver script runs for each array
    /// task (allows for testing with fake binary)
    pub fn runner_exec(&self) -> String {
        std::env::var("SARRAY_RUNNER").unwrap_or_else(|_| self.config.runner.clone())
    }

    /// Probe whether the scheduler tools are usable from this host.
    pub fn is_available(&self) -> bool {
        let squeue = self.squeue_exec();
        match Command::new(&squeue).arg("--version").output() {
            Ok(output) => output.status.success(),
            Err(e) => {
                debug!("squeue probe failed: {}", e);
                false
            }
        }
    }

    /// Run a command with retries for transient errors.
    fn run_command_with_retries(
        &self,
        cmd: &str,
        args: &[&str],
        cwd: Option<&Path>,
        ignore_errors: &[&str],
    ) -> Result<(i32, String, String)> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            trace!("Running command: {} {:?} (attempt {})", cmd, args, attempts);

            let mut command = Command::new(cmd);
            command.args(args);
            if let Some(dir) = cwd {
                command.current_dir(dir);
            }
            let output = command
                .output()
                .map_err(|e| Error::Submission(format!("failed to run {cmd}: {e}")))?;

            let stdout = String::from_utf8_lossy(&output.stdout).to_string();
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            let return_code = output.status.code().unwrap_or(-1);

            let should_ignore = ignore_errors
                .iter()
                .any(|err| stderr.contains(err) || stdout.contains(err));

            if return_code == 0 || should_ignore || attempts >= self.config.submit_retries {
                return Ok((return_code, stdout, stderr));
            }

            warn!(
                "Command failed (attempt {}/{}): {} - {}",
                attempts, self.config.submit_retries, return_code, stderr
            );
            thread::sleep(Duration::from_secs(self.config.retry_delay_secs));
        }
    }

    /// Enqueue a submission directive; returns the scheduler-assigned id.
    ///
    /// Runs from `workdir` so the directive's relative output paths land in
    /// the job's working directory.
    pub fn submit(&self, script: &Path, workdir: &Path) -> Result<String> {
        let sbatch = self.sbatch_exec();
        let script_str = script.to_string_lossy();

        let (return_code, stdout, stderr) =
            self.run_command_with_retries(&sbatch, &[&script_str], Some(workdir), &[])?;

        if return_code != 0 {
            return Err(Error::Submission(format!(
                "{sbatch} exited with {return_code}: {stderr}"
            )));
        }

        match parse_submit_output(&stdout) {
            Some(job_id) => {
                info!("Submitted Slurm job id={}", job_id);
                Ok(job_id)
            }
            None => {
                error!("Failed to parse sbatch output: {}", stdout);
                Err(Error::Submission(format!(
                    "could not parse a job id from sbatch output: {stdout:?}"
                )))
            }
        }
    }

    /// Query the queue for a job's array tasks. Empty means the job has no
    /// queued or running entries (terminal state).
    pub fn queue_rows(&self, external_id: &str) -> Result<Vec<QueueRow>> {
        let squeue = self.squeue_exec();
        let (return_code, stdout, stderr) = self.run_command_with_retries(
            &squeue,
            &[
                "-h",
                "-j",
                external_id,
                "--Format",
                "NodeList,StateCompact,TimeUsed",
            ],
            None,
            &["Invalid job id specified"],
        )?;

        if return_code != 0 {
            if stderr.contains("Invalid job id specified") {
                // The scheduler has already forgotten the job.
                return Ok(Vec::new());
            }
            return Err(Error::Submission(format!(
                "squeue exited with {return_code}: {stderr}"
            )));
        }

        Ok(parse_queue_output(&stdout))
    }

    /// Ask the scheduler to terminate every task sharing `name`. Advisory:
    /// does not block until termination is confirmed.
    pub fn cancel_by_name(&self, name: &str) -> Result<()> {
        let scancel = self.scancel_exec();
        let (return_code, _stdout, stderr) =
            self.run_command_with_retries(&scancel, &["--name", name], None, &[])?;
        if return_code != 0 {
            error!("Failed to cancel Slurm job {}: {}", name, stderr);
        } else {
            info!("Canceled Slurm job {}", name);
        }
        Ok(())
    }

    /// Block until `external_id` reaches a terminal state by submitting a
    /// dependent no-op job with `--wait` instead of busy-polling.
    pub fn wait_for_job(&self, external_id: &str, name: &str) -> Result<()> {
        let sbatch = self.sbatch_exec();
        let dependency = format!("--dependency=afterany:{external_id}");
        let job_name = format!("--job-name={name}_wait");
        let (return_code, _stdout, stderr) = self.run_command_with_retries(
            &sbatch,
            &[
                &dependency,
                &job_name,
                "--wait",
                "--output=/dev/null",
                "--wrap",
                "true",
            ],
            None,
            &[],
        )?;
        if return_code != 0 {
            return Err(Error::Submission(format!(
                "wait barrier submission failed: {stderr}"
            )));
        }
        Ok(())
    }
}

/// Extract the job id from the enqueue tool's confirmation line: the last
/// whitespace-delimited token, which must be numeric ("Submitted batch job
/// 48163" -> "48163").
pub fn parse_submit_output(stdout: &str) -> Option<String> {
    let token = stdout.split_whitespace().last()?;
    if !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()) {
        Some(token.to_string())
    } else {
        None
    }
}

/// Parse squeue rows of (node, state code, elapsed time). Malformed lines
/// are skipped with a warning rather than failing the poll.
pub fn parse_queue_output(stdout: &str) -> Vec<QueueRow> {
    let mut rows = Vec::new();
    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 3 {
            warn!("Skipping malformed squeue line: {}", line);
            continue;
        }
        rows.push(QueueRow {
            node: fields[0].to_string(),
            state: fields[1].to_string(),
            elapsed: fields[2].to_string(),
        });
    }
    rows
}
