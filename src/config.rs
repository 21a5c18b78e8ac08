//! Layered TOML configuration.
//!
//! Settings are read from a system file, a user file, and a file in the
//! current directory, in that order; later files override earlier ones and
//! anything unspecified falls back to the defaults below.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration for the crate and its CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SarrayConfig {
    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,

    /// Directory under which job working directories are created.
    pub workdir_root: PathBuf,

    /// Scheduler command settings.
    pub slurm: SlurmConfig,
}

impl Default for SarrayConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            workdir_root: PathBuf::from("."),
            slurm: SlurmConfig::default(),
        }
    }
}

/// Settings for invoking the scheduler's CLI tools and the task runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlurmConfig {
    /// Enqueue command.
    pub sbatch: String,
    /// Queue query command.
    pub squeue: String,
    /// Cancel command.
    pub scancel: String,
    /// Executable the generated driver script runs for each array task.
    /// Resolved through PATH on the cluster nodes.
    pub runner: String,
    /// Number of attempts for transient scheduler command failures.
    pub submit_retries: usize,
    /// Delay between retries, in seconds.
    pub retry_delay_secs: u64,
}

impl Default for SlurmConfig {
    fn default() -> Self {
        Self {
            sbatch: "sbatch".to_string(),
            squeue: "squeue".to_string(),
            scancel: "scancel".to_string(),
            runner: "slurm-array".to_string(),
            submit_retries: 6,
            retry_delay_secs: 10,
        }
    }
}

/// Locations searched for configuration files, lowest priority first.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub system: PathBuf,
    pub user: Option<PathBuf>,
    pub local: PathBuf,
}

impl ConfigPaths {
    pub fn new() -> Self {
        Self {
            system: PathBuf::from("/etc/slurm-array/config.toml"),
            user: dirs::config_dir().map(|d| d.join("slurm-array").join("config.toml")),
            local: PathBuf::from("slurm-array.toml"),
        }
    }

    /// The subset of paths that exist on disk, in priority order.
    pub fn existing_paths(&self) -> Vec<&PathBuf> {
        let mut paths = Vec::new();
        for p in [Some(&self.system), self.user.as_ref(), Some(&self.local)]
            .into_iter()
            .flatten()
        {
            if p.exists() {
                paths.push(p);
            }
        }
        paths
    }
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self::new()
    }
}

impl SarrayConfig {
    /// Load from the standard search paths.
    pub fn load() -> Result<Self, String> {
        Self::load_with_paths(&ConfigPaths::new())
    }

    pub fn load_with_paths(paths: &ConfigPaths) -> Result<Self, String> {
        let files: Vec<PathBuf> = paths.existing_paths().into_iter().cloned().collect();
        Self::load_from_files(&files)
    }

    /// Load and merge configuration files; later files override earlier
    /// ones. Missing files are skipped.
    pub fn load_from_files(files: &[PathBuf]) -> Result<Self, String> {
        let mut merged = toml::Table::new();
        for path in files {
            let text = match std::fs::read_to_string(path) {
                Ok(t) => t,
                Err(_) => continue,
            };
            let table: toml::Table = toml::from_str(&text)
                .map_err(|e| format!("failed to parse {}: {}", path.display(), e))?;
            merge_tables(&mut merged, table);
        }
        toml::Value::Table(merged)
            .try_into()
            .map_err(|e| format!("invalid configuration: {e}"))
    }

    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| e.to_string())
    }

    /// Check the loaded values; returns every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        const LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];
        if !LEVELS.contains(&self.log_level.as_str()) {
            errors.push(format!("invalid log_level: {}", self.log_level));
        }
        if self.slurm.submit_retries == 0 {
            errors.push("slurm.submit_retries must be >= 1".to_string());
        }
        if self.slurm.sbatch.is_empty()
            || self.slurm.squeue.is_empty()
            || self.slurm.scancel.is_empty()
            || self.slurm.runner.is_empty()
        {
            errors.push("slurm command names must not be empty".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(b)), toml::Value::Table(o)) => merge_tables(b, o),
            (_, v) => {
                base.insert(key, v);
            }
        }
    }
}
