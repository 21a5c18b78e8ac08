use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{builder::styling, Parser, Subcommand};
use env_logger::Builder;
use log::LevelFilter;

use slurm_array::config::SarrayConfig;
use slurm_array::descriptor::JobDescriptor;
use slurm_array::slurm::SlurmClient;
use slurm_array::status::JobState;
use slurm_array::{classify, cleanup, collect, runner, status};

const STYLES: styling::Styles = styling::Styles::styled()
    .header(styling::AnsiColor::Green.on_default().bold())
    .usage(styling::AnsiColor::Green.on_default().bold())
    .literal(styling::AnsiColor::Cyan.on_default().bold())
    .placeholder(styling::AnsiColor::Cyan.on_default());

#[derive(Parser)]
#[command(name = "slurm-array")]
#[command(about = "Job-array orchestration over a Slurm cluster", long_about = None)]
#[command(styles = STYLES)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one array index of a job (invoked by the generated driver script)
    RunTask {
        /// Job working directory
        #[arg(long)]
        dir: PathBuf,
        /// Array task index
        #[arg(long)]
        index: usize,
    },
    /// Show queue/run state, or per-task logs once the job is terminal
    Status {
        /// Job working directory
        #[arg()]
        dir: PathBuf,
    },
    /// Concatenate per-task result files into one ordered collection
    Collect {
        /// Job working directory
        #[arg()]
        dir: PathBuf,
        /// Wait for the job to reach a terminal state first
        #[arg(long, default_value = "false")]
        block: bool,
    },
    /// List array indices whose tasks were killed for exceeding memory
    ClassifyOom {
        /// Job working directory
        #[arg()]
        dir: PathBuf,
    },
    /// Ask the scheduler to terminate all of the job's tasks
    Cancel {
        /// Job working directory
        #[arg()]
        dir: PathBuf,
    },
    /// Remove the job working directory and everything in it
    Cleanup {
        /// Job working directory
        #[arg()]
        dir: PathBuf,
        /// Wait for the job to reach a terminal state first
        #[arg(long, default_value = "false")]
        block: bool,
    },
}

fn init_logging(config: &SarrayConfig) {
    let level = config
        .log_level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::Info);
    Builder::from_env(env_logger::Env::default().default_filter_or(level.to_string())).init();
}

fn load_job(dir: &PathBuf) -> Result<JobDescriptor> {
    JobDescriptor::load(dir)
        .with_context(|| format!("failed to load job manifest from {}", dir.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = SarrayConfig::load().unwrap_or_default();
    init_logging(&config);
    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("configuration error: {e}");
        }
        anyhow::bail!("invalid configuration");
    }
    let client = SlurmClient::new(config.slurm.clone());

    match cli.command {
        Commands::RunTask { dir, index } => {
            runner::run_task(&dir, index, None)?;
        }
        Commands::Status { dir } => {
            let job = load_job(&dir)?;
            match status::poll(&client, &job)? {
                JobState::QueuedOrRunning(rows) => {
                    println!("Job {} is queued or running:", job.name);
                    for row in rows {
                        println!("{:<20} {:<8} {}", row.node, row.state, row.elapsed);
                    }
                }
                JobState::CompletedOrStopped(logs) => {
                    println!("Job {} is completed or stopped", job.name);
                    for log in logs {
                        if !log.text.is_empty() {
                            println!("--- task {} ---", log.index);
                            print!("{}", log.text);
                        }
                    }
                }
            }
        }
        Commands::Collect { dir, block } => {
            let job = load_job(&dir)?;
            let collected = collect::collect(&client, &job, None, block)?;
            for name in &collected.missing_files {
                eprintln!("missing: {name}");
            }
            match collected.results {
                Some(collect::Results::Tabular(rows)) => {
                    println!("{}", serde_json::to_string_pretty(&rows)?)
                }
                Some(collect::Results::Opaque(values)) => {
                    println!("{}", serde_json::to_string_pretty(&values)?)
                }
                None => eprintln!("no result files present"),
            }
        }
        Commands::ClassifyOom { dir } => {
            let job = load_job(&dir)?;
            let killed = classify::classify_oom(&job)?;
            if killed.is_empty() {
                eprintln!("no OOM-killed tasks detected");
            } else {
                println!("{}", classify::collapse_ranges(&killed).join(","));
            }
        }
        Commands::Cancel { dir } => {
            let job = load_job(&dir)?;
            cleanup::cancel(&client, &job)?;
        }
        Commands::Cleanup { dir, block } => {
            let job = load_job(&dir)?;
            cleanup::cleanup(&client, &job, block)?;
        }
    }
    Ok(())
}
