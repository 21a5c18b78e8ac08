//! slurm-array: dispatch a computation over many parameter sets onto a
//! cluster's job-array mechanism and reassemble the distributed results.
//!
//! The scheduler itself is an external collaborator reached through its
//! CLI tools; this crate is the orchestration layer around it: chunk
//! planning, artifact generation, submission, status polling, tolerant
//! result aggregation, and out-of-memory failure classification, all
//! coordinated through a shared-filesystem working directory per job.

pub mod artifacts;
pub mod chunk;
pub mod classify;
pub mod cleanup;
pub mod collect;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod layout;
pub mod runner;
pub mod slurm;
pub mod status;
pub mod submit;

pub use chunk::{chunk_bounds, plan_chunks, ChunkPlan};
pub use classify::classify_oom;
pub use cleanup::{cancel, cleanup};
pub use collect::{collect, Collected, Results};
pub use config::SarrayConfig;
pub use descriptor::{JobDescriptor, OutputKind, TaskCommand};
pub use error::{Error, Result};
pub use slurm::SlurmClient;
pub use status::{poll, wait_for_completion, JobState};
pub use submit::{submit_map, submit_single, submit_tabular, SubmitOptions};
