//! Error taxonomy for the orchestration layer.
//!
//! Only two failure classes are surfaced to callers as errors: malformed
//! caller input detected before anything is written (`Configuration`) and
//! scheduler interaction failures (`Submission`). Remote task failures are
//! never errors here; they show up as missing result files and log content,
//! discoverable through polling, collection, and classification.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed caller input. Raised before any artifact is written.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The external scheduler is unreachable or produced unparseable output.
    #[error("submission failed: {0}")]
    Submission(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
