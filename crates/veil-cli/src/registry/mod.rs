//! Run directories.
//!
//! Every `veil anonymize` run gets `<run-dir>/<timestamp>__<project>/` holding
//! `config.json` (redacted connection, options, git state), `logs.jsonl` and
//! `report.json`.

mod logging;
mod run;

pub use logging::init_logging;
pub use run::{RunContext, RunOptions, start_run, write_json_file, write_report};

use thiserror::Error;

/// Failure writing a run artifact or installing the log subscriber.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("cannot write run artifact: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot serialize run artifact: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cannot install log subscriber: {0}")]
    Logging(String),
}

pub type ArtifactResult<T> = Result<T, ArtifactError>;
