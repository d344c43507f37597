use std::fs::{OpenOptions, create_dir_all};
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Utc};
use serde::Serialize;
use veil_anonymize::RunReport;
use veil_core::RedactedConnection;

use super::{ArtifactError, ArtifactResult};

/// Serializable engine options for a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOptions {
    pub batch_size: usize,
    pub tables: Vec<String>,
    pub seed: Option<u64>,
    pub sample_limit: usize,
}

/// Metadata captured before the engine starts.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub project: String,
    pub started_at: DateTime<Utc>,
    pub policy_path: PathBuf,
    pub policy_version: String,
    pub run_dir: PathBuf,
    pub options: RunOptions,
    pub connection: RedactedConnection,
}

/// JSON config written to each run directory.
#[derive(Debug, Serialize)]
pub struct RunConfig {
    pub project: String,
    pub started_at: String,
    pub policy_path: String,
    pub policy_version: String,
    pub options: RunOptions,
    pub connection: RedactedConnection,
    pub git: GitInfo,
}

/// Git metadata for reproducibility.
#[derive(Debug, Serialize)]
pub struct GitInfo {
    pub commit: Option<String>,
    pub dirty: Option<bool>,
}

/// Paths for run artifacts.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub root: PathBuf,
    pub logs_path: PathBuf,
    pub report_path: PathBuf,
}

pub fn start_run(ctx: &RunContext) -> ArtifactResult<RunPaths> {
    let timestamp = ctx.started_at.format("%Y-%m-%dT%H-%M-%SZ").to_string();
    let root = ctx
        .run_dir
        .join(format!("{timestamp}__{}", path_label(&ctx.project)));

    create_dir_all(&root)?;

    let config_path = root.join("config.json");
    let logs_path = root.join("logs.jsonl");
    let report_path = root.join("report.json");

    let config = RunConfig {
        project: ctx.project.clone(),
        started_at: ctx.started_at.to_rfc3339(),
        policy_path: ctx.policy_path.display().to_string(),
        policy_version: ctx.policy_version.clone(),
        options: ctx.options.clone(),
        connection: ctx.connection.clone(),
        git: collect_git_info(),
    };

    write_json(&config_path, &config)?;

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&logs_path)?;

    Ok(RunPaths {
        root,
        logs_path,
        report_path,
    })
}

pub fn write_report(paths: &RunPaths, report: &RunReport) -> ArtifactResult<()> {
    write_json(&paths.report_path, report)
}

/// Write `value` as pretty JSON, creating parent directories as needed.
pub fn write_json_file<T: Serialize>(path: &Path, value: &T) -> ArtifactResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_all(parent)?;
        }
    }
    write_json(path, value)
}

pub fn collect_git_info() -> GitInfo {
    let commit = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .and_then(|output| {
            if output.status.success() {
                Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
            } else {
                None
            }
        })
        .filter(|value| !value.is_empty());

    let dirty = Command::new("git")
        .args(["status", "--porcelain"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| !output.stdout.is_empty());

    GitInfo { commit, dirty }
}

/// Project names become directory names; anything outside `[A-Za-z0-9_-]` is replaced.
fn path_label(project: &str) -> String {
    let label: String = project
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if label.is_empty() {
        "run".to_string()
    } else {
        label
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> ArtifactResult<()> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)?;
    serde_json::to_writer_pretty(file, value).map_err(ArtifactError::from)
}
