mod registry;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use registry::{RunContext, RunOptions, init_logging, start_run, write_json_file, write_report};
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use veil_anonymize::{
    AnonymizeError, AnonymizeOptions, DEFAULT_BATCH_SIZE, DEFAULT_SAMPLE_LIMIT, PgReadSession,
    PgWriteSession, ResolvedRequirement, SessionError, TableOutcome, anonymize, error_chain,
};
use veil_core::{Dialect, redact_connection_string, url_scheme};
use veil_functions::FunctionCatalog;
use veil_introspect::PostgresMetadata;
use veil_policy::{LoadedPolicy, PolicyError, load_policy, policy_json_schema};

#[derive(Debug, Error)]
enum CliError {
    #[error("run artifacts: {0}")]
    Artifacts(#[from] registry::ArtifactError),
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),
    #[error("anonymization failed")]
    Anonymize(#[from] AnonymizeError),
    #[error("session error: {0}")]
    Session(#[from] SessionError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("json serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("unsupported engine: {0}")]
    UnsupportedEngine(String),
}

#[derive(Parser, Debug)]
#[command(name = "veil", version, about = "Policy-driven in-place data anonymization")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Anonymize a database according to a policy document.
    Anonymize(AnonymizeArgs),
    /// Validate a policy document and resolve all of its plans.
    Validate(ValidateArgs),
    /// Print the JSON Schema of policy documents.
    Schema(SchemaArgs),
    /// List the registered function signatures.
    Functions,
}

#[derive(Args, Debug)]
struct AnonymizeArgs {
    /// Policy document (JSON).
    #[arg(long, value_name = "FILE")]
    policy: PathBuf,
    /// Database connection string.
    #[arg(long, value_name = "CONNECTION_STRING")]
    conn: String,
    /// Rows per committed batch.
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,
    /// Only process these tables (repeatable, case-insensitive).
    #[arg(long = "table", value_name = "TABLE")]
    tables: Vec<String>,
    /// Seed overriding the document seed.
    #[arg(long)]
    seed: Option<u64>,
    /// Distinct values prefetched per sampled column.
    #[arg(long, default_value_t = DEFAULT_SAMPLE_LIMIT)]
    sample_limit: usize,
    /// Output directory for runs.
    #[arg(long, default_value = "runs")]
    run_dir: PathBuf,
}

#[derive(Args, Debug)]
struct ValidateArgs {
    /// Policy document (JSON).
    #[arg(long, value_name = "FILE")]
    policy: PathBuf,
}

#[derive(Args, Debug)]
struct SchemaArgs {
    /// Write the schema here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Anonymize(args) => run_anonymize(args).await,
        Command::Validate(args) => run_validate(args),
        Command::Schema(args) => run_schema(args),
        Command::Functions => run_functions(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", error_chain(&err));
            ExitCode::FAILURE
        }
    }
}

async fn run_anonymize(args: AnonymizeArgs) -> Result<(), CliError> {
    let AnonymizeArgs {
        policy,
        conn,
        batch_size,
        tables,
        seed,
        sample_limit,
        run_dir,
    } = args;

    let engine = detect_engine(&conn)?;
    let loaded = load_policy(&policy)?;
    let requirement = &loaded.requirement;

    let options = AnonymizeOptions {
        batch_size,
        tables,
        seed,
        sample_limit,
    };
    let run_ctx = RunContext {
        project: requirement.project.clone(),
        started_at: chrono::Utc::now(),
        policy_path: policy.clone(),
        policy_version: requirement.version.clone(),
        run_dir,
        options: RunOptions {
            batch_size: options.batch_size,
            tables: options.tables.clone(),
            seed: options.seed,
            sample_limit: options.sample_limit,
        },
        connection: redact_connection_string(&conn),
    };

    let run_paths = start_run(&run_ctx)?;
    init_logging(Some(&run_paths.logs_path))?;

    tracing::info!(
        event = "policy_loaded",
        path = %policy.display(),
        project = %requirement.project,
        tables = requirement.tables.len(),
        engine = engine.as_str(),
        connection = %run_ctx.connection.redacted
    );
    log_warnings(&loaded);

    // one connection for metadata lookups, one for the read cursor, one for writes
    let connections = if engine.separate_write_connection() { 3 } else { 2 };
    let pool = PgPoolOptions::new()
        .max_connections(connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&conn)
        .await?;
    tracing::info!(event = "database_connected");

    let catalog = FunctionCatalog::with_builtins();
    let metadata = PostgresMetadata::new(pool.clone());
    let mut read = PgReadSession::connect(&pool).await?;
    let mut write = PgWriteSession::new(pool.clone());

    let report = anonymize(
        requirement,
        &catalog,
        &metadata,
        &mut read,
        &mut write,
        &options,
    )
    .await?;

    write_report(&run_paths, &report)?;
    tracing::info!(event = "report_written", path = %run_paths.report_path.display());

    for table in &report.tables {
        let status = match &table.outcome {
            TableOutcome::Succeeded(stats) => format!(
                "ok ({} rows read, {} updated, {} commits)",
                stats.rows_read, stats.rows_updated, stats.commits
            ),
            TableOutcome::Skipped { reason } => format!("skipped ({reason})"),
            TableOutcome::Failed { stage, message, .. } => {
                format!("failed at {}: {message}", stage.as_str())
            }
        };
        println!("{}: {status}", table.table);
    }
    println!(
        "run {}: {} succeeded, {} failed, {} skipped; report at {}",
        report.run_id,
        report.succeeded(),
        report.failed(),
        report.skipped(),
        run_paths.report_path.display()
    );

    drop(read);
    drop(write);
    pool.close().await;
    Ok(())
}

fn run_validate(args: ValidateArgs) -> Result<(), CliError> {
    init_logging(None)?;
    let loaded = load_policy(&args.policy)?;
    log_warnings(&loaded);

    let resolved = ResolvedRequirement::resolve(&loaded.requirement, &FunctionCatalog::with_builtins())?;
    let columns: usize = resolved.tables.iter().map(|table| table.columns.len()).sum();
    println!(
        "policy '{}' is valid: {} tables, {} columns, {} warnings",
        resolved.project,
        resolved.tables.len(),
        columns,
        loaded.warnings.len()
    );
    Ok(())
}

fn run_schema(args: SchemaArgs) -> Result<(), CliError> {
    let schema = policy_json_schema();
    match args.out {
        Some(path) => {
            write_json_file(&path, &schema)?;
            eprintln!("schema written to {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&schema)?),
    }
    Ok(())
}

fn run_functions() -> Result<(), CliError> {
    let mut signatures: Vec<String> = FunctionCatalog::with_builtins()
        .signatures()
        .iter()
        .map(ToString::to_string)
        .collect();
    signatures.sort();
    for signature in signatures {
        println!("{signature}");
    }
    Ok(())
}

fn log_warnings(loaded: &LoadedPolicy) {
    for warning in &loaded.warnings {
        tracing::warn!(
            event = "policy_warning",
            code = %warning.code,
            path = %warning.path,
            "{}",
            warning.message
        );
    }
}

fn detect_engine(conn: &str) -> Result<Dialect, CliError> {
    if let Some(dialect) = Dialect::from_url(conn) {
        return Ok(dialect);
    }
    match url_scheme(conn) {
        Some(scheme) => Err(CliError::UnsupportedEngine(scheme.to_ascii_lowercase())),
        None => Err(CliError::InvalidConfig(
            "connection string must be a URL such as postgres://host/db".to_string(),
        )),
    }
}
