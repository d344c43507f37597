//! Run orchestration: resolve, preflight, sample, then process each table.

use std::time::Instant;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};
use veil_functions::{CallContext, FunctionCatalog, SampleStore};
use veil_introspect::MetadataProvider;
use veil_policy::Requirement;

use crate::errors::{AnonymizeError, error_chain};
use crate::processor::{TableJob, TableProgress, process_table};
use crate::report::{RunReport, TableOutcome, TableReport, TableStage};
use crate::requirement::{ResolvedRequirement, ResolvedTable};
use crate::session::{ReadSession, WriteSession};

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_SAMPLE_LIMIT: usize = 1000;

/// Run options supplied by the caller.
#[derive(Debug, Clone)]
pub struct AnonymizeOptions {
    /// Rows per committed batch.
    pub batch_size: usize,
    /// Table name filters, case-insensitive; empty selects every table.
    pub tables: Vec<String>,
    /// Overrides the document seed.
    pub seed: Option<u64>,
    /// Distinct values prefetched per sampled column.
    pub sample_limit: usize,
}

impl Default for AnonymizeOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            tables: Vec::new(),
            seed: None,
            sample_limit: DEFAULT_SAMPLE_LIMIT,
        }
    }
}

impl AnonymizeOptions {
    fn validate(&self) -> Result<(), AnonymizeError> {
        if self.batch_size == 0 {
            return Err(AnonymizeError::InvalidOptions(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    fn selects(&self, table: &ResolvedTable) -> bool {
        self.tables.is_empty() || self.tables.iter().any(|filter| table.matches(filter))
    }
}

/// Anonymize every selected table of `requirement`.
///
/// Configuration errors are returned before any row is read. Failures while
/// processing a table are rolled back, logged and recorded in the report; the
/// remaining tables still run.
pub async fn anonymize<R, W>(
    requirement: &Requirement,
    catalog: &FunctionCatalog,
    metadata: &dyn MetadataProvider,
    read: &mut R,
    write: &mut W,
    options: &AnonymizeOptions,
) -> Result<RunReport, AnonymizeError>
where
    R: ReadSession + ?Sized,
    W: WriteSession + ?Sized,
{
    let started = Instant::now();
    options.validate()?;
    let resolved = ResolvedRequirement::resolve(requirement, catalog)?;
    let seed = options
        .seed
        .or(resolved.seed)
        .unwrap_or_else(rand::random::<u64>);
    let run_id = uuid::Uuid::new_v4().to_string();
    let mut report = RunReport::new(run_id.clone(), resolved.project.clone(), seed);

    info!(
        event = "run_started",
        run_id = %run_id,
        project = %resolved.project,
        seed,
        tables = resolved.tables.len(),
        batch_size = options.batch_size,
        engine = metadata.engine(),
        "anonymization started"
    );

    for filter in &options.tables {
        if !resolved.tables.iter().any(|table| table.matches(filter)) {
            warn!(filter = %filter, "table filter matches no table of the document");
        }
    }

    let mut jobs = Vec::new();
    for table in &resolved.tables {
        if !options.selects(table) {
            continue;
        }
        let meta = metadata
            .table(&table.name)
            .await
            .map_err(|source| AnonymizeError::Metadata {
                table: table.name.clone(),
                source,
            })?;
        jobs.push(TableJob::prepare(table, meta, read.dialect())?);
    }

    let samples = prefetch_samples(&jobs, read, options.sample_limit).await?;

    for table in &resolved.tables {
        if !options.selects(table) {
            info!(event = "table_skipped", table = %table.name, "table not selected");
            report.tables.push(TableReport {
                table: table.name.clone(),
                outcome: TableOutcome::Skipped {
                    reason: "not selected".to_string(),
                },
                duration_ms: 0,
            });
            continue;
        }
        let Some(job) = jobs.iter().find(|job| std::ptr::eq(job.table, table)) else {
            continue;
        };
        let table_report = run_table(job, read, write, &samples, seed, options.batch_size).await;
        report.tables.push(table_report);
    }

    report.duration_ms = elapsed_ms(started);
    info!(
        event = "run_completed",
        run_id = %run_id,
        succeeded = report.succeeded(),
        failed = report.failed(),
        skipped = report.skipped(),
        duration_ms = report.duration_ms,
        "anonymization completed"
    );
    Ok(report)
}

async fn prefetch_samples<R>(
    jobs: &[TableJob<'_>],
    read: &mut R,
    limit: usize,
) -> Result<SampleStore, AnonymizeError>
where
    R: ReadSession + ?Sized,
{
    let mut requests = Vec::new();
    for request in jobs.iter().flat_map(|job| job.table.sample_requests()) {
        if !requests.contains(&request) {
            requests.push(request);
        }
    }

    let mut store = SampleStore::new();
    for request in &requests {
        let values = read
            .fetch_distinct(&request.table, &request.column, limit)
            .await
            .map_err(|source| AnonymizeError::Sampling {
                table: request.table.clone(),
                column: request.column.clone(),
                source,
            })?;
        info!(
            event = "column_sampled",
            table = %request.table,
            column = %request.column,
            values = values.len(),
            "sample values loaded"
        );
        store.insert(request, values);
    }
    Ok(store)
}

async fn run_table<R, W>(
    job: &TableJob<'_>,
    read: &mut R,
    write: &mut W,
    samples: &SampleStore,
    seed: u64,
    batch_size: usize,
) -> TableReport
where
    R: ReadSession + ?Sized,
    W: WriteSession + ?Sized,
{
    let started = Instant::now();
    let name = job.name();
    info!(
        event = "table_started",
        table = %name,
        columns = job.update.set_columns.len(),
        "table started"
    );

    let mut rng = table_rng(seed, &name);
    let mut ctx = CallContext::new(&mut rng, samples);
    let mut progress = TableProgress::default();
    let result = process_table(job, read, write, &mut ctx, batch_size, &mut progress).await;

    let outcome = match result {
        Ok(()) => {
            progress.stage = TableStage::Closed;
            info!(
                event = "table_completed",
                table = %name,
                rows_read = progress.stats.rows_read,
                rows_updated = progress.stats.rows_updated,
                commits = progress.stats.commits,
                "table completed"
            );
            TableOutcome::Succeeded(progress.stats)
        }
        Err(err) => {
            let message = error_chain(&err);
            error!(
                event = "table_failed",
                table = %name,
                stage = progress.stage.as_str(),
                rows_committed = progress.rows_committed,
                error = %message,
                "table failed"
            );
            if let Err(rollback) = write.rollback().await {
                warn!(
                    table = %name,
                    error = %error_chain(&rollback),
                    "rollback failed"
                );
            }
            TableOutcome::Failed {
                stage: progress.stage,
                message,
                rows_committed: progress.rows_committed,
            }
        }
    };

    TableReport {
        table: name,
        outcome,
        duration_ms: elapsed_ms(started),
    }
}

/// Per-table generator: the run seed hashed with the lowercased table name.
fn table_rng(seed: u64, table: &str) -> ChaCha8Rng {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_le_bytes());
    hasher.update(table.to_ascii_lowercase().as_bytes());
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&hasher.finalize());
    ChaCha8Rng::from_seed(bytes)
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
