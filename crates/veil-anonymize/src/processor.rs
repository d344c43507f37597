//! Per-table row processing: exclusions, generation, truncation and batching.

use std::collections::HashMap;

use futures::StreamExt;
use tracing::{debug, warn};
use veil_core::{ColumnMetaData, Dialect, TableMetaData, Value, ValueType, convert, is_convertible};
use veil_functions::CallContext;

use crate::errors::AnonymizeError;
use crate::query::{SelectQuery, UpdateQuery, validate_identifier};
use crate::report::{TableStage, TableStats};
use crate::requirement::{ResolvedColumn, ResolvedTable};
use crate::session::{ReadSession, Row, WriteSession};

#[derive(Debug)]
struct Target<'r> {
    column: &'r ResolvedColumn,
    /// Position in the selected row.
    index: usize,
    /// Type of the database column, when it differs from the declared one.
    native: Option<ValueType>,
    size: Option<usize>,
}

/// Table checked against its metadata, with its statements built.
#[derive(Debug)]
pub struct TableJob<'r> {
    pub table: &'r ResolvedTable,
    pub metadata: TableMetaData,
    pub select: SelectQuery,
    pub update: UpdateQuery,
    targets: Vec<Target<'r>>,
    keys: Vec<usize>,
    positions: HashMap<String, usize>,
}

impl<'r> TableJob<'r> {
    /// Check keys and referenced columns against `metadata` and build the
    /// SELECT and UPDATE statements.
    pub fn prepare(
        table: &'r ResolvedTable,
        metadata: TableMetaData,
        dialect: Dialect,
    ) -> Result<Self, AnonymizeError> {
        let canonical = metadata.canonical_name();
        let lookup = |name: &str| metadata_column(&metadata, name);

        let key_names: Vec<String> = if table.declared_keys.is_empty() {
            metadata
                .primary_keys()
                .into_iter()
                .map(str::to_string)
                .collect()
        } else {
            table.declared_keys.clone()
        };
        if key_names.is_empty() {
            return Err(AnonymizeError::MissingKey(table.name.clone()));
        }
        let keys = key_names
            .iter()
            .map(|name| lookup(name.as_str()))
            .collect::<Result<Vec<_>, _>>()?;

        let targets = table
            .columns
            .iter()
            .map(|column| lookup(column.name.as_str()))
            .collect::<Result<Vec<_>, _>>()?;
        for (column, meta) in table.columns.iter().zip(&targets) {
            if !is_convertible(&column.value_type, &meta.value_type) {
                warn!(
                    table = %canonical,
                    column = %column.name,
                    declared = %column.value_type,
                    actual = %meta.value_type,
                    "declared column type does not match metadata"
                );
            }
        }

        let mut selected: Vec<&ColumnMetaData> = keys.iter().chain(&targets).copied().collect();
        for name in table.extra_columns() {
            let column = lookup(name)?;
            if !selected
                .iter()
                .any(|seen| seen.name.eq_ignore_ascii_case(&column.name))
            {
                selected.push(column);
            }
        }
        for name in table.excludes.columns() {
            lookup(name)?;
        }

        let mut positions = HashMap::new();
        for (idx, column) in selected.iter().enumerate() {
            positions
                .entry(column.name.to_ascii_lowercase())
                .or_insert(idx);
        }

        let select = SelectQuery::build(
            dialect,
            &metadata,
            &selected,
            table.filter.as_deref(),
            &table.excludes,
        )?;
        let update = UpdateQuery::build(dialect, &metadata, &targets, &keys)?;
        let targets = table
            .columns
            .iter()
            .zip(&targets)
            .enumerate()
            .map(|(offset, (column, meta))| Target {
                column,
                index: keys.len() + offset,
                native: (meta.value_type != column.value_type).then(|| meta.value_type.clone()),
                size: meta.size,
            })
            .collect();
        let keys = (0..key_names.len()).collect();

        Ok(Self {
            table,
            metadata,
            select,
            update,
            targets,
            keys,
            positions,
        })
    }

    pub fn name(&self) -> String {
        self.metadata.canonical_name()
    }

    fn value<'v>(&self, row: &'v [Value], column: &str) -> Option<&'v Value> {
        self.positions
            .get(&column.to_ascii_lowercase())
            .and_then(|&idx| row.get(idx))
    }

    /// New SET values followed by the key values of `row`.
    fn bind_row(
        &self,
        row: &[Value],
        ctx: &mut CallContext<'_>,
        progress: &mut TableProgress,
    ) -> Result<Row, AnonymizeError> {
        let lookup = |column: &str| self.value(row, column);
        let mut bound = Vec::with_capacity(self.targets.len() + self.keys.len());

        for target in &self.targets {
            let name = &target.column.name;
            let current = row.get(target.index).cloned().unwrap_or(Value::Null);

            progress.stage = TableStage::Excluding;
            if target.column.is_excluded(&current, lookup) {
                *progress.stats.excluded.entry(name.clone()).or_insert(0) += 1;
                bound.push(current);
                continue;
            }

            progress.stage = TableStage::Generating;
            let generated = target
                .column
                .plan
                .invoke(ctx, &current)
                .map_err(|source| AnonymizeError::Generation {
                    column: name.clone(),
                    source,
                })?;
            let generated = match &target.native {
                Some(native) => {
                    convert(generated, native).map_err(|source| AnonymizeError::Conversion {
                        column: name.clone(),
                        source,
                    })?
                }
                None => generated,
            };

            progress.stage = TableStage::Truncating;
            let value = match target.size {
                Some(size) => {
                    let truncated = generated.clone().truncated(size);
                    if truncated != generated {
                        *progress.stats.truncated.entry(name.clone()).or_insert(0) += 1;
                    }
                    truncated
                }
                None => generated,
            };
            bound.push(value);
        }

        for &idx in &self.keys {
            bound.push(row.get(idx).cloned().unwrap_or(Value::Null));
        }
        Ok(bound)
    }
}

fn metadata_column<'m>(
    metadata: &'m TableMetaData,
    name: &str,
) -> Result<&'m ColumnMetaData, AnonymizeError> {
    validate_identifier(name)?;
    metadata
        .column(name)
        .ok_or_else(|| AnonymizeError::UnknownColumn {
            table: metadata.canonical_name(),
            column: name.to_string(),
        })
}

/// Progress of the table being processed; survives a failure for reporting.
#[derive(Debug, Clone)]
pub struct TableProgress {
    pub stage: TableStage,
    pub stats: TableStats,
    /// Bound rows of the batches committed so far.
    pub rows_committed: u64,
}

impl Default for TableProgress {
    fn default() -> Self {
        Self {
            stage: TableStage::Opening,
            stats: TableStats::default(),
            rows_committed: 0,
        }
    }
}

/// Stream the rows of `job`, generate substitutes and write them back,
/// committing every `batch_size` rows.
pub async fn process_table<R, W>(
    job: &TableJob<'_>,
    read: &mut R,
    write: &mut W,
    ctx: &mut CallContext<'_>,
    batch_size: usize,
    progress: &mut TableProgress,
) -> Result<(), AnonymizeError>
where
    R: ReadSession + ?Sized,
    W: WriteSession + ?Sized,
{
    progress.stage = TableStage::Selecting;
    let mut rows = read.stream_rows(&job.select);
    let mut batch: Vec<Row> = Vec::with_capacity(batch_size);

    while let Some(row) = rows.next().await {
        let row = row?;
        progress.stats.rows_read += 1;
        let bound = job.bind_row(&row, ctx, progress)?;

        progress.stage = TableStage::Batching;
        batch.push(bound);
        if batch.len() >= batch_size {
            flush(job, write, &mut batch, progress).await?;
        }
        progress.stage = TableStage::Selecting;
    }
    drop(rows);

    if !batch.is_empty() {
        flush(job, write, &mut batch, progress).await?;
    }
    progress.stage = TableStage::Closing;
    Ok(())
}

async fn flush<W>(
    job: &TableJob<'_>,
    write: &mut W,
    batch: &mut Vec<Row>,
    progress: &mut TableProgress,
) -> Result<(), AnonymizeError>
where
    W: WriteSession + ?Sized,
{
    progress.stage = TableStage::Batching;
    let updated = write.execute_batch(&job.update, batch).await?;

    progress.stage = TableStage::Committing;
    write.commit().await?;
    progress.stats.rows_updated += updated;
    progress.stats.commits += 1;
    progress.rows_committed += batch.len() as u64;

    debug!(
        table = %job.update.table,
        rows = batch.len(),
        commits = progress.stats.commits,
        "batch committed"
    );
    batch.clear();
    Ok(())
}
