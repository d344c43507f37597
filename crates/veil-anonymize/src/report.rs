//! Run report written at the end of `anonymize`.

use std::collections::BTreeMap;

use serde::Serialize;

/// Lifecycle stage of one table, used in log fields and failure reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStage {
    Opening,
    Selecting,
    Excluding,
    Generating,
    Truncating,
    Batching,
    Committing,
    Closing,
    Closed,
}

impl TableStage {
    pub fn as_str(self) -> &'static str {
        match self {
            TableStage::Opening => "opening",
            TableStage::Selecting => "selecting",
            TableStage::Excluding => "excluding",
            TableStage::Generating => "generating",
            TableStage::Truncating => "truncating",
            TableStage::Batching => "batching",
            TableStage::Committing => "committing",
            TableStage::Closing => "closing",
            TableStage::Closed => "closed",
        }
    }
}

/// Counters of a table processed to the end.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableStats {
    pub rows_read: u64,
    pub rows_updated: u64,
    pub commits: u64,
    /// Rows that kept their value, per column.
    pub excluded: BTreeMap<String, u64>,
    /// Values cut to the column size, per column.
    pub truncated: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TableOutcome {
    Succeeded(TableStats),
    Skipped {
        reason: String,
    },
    Failed {
        stage: TableStage,
        message: String,
        /// Rows already committed by earlier batches.
        rows_committed: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableReport {
    pub table: String,
    #[serde(flatten)]
    pub outcome: TableOutcome,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub project: String,
    pub seed: u64,
    pub started_at: String,
    pub duration_ms: u64,
    pub tables: Vec<TableReport>,
}

impl RunReport {
    pub fn new(run_id: String, project: String, seed: u64) -> Self {
        Self {
            run_id,
            project,
            seed,
            started_at: chrono::Utc::now().to_rfc3339(),
            duration_ms: 0,
            tables: Vec::new(),
        }
    }

    /// Report of a table by canonical or bare name.
    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables.iter().find(|report| {
            report.table.eq_ignore_ascii_case(name)
                || report
                    .table
                    .rsplit_once('.')
                    .is_some_and(|(_, bare)| bare.eq_ignore_ascii_case(name))
        })
    }

    pub fn succeeded(&self) -> usize {
        self.count(|outcome| matches!(outcome, TableOutcome::Succeeded(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, TableOutcome::Failed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, TableOutcome::Skipped { .. }))
    }

    fn count(&self, predicate: impl Fn(&TableOutcome) -> bool) -> usize {
        self.tables
            .iter()
            .filter(|report| predicate(&report.outcome))
            .count()
    }
}
