//! In-memory sessions over a shared table map.
//!
//! `SELECT` statements are not parsed: table-level excludes are evaluated in
//! process, and the free-form `where` clause only shows up in the recorded
//! [`MemoryDatabase::selects`]. Updates become visible on commit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::StreamExt;
use veil_core::{Dialect, Value};

use crate::errors::SessionError;
use crate::query::{SelectQuery, UpdateQuery};
use crate::session::{ReadSession, Row, RowStream, WriteSession};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl MemoryTable {
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|column| column.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn with_row(mut self, row: Vec<Value>) -> Self {
        self.rows.push(row);
        self
    }

    fn index(&self, column: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|name| name.eq_ignore_ascii_case(column))
    }

    fn indices(&self, columns: &[String]) -> Result<Vec<usize>, SessionError> {
        columns
            .iter()
            .map(|column| {
                self.index(column)
                    .ok_or_else(|| SessionError::Other(format!("unknown column '{column}'")))
            })
            .collect()
    }

    /// Value of `column` in `row`, by column name.
    pub fn value<'a>(&'a self, row: &'a [Value], column: &str) -> Option<&'a Value> {
        self.index(column).and_then(|idx| row.get(idx))
    }
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, MemoryTable>,
    selects: Vec<SelectQuery>,
    commits: usize,
    rollbacks: usize,
}

impl State {
    fn table(&self, name: &str) -> Result<&MemoryTable, SessionError> {
        self.tables
            .get(&name.to_ascii_lowercase())
            .ok_or_else(|| SessionError::UnknownTable(name.to_string()))
    }
}

/// Shared store behind a [`MemoryReadSession`] / [`MemoryWriteSession`] pair.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<State>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: &str, table: MemoryTable) {
        self.lock().tables.insert(name.to_ascii_lowercase(), table);
    }

    pub fn table(&self, name: &str) -> Option<MemoryTable> {
        self.lock().table(name).ok().cloned()
    }

    /// Queries served by read sessions, in order.
    pub fn selects(&self) -> Vec<SelectQuery> {
        self.lock().selects.clone()
    }

    pub fn commits(&self) -> usize {
        self.lock().commits
    }

    pub fn rollbacks(&self) -> usize {
        self.lock().rollbacks
    }

    pub fn sessions(&self) -> (MemoryReadSession, MemoryWriteSession) {
        (
            MemoryReadSession { db: self.clone() },
            MemoryWriteSession {
                db: self.clone(),
                pending: Vec::new(),
            },
        )
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct MemoryReadSession {
    db: MemoryDatabase,
}

impl MemoryReadSession {
    fn select(&self, query: &SelectQuery) -> Result<Vec<Row>, SessionError> {
        let mut state = self.db.lock();
        state.selects.push(query.clone());
        let table = state.table(&query.table)?;
        let indices = table.indices(&query.columns)?;
        Ok(table
            .rows
            .iter()
            .filter(|row| {
                !query
                    .excludes
                    .excludes(|column| table.value(row.as_slice(), column))
            })
            .map(|row| {
                indices
                    .iter()
                    .map(|&idx| row.get(idx).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect())
    }
}

#[async_trait]
impl ReadSession for MemoryReadSession {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn stream_rows<'a>(&'a mut self, query: &'a SelectQuery) -> RowStream<'a> {
        let rows: Vec<Result<Row, SessionError>> = match self.select(query) {
            Ok(rows) => rows.into_iter().map(Ok).collect(),
            Err(err) => vec![Err(err)],
        };
        futures::stream::iter(rows).boxed()
    }

    async fn fetch_distinct(
        &mut self,
        table: &str,
        column: &str,
        limit: usize,
    ) -> Result<Vec<Value>, SessionError> {
        let state = self.db.lock();
        let table = state.table(table)?;
        let idx = table
            .index(column)
            .ok_or_else(|| SessionError::Other(format!("unknown column '{column}'")))?;
        let mut values: Vec<Value> = Vec::new();
        for value in table.rows.iter().filter_map(|row| row.get(idx)) {
            if values.len() >= limit {
                break;
            }
            if !value.is_null() && !values.contains(value) {
                values.push(value.clone());
            }
        }
        Ok(values)
    }
}

struct PendingUpdate {
    update: UpdateQuery,
    row: Row,
}

pub struct MemoryWriteSession {
    db: MemoryDatabase,
    pending: Vec<PendingUpdate>,
}

#[async_trait]
impl WriteSession for MemoryWriteSession {
    async fn execute_batch(
        &mut self,
        update: &UpdateQuery,
        rows: &[Row],
    ) -> Result<u64, SessionError> {
        let state = self.db.lock();
        let table = state.table(&update.table)?;
        let keys = table.indices(&update.key_columns)?;
        table.indices(&update.set_columns)?;

        let mut updated = 0;
        for row in rows {
            let key_values = row.get(update.set_columns.len()..).unwrap_or_default();
            updated += table
                .rows
                .iter()
                .filter(|stored| matches_key(stored, &keys, key_values))
                .count() as u64;
            self.pending.push(PendingUpdate {
                update: update.clone(),
                row: row.clone(),
            });
        }
        Ok(updated)
    }

    async fn commit(&mut self) -> Result<(), SessionError> {
        let mut state = self.db.lock();
        for pending in self.pending.drain(..) {
            let update = &pending.update;
            let table = state
                .tables
                .get_mut(&update.table.to_ascii_lowercase())
                .ok_or_else(|| SessionError::UnknownTable(update.table.clone()))?;
            let sets = table.indices(&update.set_columns)?;
            let keys = table.indices(&update.key_columns)?;
            let Some((values, key_values)) = pending.row.split_at_checked(update.set_columns.len())
            else {
                return Err(SessionError::Other(format!(
                    "update row for '{}' is missing values",
                    update.table
                )));
            };
            for stored in table
                .rows
                .iter_mut()
                .filter(|stored| matches_key(stored, &keys, key_values))
            {
                for (&idx, value) in sets.iter().zip(values) {
                    if let Some(slot) = stored.get_mut(idx) {
                        *slot = value.clone();
                    }
                }
            }
        }
        state.commits += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), SessionError> {
        if !self.pending.is_empty() {
            self.pending.clear();
            self.db.lock().rollbacks += 1;
        }
        Ok(())
    }
}

fn matches_key(stored: &[Value], keys: &[usize], key_values: &[Value]) -> bool {
    keys.iter()
        .zip(key_values)
        .all(|(&idx, value)| stored.get(idx) == Some(value))
}
