//! Connection seams used by the row processor.

use async_trait::async_trait;
use futures::stream::BoxStream;
use veil_core::{Dialect, Value};

use crate::errors::SessionError;
use crate::query::{SelectQuery, UpdateQuery};

/// One selected row, in [`SelectQuery::columns`] order.
pub type Row = Vec<Value>;

pub type RowStream<'a> = BoxStream<'a, Result<Row, SessionError>>;

/// Session holding the forward-only read cursor.
#[async_trait]
pub trait ReadSession: Send {
    fn dialect(&self) -> Dialect;

    /// Stream the rows selected by `query`. Dropping the stream releases the
    /// cursor.
    fn stream_rows<'a>(&'a mut self, query: &'a SelectQuery) -> RowStream<'a>;

    /// Up to `limit` distinct non-null values of `table.column`.
    async fn fetch_distinct(
        &mut self,
        table: &str,
        column: &str,
        limit: usize,
    ) -> Result<Vec<Value>, SessionError>;
}

/// Session holding the open batch transaction.
#[async_trait]
pub trait WriteSession: Send {
    /// Execute `update` once per bound row, opening a transaction if needed.
    /// Returns the number of rows the database reported as updated.
    async fn execute_batch(&mut self, update: &UpdateQuery, rows: &[Row])
    -> Result<u64, SessionError>;

    async fn commit(&mut self) -> Result<(), SessionError>;

    /// Discard the open transaction. A no-op when none is open.
    async fn rollback(&mut self) -> Result<(), SessionError>;
}
