//! sqlx-backed PostgreSQL sessions.
//!
//! Both sessions run with `TimeZone` set to UTC: `timestamptz` values are
//! decoded as UTC wall-clock timestamps and written back through a
//! `timestamp` parameter, which the server interprets in the session zone.

use async_trait::async_trait;
use futures::StreamExt;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Column, PgConnection, PgPool, Postgres, Row as _, Transaction, TypeInfo};
use tracing::debug;
use veil_core::{Dialect, Value};

use crate::errors::SessionError;
use crate::query::{SelectQuery, UpdateQuery, quote_column, validate_identifier};
use crate::session::{ReadSession, Row, RowStream, WriteSession};

/// Read session streaming rows over a dedicated pooled connection.
pub struct PgReadSession {
    conn: PoolConnection<Postgres>,
}

impl PgReadSession {
    pub async fn connect(pool: &PgPool) -> Result<Self, SessionError> {
        let mut conn = pool.acquire().await?;
        pin_time_zone(&mut conn, "SET TIME ZONE 'UTC'").await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl ReadSession for PgReadSession {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn stream_rows<'a>(&'a mut self, query: &'a SelectQuery) -> RowStream<'a> {
        debug!(table = %query.table, sql = %query.sql, "streaming rows");
        let mut statement = sqlx::query(&query.sql);
        for param in &query.params {
            statement = bind_value(statement, param);
        }
        statement
            .fetch(&mut *self.conn)
            .map(|row| row.map_err(SessionError::from).and_then(|row| decode_row(&row)))
            .boxed()
    }

    async fn fetch_distinct(
        &mut self,
        table: &str,
        column: &str,
        limit: usize,
    ) -> Result<Vec<Value>, SessionError> {
        let table = quote_table_name(table)?;
        let column = quote_column(Dialect::Postgres, column)
            .map_err(|err| SessionError::Other(err.to_string()))?;
        let sql = Dialect::Postgres.distinct_sample(&table, &column, limit);
        let rows = sqlx::query(&sql).fetch_all(&mut *self.conn).await?;
        match decode_first_column(&rows) {
            Err(SessionError::Decode { .. }) => {
                let text = Dialect::Postgres.text_cast(&column);
                let sql = Dialect::Postgres.distinct_sample(&table, &text, limit);
                let rows = sqlx::query(&sql).fetch_all(&mut *self.conn).await?;
                decode_first_column(&rows)
            }
            decoded => decoded,
        }
    }
}

/// Write session executing batches inside one transaction per batch.
pub struct PgWriteSession {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgWriteSession {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, tx: None }
    }
}

#[async_trait]
impl WriteSession for PgWriteSession {
    async fn execute_batch(
        &mut self,
        update: &UpdateQuery,
        rows: &[Row],
    ) -> Result<u64, SessionError> {
        if self.tx.is_none() {
            let mut tx = self.pool.begin().await?;
            pin_time_zone(&mut tx, "SET LOCAL TIME ZONE 'UTC'").await?;
            self.tx = Some(tx);
        }
        let Some(tx) = self.tx.as_mut() else {
            return Err(SessionError::Other("no open transaction".to_string()));
        };
        let mut updated = 0;
        for row in rows {
            let mut statement = sqlx::query(&update.sql);
            for value in row {
                statement = bind_value(statement, value);
            }
            updated += statement.execute(&mut **tx).await?.rows_affected();
        }
        Ok(updated)
    }

    async fn commit(&mut self) -> Result<(), SessionError> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), SessionError> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }
}

async fn pin_time_zone(conn: &mut PgConnection, sql: &str) -> Result<(), SessionError> {
    sqlx::query(sql).execute(conn).await?;
    Ok(())
}

fn quote_table_name(table: &str) -> Result<String, SessionError> {
    let quote = |part: &str| {
        validate_identifier(part)
            .map(|part| Dialect::Postgres.quote_identifier(part))
            .map_err(|err| SessionError::Other(err.to_string()))
    };
    match table.split_once('.') {
        Some((schema, name)) => Ok(format!("{}.{}", quote(schema)?, quote(name)?)),
        None => quote(table),
    }
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &Value,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(value) => query.bind(*value),
        Value::Int(value) => query.bind(*value),
        Value::Float(value) => query.bind(*value),
        Value::Text(value) => query.bind(value.clone()),
        Value::Date(value) => query.bind(*value),
        Value::Timestamp(value) => query.bind(*value),
        Value::List(items) => query.bind(
            items
                .iter()
                .map(|item| item.as_text())
                .collect::<Vec<Option<String>>>(),
        ),
    }
}

fn decode_first_column(rows: &[PgRow]) -> Result<Vec<Value>, SessionError> {
    rows.iter().map(|row| decode_value(row, 0)).collect()
}

fn decode_row(row: &PgRow) -> Result<Row, SessionError> {
    (0..row.columns().len())
        .map(|idx| decode_value(row, idx))
        .collect()
}

fn decode_value(row: &PgRow, idx: usize) -> Result<Value, SessionError> {
    let column = &row.columns()[idx];
    let type_name = column.type_info().name();
    let decode_error = || SessionError::Decode {
        column: column.name().to_string(),
        type_name: type_name.to_string(),
    };

    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(idx)?.map(Value::Bool),
        "INT2" => row
            .try_get::<Option<i16>, _>(idx)?
            .map(|value| Value::Int(value.into())),
        "INT4" => row
            .try_get::<Option<i32>, _>(idx)?
            .map(|value| Value::Int(value.into())),
        "INT8" => row.try_get::<Option<i64>, _>(idx)?.map(Value::Int),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(idx)?
            .map(|value| Value::Float(value.into())),
        "FLOAT8" => row.try_get::<Option<f64>, _>(idx)?.map(Value::Float),
        // beyond rust_decimal's range callers retry through the text form
        "NUMERIC" => row
            .try_get::<Option<Decimal>, _>(idx)
            .map_err(|_| decode_error())?
            .map(numeric_value),
        "TEXT" | "VARCHAR" | "BPCHAR" | "CHAR" | "NAME" => {
            row.try_get::<Option<String>, _>(idx)?.map(Value::Text)
        }
        "UUID" => row
            .try_get::<Option<uuid::Uuid>, _>(idx)?
            .map(|value| Value::Text(value.to_string())),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(idx)?
            .map(Value::Date),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(idx)?
            .map(Value::Timestamp),
        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx)?
            .map(|value| Value::Timestamp(value.naive_utc())),
        "TEXT[]" | "VARCHAR[]" => row
            .try_get::<Option<Vec<Option<String>>>, _>(idx)?
            .map(|items| list(items, Value::Text)),
        "INT4[]" => row
            .try_get::<Option<Vec<Option<i32>>>, _>(idx)?
            .map(|items| list(items, |item| Value::Int(item.into()))),
        "INT8[]" => row
            .try_get::<Option<Vec<Option<i64>>>, _>(idx)?
            .map(|items| list(items, Value::Int)),
        _ => return Err(decode_error()),
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Integral numerics without a scale become ints; anything else keeps its
/// exact text form, which binds back through the column's typed cast.
fn numeric_value(value: Decimal) -> Value {
    match value.to_i64() {
        Some(int) if value.scale() == 0 => Value::Int(int),
        _ => Value::Text(value.to_string()),
    }
}

fn list<T>(items: Vec<Option<T>>, wrap: impl Fn(T) -> Value) -> Value {
    Value::List(
        items
            .into_iter()
            .map(|item| item.map(&wrap).unwrap_or(Value::Null))
            .collect(),
    )
}
