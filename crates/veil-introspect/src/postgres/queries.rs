use sqlx::{FromRow, PgPool};

use crate::errors::Result;

#[derive(Debug, FromRow)]
pub struct RawColumn {
    pub name: String,
    pub udt_name: String,
    pub formatted_type: String,
    pub character_max_length: Option<i32>,
    pub numeric_scale: Option<i32>,
    pub is_nullable: bool,
}

pub async fn table_exists(pool: &PgPool, schema: &str, table: &str) -> Result<bool> {
    let found = sqlx::query_scalar::<_, bool>(
        r#"
        select exists (
          select 1
          from pg_class c
          join pg_namespace n on n.oid = c.relnamespace
          where n.nspname = $1
            and c.relname = $2
            and c.relkind in ('r','p')
        )
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_one(pool)
    .await?;
    Ok(found)
}

pub async fn list_columns(pool: &PgPool, schema: &str, table: &str) -> Result<Vec<RawColumn>> {
    let rows = sqlx::query_as::<_, RawColumn>(
        r#"
        select
          a.attname::text as name,
          t.typname::text as udt_name,
          pg_catalog.format_type(a.atttypid, a.atttypmod) as formatted_type,
          ic.character_maximum_length::int4 as character_max_length,
          ic.numeric_scale::int4 as numeric_scale,
          not a.attnotnull as is_nullable
        from pg_attribute a
        join pg_class c on c.oid = a.attrelid
        join pg_namespace n on n.oid = c.relnamespace
        join pg_type t on t.oid = a.atttypid
        left join information_schema.columns ic
          on ic.table_schema = n.nspname
         and ic.table_name = c.relname
         and ic.column_name = a.attname
        where n.nspname = $1
          and c.relname = $2
          and a.attnum > 0
          and not a.attisdropped
        order by a.attnum
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Columns of the primary key, empty when the table has none.
pub async fn list_primary_key_columns(
    pool: &PgPool,
    schema: &str,
    table: &str,
) -> Result<Vec<String>> {
    constraint_columns(pool, schema, table, "p").await
}

/// Columns taking part in any foreign key of the table.
pub async fn list_foreign_key_columns(
    pool: &PgPool,
    schema: &str,
    table: &str,
) -> Result<Vec<String>> {
    constraint_columns(pool, schema, table, "f").await
}

async fn constraint_columns(
    pool: &PgPool,
    schema: &str,
    table: &str,
    contype: &str,
) -> Result<Vec<String>> {
    let rows = sqlx::query_scalar::<_, String>(
        r#"
        select distinct a.attname::text
        from pg_constraint con
        join pg_class c on c.oid = con.conrelid
        join pg_namespace n on n.oid = c.relnamespace
        cross join lateral unnest(con.conkey) as k(attnum)
        join pg_attribute a on a.attrelid = c.oid and a.attnum = k.attnum
        where n.nspname = $1
          and c.relname = $2
          and con.contype::text = $3
        order by 1
        "#,
    )
    .bind(schema)
    .bind(table)
    .bind(contype)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
