use anyhow::{Context, Result};
use serde_json::json;
use sqlx::{PgPool, Row, postgres::PgPoolOptions};
use std::env;
use veil_anonymize::{
    AnonymizeOptions, PgReadSession, PgWriteSession, TableOutcome, anonymize,
};
use veil_functions::FunctionCatalog;
use veil_introspect::PostgresMetadata;
use veil_policy::Requirement;

const FIXTURE: &str = r#"
drop schema if exists veil_anonymize cascade;
create schema veil_anonymize;
create type veil_anonymize.mood as enum ('ok', 'sad');
create table veil_anonymize.accounts (
  id numeric(30, 10) primary key,
  label varchar(20),
  settings jsonb,
  mood veil_anonymize.mood,
  note text,
  seen_at timestamptz not null
);
insert into veil_anonymize.accounts values
  (12345678901234567890.0123456789, 'Alice', '{"a": 1}', 'sad', 'kept', '2024-01-01 12:00:00+00'),
  (2.5, 'Bob', null, 'ok', 'plain', '2023-06-01 08:30:00.25+00')
"#;

fn database_url() -> Option<String> {
    env::var("TEST_DATABASE_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .ok()
}

async fn reset_fixture(pool: &PgPool) -> Result<()> {
    for statement in FIXTURE.split(';') {
        let sql = statement.trim();
        if sql.is_empty() {
            continue;
        }
        sqlx::query(sql)
            .execute(pool)
            .await
            .context("executing fixture")?;
    }
    Ok(())
}

/// Pool whose connections default to a zone east of UTC.
async fn berlin_pool(db_url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(3)
        .acquire_timeout(std::time::Duration::from_secs(10))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("SET TIME ZONE 'Europe/Berlin'")
                    .execute(conn)
                    .await?;
                Ok(())
            })
        })
        .connect(db_url)
        .await
        .context("connecting to Postgres")
}

#[tokio::test]
async fn round_trips_exotic_columns_in_place() -> Result<()> {
    let Some(db_url) = database_url() else {
        eprintln!("skipping: set TEST_DATABASE_URL or DATABASE_URL");
        return Ok(());
    };
    let pool = berlin_pool(&db_url).await?;
    reset_fixture(&pool).await?;

    let doc: Requirement = serde_json::from_value(json!({
        "project": "bank",
        "version": "1.0",
        "tables": [{
            "name": "veil_anonymize.accounts",
            "columns": [
                {
                    "name": "label",
                    "plan": { "functions": [{ "name": "Core#constant", "arguments": [{ "value": "X" }] }] }
                },
                {
                    "name": "settings",
                    "plan": { "functions": [{ "name": "Core#constant", "arguments": [{ "value": "{\"masked\": true}" }] }] }
                },
                {
                    "name": "note",
                    "plan": { "functions": [{ "name": "Core#constant", "arguments": [{ "value": "Y" }] }] },
                    "excludes": [{ "name": "mood", "equals": "sad" }]
                },
                {
                    "name": "seen_at",
                    "plan": { "functions": [{ "name": "Core#constant", "arguments": [{ "value": "2000-01-01 00:00:00" }] }] },
                    "excludes": [{ "like": "202%" }]
                }
            ]
        }]
    }))?;

    let metadata = PostgresMetadata::new(pool.clone());
    let mut read = PgReadSession::connect(&pool).await?;
    let mut write = PgWriteSession::new(pool.clone());
    let report = anonymize(
        &doc,
        &FunctionCatalog::with_builtins(),
        &metadata,
        &mut read,
        &mut write,
        &AnonymizeOptions::default(),
    )
    .await?;
    drop(read);
    drop(write);

    match &report
        .table("veil_anonymize.accounts")
        .context("accounts report")?
        .outcome
    {
        TableOutcome::Succeeded(stats) => {
            assert_eq!(stats.rows_read, 2);
            // every key matched despite 30 significant digits
            assert_eq!(stats.rows_updated, 2);
        }
        other => panic!("accounts should succeed: {other:?}"),
    }

    let rows = sqlx::query(
        "select id::text as id, label, settings->>'masked' as masked, note, \
         seen_at in (timestamptz '2024-01-01 12:00:00+00', timestamptz '2023-06-01 08:30:00.25+00') as seen_kept \
         from veil_anonymize.accounts order by id desc",
    )
    .fetch_all(&pool)
    .await?;
    assert_eq!(rows.len(), 2);

    let first = &rows[0];
    assert_eq!(
        first.try_get::<String, _>("id")?,
        "12345678901234567890.0123456789"
    );
    assert_eq!(first.try_get::<String, _>("label")?, "X");
    assert_eq!(first.try_get::<String, _>("masked")?, "true");
    assert_eq!(first.try_get::<String, _>("note")?, "kept");
    assert!(first.try_get::<bool, _>("seen_kept")?);

    let second = &rows[1];
    assert_eq!(second.try_get::<String, _>("id")?, "2.5000000000");
    assert_eq!(second.try_get::<String, _>("note")?, "Y");
    assert!(second.try_get::<bool, _>("seen_kept")?);

    pool.close().await;
    Ok(())
}
