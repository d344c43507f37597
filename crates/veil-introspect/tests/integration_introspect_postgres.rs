use anyhow::{Context, Result};
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::env;
use veil_core::ValueType;
use veil_introspect::{MetadataError, MetadataProvider, PostgresMetadata};

const FIXTURE: &str = r#"
drop schema if exists veil_introspect cascade;
create schema veil_introspect;
create table veil_introspect.accounts (
  id serial primary key,
  email varchar(120) not null
);
create table veil_introspect.users (
  id int4 primary key,
  account_id int4 references veil_introspect.accounts(id),
  first_name varchar(20),
  code char(3),
  balance numeric(12, 2),
  visits numeric(10, 0),
  tags text[],
  born date,
  created_at timestamptz not null default now()
)
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

#[tokio::test]
async fn loads_columns_types_and_keys() -> Result<()> {
    let Some(db_url) = database_url() else {
        eprintln!("skipping: set TEST_DATABASE_URL or DATABASE_URL");
        return Ok(());
    };
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(std::time::Duration::from_secs(10))
        .connect(&db_url)
        .await
        .context("connecting to Postgres")?;
    reset_fixture(&pool).await?;

    let provider = PostgresMetadata::new(pool);
    let users = provider.table("veil_introspect.users").await?;

    assert_eq!(users.canonical_name(), "veil_introspect.users");
    assert_eq!(users.primary_keys(), vec!["id"]);

    let column = |name: &str| users.column(name).context(name.to_string());
    assert!(column("account_id")?.foreign_key);
    assert_eq!(column("first_name")?.size, Some(20));
    assert_eq!(column("code")?.size, Some(3));
    assert_eq!(column("balance")?.value_type, ValueType::Float);
    assert_eq!(column("visits")?.value_type, ValueType::Int);
    assert_eq!(
        column("tags")?.value_type,
        ValueType::list_of(ValueType::Text)
    );
    assert_eq!(column("born")?.value_type, ValueType::Date);
    assert_eq!(column("created_at")?.value_type, ValueType::Timestamp);
    assert!(!column("created_at")?.nullable);

    let missing = provider.table("veil_introspect.nope").await;
    assert!(matches!(missing, Err(MetadataError::TableNotFound(_))));
    Ok(())
}
