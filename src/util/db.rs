use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions, PgSslMode},
    query_builder::Separated,
    PgPool, Postgres, QueryBuilder,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::database_ops::schema::{ForeignKey, Index, TableSchema, UniqueKey};
use crate::database_ops::warehouse::{Cell, Warehouse};
use crate::util::env::{env_flag, env_parse};

/// Postgres caps a single statement at 65535 bind parameters.
const PG_BIND_LIMIT: usize = 65_535;

/// Connection handle for one Postgres database. Built once per process and
/// handed to each stage; every call borrows a pooled connection for its own
/// duration only.
#[derive(Clone)]
pub struct Db {
    pub pool: PgPool,
}

impl Db {
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let use_prepared = env_flag("USE_PREPARED", false);
        let mut connect_options =
            PgConnectOptions::from_str(database_url).context("invalid database URL")?;

        if database_url.contains("sslmode=require") && !database_url.contains("sslmode=disable") {
            connect_options = connect_options.ssl_mode(PgSslMode::Require);
        }

        if !use_prepared {
            // PgBouncer txn mode safe
            connect_options = connect_options.statement_cache_capacity(0);
        }

        // Optional bulk-load session tuning
        let fast_ingest = env_flag("FAST_INGEST", false);
        let work_mem_mb: u32 = env_parse("FAST_INGEST_WORK_MEM_MB", 64);

        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    if fast_ingest {
                        // Best-effort; restricted roles may refuse these.
                        let _ = sqlx::query("SET synchronous_commit = 'off'")
                            .execute(&mut *conn)
                            .await;
                        let _ = sqlx::query(&format!("SET work_mem = '{work_mem_mb}MB'"))
                            .execute(&mut *conn)
                            .await;
                    }
                    Ok(())
                })
            })
            .connect_with(connect_options)
            .await
            .context("failed to connect to database")?;
        info!(max_connections, fast_ingest, "connected to db");
        Ok(Self { pool })
    }

    async fn execute_ddl(&self, sql: &str) -> Result<()> {
        debug!(sql, "executing ddl");
        sqlx::raw_sql(sql).execute(&self.pool).await?;
        Ok(())
    }
}

fn push_cell(b: &mut Separated<'_, '_, Postgres, &'static str>, cell: &Cell) {
    match cell {
        Cell::Int(v) => {
            b.push_bind(*v);
        }
        Cell::BigInt(v) => {
            b.push_bind(*v);
        }
        Cell::Double(v) => {
            b.push_bind(*v);
        }
        Cell::Text(v) => {
            b.push_bind(v.clone());
        }
        Cell::Bool(v) => {
            b.push_bind(*v);
        }
    }
}

#[async_trait]
impl Warehouse for Db {
    async fn table_exists(&self, table: &str) -> Result<bool> {
        let visible: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
            .bind(table)
            .persistent(false)
            .fetch_one(&self.pool)
            .await?;
        Ok(visible)
    }

    async fn create_table(&self, schema: &TableSchema) -> Result<()> {
        self.execute_ddl(&schema.create_table_sql()).await
    }

    async fn truncate(&self, schema: &TableSchema) -> Result<()> {
        self.execute_ddl(&schema.truncate_sql()).await
    }

    #[instrument(skip(self, schema, rows), fields(table = schema.name, rows = rows.len()))]
    async fn insert_batch(&self, schema: &TableSchema, rows: Vec<Vec<Cell>>) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let rows_per_statement = (PG_BIND_LIMIT / schema.columns.len().max(1)).max(1);
        let mut tx = self.pool.begin().await?;
        for part in rows.chunks(rows_per_statement) {
            let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(schema.insert_prefix());
            qb.push_values(part, |mut b, row| {
                for cell in row {
                    push_cell(&mut b, cell);
                }
            });
            qb.build().persistent(false).execute(&mut *tx).await?;
        }
        // dropping `tx` on an early return rolls the whole batch back
        tx.commit().await?;
        Ok(())
    }

    async fn has_primary_key(&self, table: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                SELECT 1 FROM information_schema.table_constraints
                WHERE table_schema = current_schema()
                  AND table_name = $1
                  AND constraint_type = 'PRIMARY KEY')",
        )
        .bind(table)
        .persistent(false)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn add_primary_key(&self, schema: &TableSchema) -> Result<()> {
        let sql = schema
            .add_primary_key_sql()
            .with_context(|| format!("{} declares no primary key", schema.name))?;
        self.execute_ddl(&sql).await
    }

    async fn constraint_exists(&self, table: &str, constraint: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                SELECT 1 FROM information_schema.table_constraints
                WHERE table_schema = current_schema()
                  AND table_name = $1
                  AND constraint_name = $2)",
        )
        .bind(table)
        .bind(constraint)
        .persistent(false)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn add_unique(&self, schema: &TableSchema, key: &UniqueKey) -> Result<()> {
        self.execute_ddl(&key.add_sql(schema.name)).await
    }

    async fn add_foreign_key(&self, schema: &TableSchema, fk: &ForeignKey) -> Result<()> {
        self.execute_ddl(&fk.add_sql(schema.name)).await
    }

    async fn ensure_index(&self, schema: &TableSchema, index: &Index) -> Result<()> {
        self.execute_ddl(&index.create_sql(schema.name)).await
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        self.execute_ddl(&format!("DROP TABLE IF EXISTS {table} CASCADE"))
            .await
    }
}
