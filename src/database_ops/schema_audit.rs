//! Human-readable dump of the live warehouse schema: columns, keys and
//! foreign keys in both directions, per table.

use std::fmt::Write as _;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use sqlx::pool::PoolConnection;
use sqlx::{Postgres, Row};
use tracing::{info, instrument};

use super::schema::TableSchema;
use crate::util::db::Db;

type PgConn = PoolConnection<Postgres>;

pub const AUDIT_FILE: &str = "schema_audit.out";

/// Audits `tables`, prints the report and writes it to `out_path`.
#[instrument(skip(db, tables), fields(tables = tables.len()))]
pub async fn run(db: &Db, tables: &[&TableSchema], out_path: &Path) -> Result<String> {
    let mut out = String::new();
    writeln!(out, "SCHEMA AUDIT (current schema): {} tables", tables.len()).ok();

    let mut conn = db.pool.acquire().await?;
    for schema in tables {
        let table = schema.name;
        let exists: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
            .bind(table)
            .persistent(false)
            .fetch_one(conn.as_mut())
            .await?;
        writeln!(out, "\n=== {table} ===").ok();
        if !exists {
            writeln!(out, "  (missing: not present in schema)").ok();
            continue;
        }
        emit_columns(&mut out, table, &mut conn).await?;
        emit_constraints(&mut out, table, 'p', "Primary Key", &mut conn).await?;
        emit_constraints(&mut out, table, 'u', "Unique Constraints", &mut conn).await?;
        emit_constraints(&mut out, table, 'f', "Foreign Keys (outgoing)", &mut conn).await?;
        emit_foreign_keys_in(&mut out, table, &mut conn).await?;
        emit_indexes(&mut out, table, &mut conn).await?;
    }

    std::fs::write(out_path, &out)
        .with_context(|| format!("failed to write {}", out_path.display()))?;
    safe_println(&out);
    info!(path = %out_path.display(), "schema audit written");
    Ok(out)
}

async fn emit_columns(out: &mut String, table: &str, conn: &mut PgConn) -> Result<()> {
    let rows = sqlx::query(
        "SELECT column_name, data_type, is_nullable FROM information_schema.columns
         WHERE table_schema = current_schema() AND table_name = $1 ORDER BY ordinal_position",
    )
    .bind(table)
    .persistent(false)
    .fetch_all(conn.as_mut())
    .await?;

    writeln!(out, "Columns (name:type:null):").ok();
    for row in rows {
        let name: String = row.get("column_name");
        let dt: String = row.get("data_type");
        let nul: String = row.get("is_nullable");
        writeln!(
            out,
            "  {name}:{dt}:{}",
            if nul == "YES" { "null" } else { "not-null" }
        )
        .ok();
    }
    Ok(())
}

/// `contype` is the `pg_constraint` kind: p(rimary), u(nique), f(oreign).
async fn emit_constraints(
    out: &mut String,
    table: &str,
    contype: char,
    heading: &str,
    conn: &mut PgConn,
) -> Result<()> {
    let rows = sqlx::query(
        r#"SELECT c.conname::text AS conname, pg_get_constraintdef(c.oid) AS def
        FROM pg_constraint c
        JOIN pg_class t ON t.oid = c.conrelid
        JOIN pg_namespace n ON n.oid = t.relnamespace
        WHERE n.nspname = current_schema() AND t.relname = $1 AND c.contype = $2::"char"
        ORDER BY c.conname"#,
    )
    .bind(table)
    .bind(contype.to_string())
    .persistent(false)
    .fetch_all(conn.as_mut())
    .await?;

    if rows.is_empty() {
        writeln!(out, "{heading}: (none)").ok();
    } else {
        writeln!(out, "{heading}:").ok();
        for row in rows {
            let name: String = row.get("conname");
            let def: String = row.get("def");
            writeln!(out, "  {name} {def}").ok();
        }
    }
    Ok(())
}

async fn emit_foreign_keys_in(out: &mut String, table: &str, conn: &mut PgConn) -> Result<()> {
    let rows = sqlx::query(
        r#"SELECT c.conname::text AS conname, pg_get_constraintdef(c.oid) AS def,
               rel.relname::text AS referencing_table
        FROM pg_constraint c
        JOIN pg_class rel ON rel.oid = c.conrelid
        JOIN pg_namespace nrel ON nrel.oid = rel.relnamespace
        WHERE c.contype = 'f' AND c.confrelid = $1::regclass AND nrel.nspname = current_schema()
        ORDER BY rel.relname, c.conname"#,
    )
    .bind(table)
    .persistent(false)
    .fetch_all(conn.as_mut())
    .await?;

    if rows.is_empty() {
        writeln!(out, "Foreign Keys (incoming): (none)").ok();
    } else {
        writeln!(out, "Foreign Keys (incoming):").ok();
        for row in rows {
            let referencing: String = row.get("referencing_table");
            let name: String = row.get("conname");
            let def: String = row.get("def");
            writeln!(out, "  {referencing}: {name} {def}").ok();
        }
    }
    Ok(())
}

async fn emit_indexes(out: &mut String, table: &str, conn: &mut PgConn) -> Result<()> {
    let rows = sqlx::query(
        r#"SELECT indexname::text AS indexname, indexdef
        FROM pg_indexes
        WHERE schemaname = current_schema() AND tablename = $1
        ORDER BY indexname"#,
    )
    .bind(table)
    .persistent(false)
    .fetch_all(conn.as_mut())
    .await?;

    writeln!(out, "Indexes:").ok();
    for row in rows {
        let name: String = row.get("indexname");
        let def: String = row.get("indexdef");
        writeln!(out, "  {name}: {def}").ok();
    }
    Ok(())
}

fn safe_println(s: &str) {
    let mut stdout = io::stdout();
    let _ = writeln!(stdout, "{}", s);
}
