//! Schema bootstrap and reset for an operator-managed warehouse.

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use super::constraints::{enforce_constraints, ConstraintReport};
use super::schema::{TableSchema, DIM_TIME, WAREHOUSE_TABLES};
use super::warehouse::{Cell, Warehouse, WarehouseRow};
use crate::transform::Dimension;

#[derive(Debug, Clone, Default)]
pub struct BootstrapReport {
    pub created: Vec<&'static str>,
    pub existing: Vec<&'static str>,
    pub constraints: ConstraintReport,
}

/// The `-1`/"Unknown" row of a dimension table; `None` for fact tables.
pub fn sentinel_row(schema: &TableSchema) -> Option<Vec<Cell>> {
    if schema.name == DIM_TIME.name {
        Dimension::<i32>::default()
            .time_rows()
            .first()
            .map(WarehouseRow::cells)
    } else if schema.is_dimension() {
        Dimension::<String>::default()
            .label_rows()
            .first()
            .map(WarehouseRow::cells)
    } else {
        None
    }
}

/// Creates missing tables, seeds the sentinel into dimensions created here,
/// then applies every constraint. Tables that already exist keep their rows.
#[instrument(skip(warehouse))]
pub async fn bootstrap<W: Warehouse + ?Sized>(warehouse: &W) -> Result<BootstrapReport> {
    let mut report = BootstrapReport::default();
    for schema in WAREHOUSE_TABLES {
        if warehouse.table_exists(schema.name).await? {
            info!(table = schema.name, "table exists; leaving as is");
            report.existing.push(schema.name);
            continue;
        }
        warehouse
            .create_table(schema)
            .await
            .with_context(|| format!("failed to create {}", schema.name))?;
        if let Some(row) = sentinel_row(schema) {
            warehouse
                .insert_batch(schema, vec![row])
                .await
                .with_context(|| format!("failed to seed sentinel row into {}", schema.name))?;
        }
        info!(table = schema.name, "created");
        report.created.push(schema.name);
    }
    report.constraints = enforce_constraints(warehouse, &WAREHOUSE_TABLES).await;
    Ok(report)
}

/// Drops every warehouse table, dependents first. Returns the tables that
/// existed before the drop.
#[instrument(skip(warehouse))]
pub async fn reset<W: Warehouse + ?Sized>(warehouse: &W) -> Result<Vec<&'static str>> {
    let mut dropped = Vec::new();
    for schema in WAREHOUSE_TABLES.iter().rev() {
        if !warehouse.table_exists(schema.name).await? {
            continue;
        }
        warehouse
            .drop_table(schema.name)
            .await
            .with_context(|| format!("failed to drop {}", schema.name))?;
        warn!(table = schema.name, "dropped");
        dropped.push(schema.name);
    }
    Ok(dropped)
}
