use serde::Serialize;
use tracing::{info, warn};

use super::schema::TableSchema;
use super::warehouse::Warehouse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConstraintKind {
    PrimaryKey,
    Unique,
    ForeignKey,
    Index,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ConstraintStatus {
    Added,
    AlreadyPresent,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct ConstraintOutcome {
    pub table: &'static str,
    pub name: String,
    pub kind: ConstraintKind,
    pub status: ConstraintStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConstraintReport {
    pub outcomes: Vec<ConstraintOutcome>,
}

impl ConstraintReport {
    pub fn count(&self, pred: impl Fn(&ConstraintStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }

    pub fn status_of(&self, name: &str) -> Option<&ConstraintStatus> {
        self.outcomes
            .iter()
            .find(|o| o.name == name)
            .map(|o| &o.status)
    }
}

fn record(
    outcomes: &mut Vec<ConstraintOutcome>,
    table: &'static str,
    name: String,
    kind: ConstraintKind,
    status: ConstraintStatus,
) {
    match &status {
        ConstraintStatus::Added => info!(table, constraint = %name, ?kind, "constraint added"),
        ConstraintStatus::AlreadyPresent => {
            info!(table, constraint = %name, ?kind, "constraint already present")
        }
        ConstraintStatus::Skipped(reason) => {
            warn!(table, constraint = %name, ?kind, reason = %reason, "constraint skipped")
        }
        ConstraintStatus::Failed(error) => {
            warn!(table, constraint = %name, ?kind, error = %error, "constraint not applied")
        }
    }
    outcomes.push(ConstraintOutcome {
        table,
        name,
        kind,
        status,
    });
}

fn failed(e: anyhow::Error) -> ConstraintStatus {
    ConstraintStatus::Failed(format!("{e:#}"))
}

async fn missing_tables<W: Warehouse + ?Sized>(
    warehouse: &W,
    tables: &[&str],
) -> Result<Vec<String>, ConstraintStatus> {
    let mut missing = Vec::new();
    for t in tables {
        match warehouse.table_exists(t).await {
            Ok(true) => {}
            Ok(false) => missing.push(t.to_string()),
            Err(e) => return Err(failed(e)),
        }
    }
    Ok(missing)
}

pub async fn add_primary_keys<W: Warehouse + ?Sized>(
    warehouse: &W,
    tables: &[&'static TableSchema],
) -> Vec<ConstraintOutcome> {
    let mut outcomes = Vec::new();
    for schema in tables.iter().filter(|t| !t.primary_key.is_empty()) {
        let status = match missing_tables(warehouse, &[schema.name]).await {
            Err(status) => status,
            Ok(missing) if !missing.is_empty() => {
                ConstraintStatus::Skipped(format!("table {} does not exist", schema.name))
            }
            Ok(_) => match warehouse.has_primary_key(schema.name).await {
                Ok(true) => ConstraintStatus::AlreadyPresent,
                Ok(false) => match warehouse.add_primary_key(schema).await {
                    Ok(()) => ConstraintStatus::Added,
                    Err(e) => failed(e),
                },
                Err(e) => failed(e),
            },
        };
        record(
            &mut outcomes,
            schema.name,
            schema.primary_key_name(),
            ConstraintKind::PrimaryKey,
            status,
        );
    }
    outcomes
}

pub async fn add_unique_keys<W: Warehouse + ?Sized>(
    warehouse: &W,
    tables: &[&'static TableSchema],
) -> Vec<ConstraintOutcome> {
    let mut outcomes = Vec::new();
    for schema in tables {
        let Some(key) = schema.unique else {
            continue;
        };
        let status = match missing_tables(warehouse, &[schema.name]).await {
            Err(status) => status,
            Ok(missing) if !missing.is_empty() => {
                ConstraintStatus::Skipped(format!("table {} does not exist", schema.name))
            }
            Ok(_) => match warehouse.constraint_exists(schema.name, key.name).await {
                Ok(true) => ConstraintStatus::AlreadyPresent,
                Ok(false) => match warehouse.add_unique(schema, &key).await {
                    Ok(()) => ConstraintStatus::Added,
                    Err(e) => failed(e),
                },
                Err(e) => failed(e),
            },
        };
        record(
            &mut outcomes,
            schema.name,
            key.name.to_string(),
            ConstraintKind::Unique,
            status,
        );
    }
    outcomes
}

pub async fn add_foreign_keys<W: Warehouse + ?Sized>(
    warehouse: &W,
    tables: &[&'static TableSchema],
) -> Vec<ConstraintOutcome> {
    let mut outcomes = Vec::new();
    for schema in tables {
        for fk in schema.foreign_keys {
            let status = match missing_tables(warehouse, &[schema.name, fk.references]).await {
                Err(status) => status,
                Ok(missing) if !missing.is_empty() => ConstraintStatus::Skipped(format!(
                    "missing table(s): {}",
                    missing.join(", ")
                )),
                Ok(_) => match warehouse.constraint_exists(schema.name, fk.name).await {
                    Ok(true) => ConstraintStatus::AlreadyPresent,
                    Ok(false) => match warehouse.add_foreign_key(schema, fk).await {
                        Ok(()) => ConstraintStatus::Added,
                        Err(e) => failed(e),
                    },
                    Err(e) => failed(e),
                },
            };
            record(
                &mut outcomes,
                schema.name,
                fk.name.to_string(),
                ConstraintKind::ForeignKey,
                status,
            );
        }
    }
    outcomes
}

pub async fn ensure_indexes<W: Warehouse + ?Sized>(
    warehouse: &W,
    tables: &[&'static TableSchema],
) -> Vec<ConstraintOutcome> {
    let mut outcomes = Vec::new();
    for schema in tables {
        for index in schema.indexes {
            let status = match missing_tables(warehouse, &[schema.name]).await {
                Err(status) => status,
                Ok(missing) if !missing.is_empty() => {
                    ConstraintStatus::Skipped(format!("table {} does not exist", schema.name))
                }
                // IF NOT EXISTS makes this idempotent on its own
                Ok(_) => match warehouse.ensure_index(schema, index).await {
                    Ok(()) => ConstraintStatus::Added,
                    Err(e) => failed(e),
                },
            };
            record(
                &mut outcomes,
                schema.name,
                index.name.to_string(),
                ConstraintKind::Index,
                status,
            );
        }
    }
    outcomes
}

/// Applies every key and index declared in `tables`. Primary and unique keys
/// go first so foreign keys always have a keyed target. Never fails: each
/// constraint's outcome is in the report.
pub async fn enforce_constraints<W: Warehouse + ?Sized>(
    warehouse: &W,
    tables: &[&'static TableSchema],
) -> ConstraintReport {
    let mut outcomes = add_primary_keys(warehouse, tables).await;
    outcomes.extend(add_unique_keys(warehouse, tables).await);
    outcomes.extend(add_foreign_keys(warehouse, tables).await);
    outcomes.extend(ensure_indexes(warehouse, tables).await);
    let report = ConstraintReport { outcomes };
    info!(
        added = report.count(|s| *s == ConstraintStatus::Added),
        present = report.count(|s| *s == ConstraintStatus::AlreadyPresent),
        skipped = report.count(|s| matches!(s, ConstraintStatus::Skipped(_))),
        failed = report.count(|s| matches!(s, ConstraintStatus::Failed(_))),
        "constraints applied"
    );
    report
}
