use serde::Serialize;
use tracing::{error, info, instrument, warn};

use super::schema::TableSchema;
use super::warehouse::{Warehouse, WarehouseRow};

pub const DEFAULT_BATCH_SIZE: usize = 500_000;

/// Row range `[start, end)` of a batch that did not land.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedBatch {
    pub start: usize,
    pub end: usize,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub table: &'static str,
    pub rows: usize,
    pub loaded_rows: usize,
    pub batches: usize,
    pub truncated: bool,
    pub created: bool,
    /// Truncate/create failed; no batch was attempted.
    pub setup_error: Option<String>,
    pub failed: Vec<FailedBatch>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.setup_error.is_none() && self.failed.is_empty()
    }
}

/// Full-refresh load of one table: clear (or create) the destination, then
/// insert `rows` in batches of `batch_size`. A failing batch is rolled back,
/// logged with its row range and recorded; the remaining batches still run.
#[instrument(skip(warehouse, schema, rows), fields(table = schema.name, rows = rows.len()))]
pub async fn load_table<W, R>(
    warehouse: &W,
    schema: &'static TableSchema,
    rows: &[R],
    batch_size: usize,
) -> LoadReport
where
    W: Warehouse + ?Sized,
    R: WarehouseRow,
{
    let mut report = LoadReport {
        table: schema.name,
        rows: rows.len(),
        ..Default::default()
    };

    let prepared = match warehouse.table_exists(schema.name).await {
        Ok(true) => warehouse.truncate(schema).await.map(|_| {
            report.truncated = true;
            info!(table = schema.name, "truncated");
        }),
        Ok(false) => {
            info!(table = schema.name, "table does not exist; creating");
            warehouse.create_table(schema).await.map(|_| {
                report.created = true;
            })
        }
        Err(e) => Err(e),
    };
    if let Err(e) = prepared {
        warn!(table = schema.name, error = %e, "could not prepare table; skipping load");
        report.setup_error = Some(format!("{e:#}"));
        return report;
    }

    let batch_size = batch_size.max(1);
    for (i, batch) in rows.chunks(batch_size).enumerate() {
        let start = i * batch_size;
        let end = start + batch.len();
        let cells = batch.iter().map(WarehouseRow::cells).collect();
        report.batches += 1;
        match warehouse.insert_batch(schema, cells).await {
            Ok(()) => {
                report.loaded_rows += batch.len();
                info!(table = schema.name, start, end, "uploaded rows");
            }
            Err(e) => {
                error!(table = schema.name, start, end, error = %e, "batch upload failed");
                report.failed.push(FailedBatch {
                    start,
                    end,
                    error: format!("{e:#}"),
                });
            }
        }
    }
    info!(
        table = schema.name,
        loaded = report.loaded_rows,
        failed_batches = report.failed.len(),
        "table load finished"
    );
    report
}
