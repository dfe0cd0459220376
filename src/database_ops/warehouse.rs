use anyhow::Result;
use async_trait::async_trait;

use super::schema::{ForeignKey, Index, SqlType, TableSchema, UniqueKey};

/// One typed value destined for a warehouse column.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Int(Option<i32>),
    BigInt(Option<i64>),
    Double(Option<f64>),
    Text(Option<String>),
    Bool(Option<bool>),
}

impl Cell {
    pub fn sql_type(&self) -> SqlType {
        match self {
            Cell::Int(_) => SqlType::Integer,
            Cell::BigInt(_) => SqlType::BigInt,
            Cell::Double(_) => SqlType::Double,
            Cell::Text(_) => SqlType::Text,
            Cell::Bool(_) => SqlType::Boolean,
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            Cell::Int(v) => v.is_none(),
            Cell::BigInt(v) => v.is_none(),
            Cell::Double(v) => v.is_none(),
            Cell::Text(v) => v.is_none(),
            Cell::Bool(v) => v.is_none(),
        }
    }
}

/// A row that can be written to a warehouse table. Cells come out in the
/// column order of the table's [`TableSchema`].
pub trait WarehouseRow {
    fn cells(&self) -> Vec<Cell>;
}

impl WarehouseRow for Vec<Cell> {
    fn cells(&self) -> Vec<Cell> {
        self.clone()
    }
}

/// Destination of the pipeline. Each call is one unit of work: implementations
/// acquire a connection (or transaction) for the call and release it before
/// returning.
#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn table_exists(&self, table: &str) -> Result<bool>;

    async fn create_table(&self, schema: &TableSchema) -> Result<()>;

    /// Clears the table and resets identity state; dependents are truncated too.
    async fn truncate(&self, schema: &TableSchema) -> Result<()>;

    /// Inserts one batch atomically: either every row lands or none does.
    async fn insert_batch(&self, schema: &TableSchema, rows: Vec<Vec<Cell>>) -> Result<()>;

    async fn has_primary_key(&self, table: &str) -> Result<bool>;

    async fn add_primary_key(&self, schema: &TableSchema) -> Result<()>;

    async fn constraint_exists(&self, table: &str, constraint: &str) -> Result<bool>;

    async fn add_unique(&self, schema: &TableSchema, key: &UniqueKey) -> Result<()>;

    async fn add_foreign_key(&self, schema: &TableSchema, fk: &ForeignKey) -> Result<()>;

    async fn ensure_index(&self, schema: &TableSchema, index: &Index) -> Result<()>;

    async fn drop_table(&self, table: &str) -> Result<()>;
}
