//! Warehouse-facing side of the pipeline: schema descriptor, storage
//! backends, extraction, loading and constraint management.

pub mod constraints;
pub mod extract;
pub mod loader;
pub mod maintenance;
pub mod memory;
pub mod schema;
pub mod schema_audit;
pub mod warehouse;

pub use constraints::{enforce_constraints, ConstraintReport, ConstraintStatus};
pub use extract::{PgSourceReader, RawRow, SourceReader, SourceTable, TsvSourceReader};
pub use loader::{load_table, LoadReport, DEFAULT_BATCH_SIZE};
pub use memory::MemoryWarehouse;
pub use warehouse::{Cell, Warehouse, WarehouseRow};
