//! Pure in-memory construction of the star schema: dimensions first, then
//! the fact table and its genre bridge.

pub mod dimensions;
pub mod fact_bridge;

pub use dimensions::{build_dimensions, Dimension, Dimensions, LabelRow, TimeRow, UNKNOWN_KEY};
pub use fact_bridge::{build_fact_and_bridge, BridgeRow, FactRow, FactTables, DEFAULT_CHUNK_SIZE};
