//! Build pipeline for the IMDb film warehouse: cleaned staging rows become a
//! star schema (four dimensions, one fact table, a genre bridge) loaded into
//! Postgres with full-refresh semantics.

pub mod database_ops;
pub mod normalization;
pub mod orchestrator;
pub mod telemetry;
pub mod transform;

pub mod util {
    pub mod db;
    pub mod env;
}

pub use orchestrator::{run_pipeline, PipelineConfig, RunReport, Stage};
