//! Sequential pipeline runner:
//! `Setup -> Extract -> BuildDimensions -> BuildFactBridge -> Load -> Constrain`.
//!
//! Any error before `Load` aborts the run. Load failures are isolated per
//! batch and constraint failures per constraint; both end up in [`RunReport`].

use std::fmt;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::database_ops::constraints::{enforce_constraints, ConstraintReport};
use crate::database_ops::extract::{SourceReader, SourceTable};
use crate::database_ops::loader::{load_table, LoadReport, DEFAULT_BATCH_SIZE};
use crate::database_ops::schema::{
    DIM_GENRE, DIM_LANGUAGE, DIM_REGION, DIM_TIME, FACT_FILM_VERSION, FACT_GENRE_BRIDGE,
    WAREHOUSE_TABLES,
};
use crate::database_ops::warehouse::Warehouse;
use crate::normalization::{
    clean_aliases, clean_ratings, clean_titles, AliasRecord, RatingRecord, TitleRecord,
};
use crate::transform::{
    build_dimensions, build_fact_and_bridge, Dimensions, FactTables, DEFAULT_CHUNK_SIZE,
};
use crate::util::env::{env_parse, env_parse_opt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Rows read per source table; `None` reads everything.
    pub row_limit: Option<usize>,
    pub chunk_size: usize,
    pub batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            row_limit: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl PipelineConfig {
    /// `ROW_LIMIT` (0 means all), `CHUNK_SIZE`, `BATCH_SIZE`.
    pub fn from_env() -> Self {
        Self {
            row_limit: env_parse_opt::<usize>("ROW_LIMIT").filter(|n| *n > 0),
            chunk_size: env_parse("CHUNK_SIZE", DEFAULT_CHUNK_SIZE),
            batch_size: env_parse("BATCH_SIZE", DEFAULT_BATCH_SIZE),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            bail!("chunk size must be greater than zero");
        }
        if self.batch_size == 0 {
            bail!("batch size must be greater than zero");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Setup,
    Extract,
    BuildDimensions,
    BuildFactBridge,
    Load,
    Constrain,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Setup => "setup",
            Stage::Extract => "extract",
            Stage::BuildDimensions => "build-dimensions",
            Stage::BuildFactBridge => "build-fact-bridge",
            Stage::Load => "load",
            Stage::Constrain => "constrain",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CleanedSources {
    pub titles: Vec<TitleRecord>,
    pub ratings: Vec<RatingRecord>,
    pub aliases: Vec<AliasRecord>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub titles: usize,
    pub ratings: usize,
    pub aliases: usize,
    pub fact_rows: usize,
    pub bridge_rows: usize,
    pub loads: Vec<LoadReport>,
    pub constraints: ConstraintReport,
}

impl RunReport {
    /// False when any table failed to set up or any batch failed.
    pub fn is_clean(&self) -> bool {
        self.loads.iter().all(LoadReport::is_clean)
    }

    pub fn failed_batches(&self) -> usize {
        self.loads.iter().map(|l| l.failed.len()).sum()
    }
}

fn stage_done(stage: Stage, started: Instant) {
    info!(
        %stage,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "stage complete"
    );
}

/// Reads and cleans the three source tables.
pub async fn extract_sources<S: SourceReader + ?Sized>(
    source: &S,
    row_limit: Option<usize>,
) -> Result<CleanedSources> {
    let read = |table: SourceTable| async move {
        source
            .read_table(table, row_limit)
            .await
            .with_context(|| format!("failed to extract {}", table.table_name()))
    };
    Ok(CleanedSources {
        titles: clean_titles(read(SourceTable::TitleBasics).await?),
        ratings: clean_ratings(read(SourceTable::TitleRatings).await?),
        aliases: clean_aliases(read(SourceTable::TitleAkas).await?),
    })
}

/// Loads every table in dependency order: dimensions, fact, bridge.
pub async fn load_all<W: Warehouse + ?Sized>(
    warehouse: &W,
    dims: &Dimensions,
    facts: &FactTables,
    batch_size: usize,
) -> Vec<LoadReport> {
    vec![
        load_table(warehouse, &DIM_REGION, &dims.region.label_rows(), batch_size).await,
        load_table(warehouse, &DIM_LANGUAGE, &dims.language.label_rows(), batch_size).await,
        load_table(warehouse, &DIM_GENRE, &dims.genre.label_rows(), batch_size).await,
        load_table(warehouse, &DIM_TIME, &dims.time.time_rows(), batch_size).await,
        load_table(warehouse, &FACT_FILM_VERSION, &facts.facts, batch_size).await,
        load_table(warehouse, &FACT_GENRE_BRIDGE, &facts.bridge, batch_size).await,
    ]
}

#[instrument(skip(source, warehouse))]
pub async fn run_pipeline<S, W>(
    config: PipelineConfig,
    source: &S,
    warehouse: &W,
) -> Result<RunReport>
where
    S: SourceReader + ?Sized,
    W: Warehouse + ?Sized,
{
    let run_started = Instant::now();
    let mut report = RunReport::default();

    let started = Instant::now();
    config
        .validate()
        .with_context(|| format!("stage {}", Stage::Setup))?;
    stage_done(Stage::Setup, started);

    let started = Instant::now();
    let sources = extract_sources(source, config.row_limit)
        .await
        .with_context(|| format!("stage {}", Stage::Extract))?;
    report.titles = sources.titles.len();
    report.ratings = sources.ratings.len();
    report.aliases = sources.aliases.len();
    stage_done(Stage::Extract, started);

    let started = Instant::now();
    let dims = build_dimensions(&sources.aliases, &sources.titles);
    stage_done(Stage::BuildDimensions, started);

    let started = Instant::now();
    let facts = build_fact_and_bridge(
        &sources.titles,
        &sources.ratings,
        &sources.aliases,
        &dims,
        config.chunk_size,
    )
    .with_context(|| format!("stage {}", Stage::BuildFactBridge))?;
    report.fact_rows = facts.facts.len();
    report.bridge_rows = facts.bridge.len();
    drop(sources);
    stage_done(Stage::BuildFactBridge, started);

    let started = Instant::now();
    report.loads = load_all(warehouse, &dims, &facts, config.batch_size).await;
    stage_done(Stage::Load, started);

    let started = Instant::now();
    report.constraints = enforce_constraints(warehouse, &WAREHOUSE_TABLES).await;
    stage_done(Stage::Constrain, started);

    if report.is_clean() {
        info!(
            facts = report.fact_rows,
            bridge = report.bridge_rows,
            elapsed_ms = run_started.elapsed().as_millis() as u64,
            "pipeline complete"
        );
    } else {
        warn!(
            failed_batches = report.failed_batches(),
            elapsed_ms = run_started.elapsed().as_millis() as u64,
            "pipeline complete with load failures"
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::extract::RawRow;
    use crate::database_ops::memory::MemoryWarehouse;
    use crate::database_ops::warehouse::Cell;
    use async_trait::async_trait;

    struct FixtureSource;

    fn row(pairs: &[(&str, &str)]) -> RawRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Some(v.to_string())))
            .collect()
    }

    #[async_trait]
    impl SourceReader for FixtureSource {
        async fn read_table(
            &self,
            table: SourceTable,
            limit: Option<usize>,
        ) -> Result<Vec<RawRow>> {
            let rows = match table {
                SourceTable::TitleBasics => vec![
                    row(&[("tconst", "t1"), ("genres", "Drama,Comedy"), ("startYear", "1994")]),
                    row(&[("tconst", "t2"), ("genres", "\\N"), ("startYear", "\\N")]),
                ],
                SourceTable::TitleRatings => {
                    vec![row(&[("tconst", "t1"), ("averageRating", "8.9"), ("numVotes", "100")])]
                }
                SourceTable::TitleAkas => vec![row(&[
                    ("titleId", "t1"),
                    ("ordering", "1"),
                    ("region", "US"),
                    ("language", "en"),
                    ("isOriginalTitle", "1"),
                ])],
            };
            Ok(rows.into_iter().take(limit.unwrap_or(usize::MAX)).collect())
        }
    }

    struct BrokenSource;

    #[async_trait]
    impl SourceReader for BrokenSource {
        async fn read_table(&self, _: SourceTable, _: Option<usize>) -> Result<Vec<RawRow>> {
            bail!("connection refused")
        }
    }

    #[tokio::test]
    async fn runs_all_stages() {
        let wh = MemoryWarehouse::new();
        let report = run_pipeline(PipelineConfig::default(), &FixtureSource, &wh)
            .await
            .unwrap();

        assert!(report.is_clean());
        assert_eq!((report.fact_rows, report.bridge_rows), (2, 3));
        assert_eq!(wh.rows("dim_region").len(), 2);
        let t2 = &wh.rows("fact_film_version")[1];
        assert_eq!(t2[2..5], [Cell::Int(Some(-1)), Cell::Int(Some(-1)), Cell::Int(Some(-1))]);
        assert!(wh.constraints("fact_genre_bridge").contains("fk_bridge_fact"));
    }

    #[tokio::test]
    async fn row_limit_caps_extraction() {
        let wh = MemoryWarehouse::new();
        let config = PipelineConfig {
            row_limit: Some(1),
            ..Default::default()
        };
        let report = run_pipeline(config, &FixtureSource, &wh).await.unwrap();
        assert_eq!(report.titles, 1);
    }

    #[tokio::test]
    async fn extraction_failure_aborts_before_load() {
        let wh = MemoryWarehouse::new();
        let err = run_pipeline(PipelineConfig::default(), &BrokenSource, &wh)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("title_basics"));
        assert!(!wh.has_table("dim_region"));
    }

    #[tokio::test]
    async fn zero_batch_size_fails_setup() {
        let wh = MemoryWarehouse::new();
        let config = PipelineConfig {
            batch_size: 0,
            ..Default::default()
        };
        let err = run_pipeline(config, &FixtureSource, &wh).await.unwrap_err();
        assert!(format!("{err:#}").contains("setup"));
    }

    #[tokio::test]
    async fn failed_batch_marks_run_unclean() {
        let wh = MemoryWarehouse::new();
        wh.fail_batch("fact_genre_bridge", 0);
        let report = run_pipeline(PipelineConfig::default(), &FixtureSource, &wh)
            .await
            .unwrap();
        assert!(!report.is_clean());
        assert_eq!(report.failed_batches(), 1);
        assert!(wh.rows("fact_genre_bridge").is_empty());
        assert_eq!(wh.rows("fact_film_version").len(), 2);
    }

    #[test]
    fn stage_names_are_kebab_case() {
        assert_eq!(Stage::BuildFactBridge.to_string(), "build-fact-bridge");
    }
}
