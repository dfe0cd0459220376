use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use film_warehouse::database_ops::extract::{PgSourceReader, SourceReader, TsvSourceReader};
use film_warehouse::database_ops::maintenance::{bootstrap, reset};
use film_warehouse::database_ops::memory::MemoryWarehouse;
use film_warehouse::database_ops::schema::{self, WAREHOUSE_TABLES};
use film_warehouse::database_ops::schema_audit;
use film_warehouse::database_ops::{enforce_constraints, ConstraintStatus};
use film_warehouse::orchestrator::{run_pipeline, PipelineConfig, RunReport};
use film_warehouse::telemetry::{init_tracing, DEFAULT_LOG_FILTER};
use film_warehouse::util::db::Db;
use film_warehouse::util::env;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "film-warehouse", version, about = "IMDb film warehouse build pipeline")]
struct Cli {
    /// Log file and line of every event
    #[arg(long, global = true, default_value_t = false)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct WarehouseArgs {
    /// Warehouse database URL (defaults to DATABASE_URL)
    #[arg(long)]
    db_url: Option<String>,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Extract, transform and load the full warehouse, then apply constraints
    Run {
        #[command(flatten)]
        warehouse: WarehouseArgs,
        /// Staging database URL (defaults to SOURCE_DATABASE_URL or LOCAL_*)
        #[arg(long, conflicts_with = "tsv_dir")]
        source_url: Option<String>,
        /// Read the IMDb .tsv dumps from this directory (defaults to SOURCE_TSV_DIR)
        #[arg(long)]
        tsv_dir: Option<PathBuf>,
        /// Rows read per source table; 0 reads everything (defaults to ROW_LIMIT)
        #[arg(long)]
        row_limit: Option<usize>,
        /// Titles per fact/bridge chunk (defaults to CHUNK_SIZE or 1000000)
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Rows per insert transaction (defaults to BATCH_SIZE or 500000)
        #[arg(long)]
        batch_size: Option<usize>,
        /// Load into an in-memory warehouse instead of DATABASE_URL
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        /// Print the run report as JSON on stdout
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Create missing warehouse tables, seed sentinel rows and apply constraints
    Bootstrap {
        #[command(flatten)]
        warehouse: WarehouseArgs,
    },
    /// Apply primary keys, unique keys, foreign keys and indexes
    Constrain {
        #[command(flatten)]
        warehouse: WarehouseArgs,
    },
    /// Print columns, keys and indexes of the warehouse tables
    Audit {
        #[command(flatten)]
        warehouse: WarehouseArgs,
        /// Optional comma-separated filter of tables
        #[arg(long, value_delimiter = ',')]
        tables: Option<Vec<String>>,
        /// Report file
        #[arg(long, default_value = schema_audit::AUDIT_FILE)]
        out: PathBuf,
    },
    /// Drop every warehouse table
    Reset {
        #[command(flatten)]
        warehouse: WarehouseArgs,
        /// Skip the interactive confirmation
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

async fn connect_warehouse(args: &WarehouseArgs) -> Result<Db> {
    let url = match &args.db_url {
        Some(url) => url.clone(),
        None => env::warehouse_db_url()?,
    };
    info!(url = %env::redact_url(&url), "connecting to warehouse");
    Db::connect(&url, env::env_parse("DB_MAX_CONNS", 4u32)).await
}

async fn open_source(
    source_url: Option<String>,
    tsv_dir: Option<PathBuf>,
) -> Result<Box<dyn SourceReader>> {
    if let Some(dir) = tsv_dir {
        info!(dir = %dir.display(), "reading source tsv dumps");
        return Ok(Box::new(TsvSourceReader::new(dir)));
    }
    let url = match source_url {
        Some(url) => url,
        None => env::source_db_url()?,
    };
    info!(url = %env::redact_url(&url), "connecting to source");
    let db = Db::connect(&url, env::env_parse("DB_MAX_CONNS", 4u32))
        .await
        .context("failed to connect to source database")?;
    Ok(Box::new(PgSourceReader::new(db)))
}

fn confirm_reset() -> Result<bool> {
    print!(
        "This drops {} warehouse tables. Type DELETE to continue: ",
        WAREHOUSE_TABLES.len()
    );
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim() == "DELETE")
}

fn summarize(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    }
    for load in &report.loads {
        info!(
            table = load.table,
            rows = load.rows,
            loaded = load.loaded_rows,
            failed_batches = load.failed.len(),
            "load summary"
        );
    }
    if !report.is_clean() {
        warn!(
            failed_batches = report.failed_batches(),
            "run finished with failed batches; see log for row ranges"
        );
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env::init_env();
    let cli = Cli::parse();
    init_tracing(DEFAULT_LOG_FILTER, cli.verbose)?;

    match cli.command {
        Commands::Run {
            warehouse,
            source_url,
            tsv_dir,
            row_limit,
            chunk_size,
            batch_size,
            dry_run,
            json,
        } => {
            let mut config = PipelineConfig::from_env();
            if let Some(n) = row_limit {
                config.row_limit = (n > 0).then_some(n);
            }
            if let Some(n) = chunk_size {
                config.chunk_size = n;
            }
            if let Some(n) = batch_size {
                config.batch_size = n;
            }
            config.validate()?;

            let tsv_dir = match (&source_url, tsv_dir) {
                (None, None) => env::env_opt("SOURCE_TSV_DIR").map(PathBuf::from),
                (_, dir) => dir,
            };
            let source = open_source(source_url, tsv_dir).await?;
            let report = if dry_run {
                info!("dry run: loading into memory");
                run_pipeline(config, source.as_ref(), &MemoryWarehouse::new()).await?
            } else {
                let db = connect_warehouse(&warehouse).await?;
                run_pipeline(config, source.as_ref(), &db).await?
            };
            summarize(&report, json)?;
        }
        Commands::Bootstrap { warehouse } => {
            let db = connect_warehouse(&warehouse).await?;
            let report = bootstrap(&db).await?;
            info!(
                created = report.created.len(),
                existing = report.existing.len(),
                "bootstrap complete"
            );
        }
        Commands::Constrain { warehouse } => {
            let db = connect_warehouse(&warehouse).await?;
            let report = enforce_constraints(&db, &WAREHOUSE_TABLES).await;
            let failed = report.count(|s| matches!(s, ConstraintStatus::Failed(_)));
            if failed > 0 {
                warn!(failed, "some constraints could not be applied");
            }
        }
        Commands::Audit {
            warehouse,
            tables,
            out,
        } => {
            let selected = match tables {
                Some(names) => names
                    .iter()
                    .map(|n| {
                        let n = n.trim().to_ascii_lowercase();
                        schema::table(&n).with_context(|| format!("unknown warehouse table {n}"))
                    })
                    .collect::<Result<Vec<_>>>()?,
                None => WAREHOUSE_TABLES.to_vec(),
            };
            let db = connect_warehouse(&warehouse).await?;
            schema_audit::run(&db, &selected, &out).await?;
        }
        Commands::Reset { warehouse, yes } => {
            if !yes && !confirm_reset()? {
                bail!("reset aborted");
            }
            let db = connect_warehouse(&warehouse).await?;
            let dropped = reset(&db).await?;
            info!(dropped = dropped.len(), "reset complete");
        }
    }
    Ok(())
}
