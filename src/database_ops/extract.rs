//! Raw-row extraction from the staging sources.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use tracing::{info, instrument};

use crate::util::db::Db;

/// One extracted row: column name -> raw text (`None` for SQL NULL).
pub type RawRow = IndexMap<String, Option<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceTable {
    TitleBasics,
    TitleRatings,
    TitleAkas,
}

impl SourceTable {
    pub fn table_name(self) -> &'static str {
        match self {
            SourceTable::TitleBasics => "title_basics",
            SourceTable::TitleRatings => "title_ratings",
            SourceTable::TitleAkas => "title_akas",
        }
    }

    /// Natural key of the staging table. Extraction reads in this order so
    /// first-appearance keys are stable between runs.
    pub fn order_by(self) -> &'static str {
        match self {
            SourceTable::TitleBasics | SourceTable::TitleRatings => "tconst",
            SourceTable::TitleAkas => "titleid, ordering",
        }
    }

    /// File name of the matching IMDb dataset dump.
    pub fn file_name(self) -> &'static str {
        match self {
            SourceTable::TitleBasics => "title.basics.tsv",
            SourceTable::TitleRatings => "title.ratings.tsv",
            SourceTable::TitleAkas => "title.akas.tsv",
        }
    }
}

#[async_trait]
pub trait SourceReader: Send + Sync {
    /// All rows of `table`, or the first `limit` rows.
    async fn read_table(&self, table: SourceTable, limit: Option<usize>) -> Result<Vec<RawRow>>;
}

/// Reads staging tables from a Postgres database.
pub struct PgSourceReader {
    db: Db,
}

impl PgSourceReader {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

/// Query returning each row of `table` as JSON text, ordered by its natural key.
pub fn select_sql(table: SourceTable, limit: Option<usize>) -> String {
    let name = table.table_name();
    let key = table.order_by();
    let limit = limit.map(|n| format!(" LIMIT {n}")).unwrap_or_default();
    format!("SELECT row_to_json(t)::text FROM (SELECT * FROM {name} ORDER BY {key}{limit}) t")
}

fn json_to_raw(text: &str) -> Result<RawRow> {
    let object: serde_json::Map<String, Value> =
        serde_json::from_str(text).context("staging row is not a JSON object")?;
    Ok(object
        .into_iter()
        .map(|(k, v)| {
            let v = match v {
                Value::Null => None,
                Value::String(s) => Some(s),
                other => Some(other.to_string()),
            };
            (k, v)
        })
        .collect())
}

#[async_trait]
impl SourceReader for PgSourceReader {
    #[instrument(skip(self))]
    async fn read_table(&self, table: SourceTable, limit: Option<usize>) -> Result<Vec<RawRow>> {
        let name = table.table_name();
        let sql = select_sql(table, limit);
        let rows: Vec<String> = sqlx::query_scalar(&sql)
            .persistent(false)
            .fetch_all(&self.db.pool)
            .await
            .with_context(|| format!("failed to extract {name}"))?;
        let out = rows
            .iter()
            .map(|r| json_to_raw(r))
            .collect::<Result<Vec<_>>>()?;
        info!(table = name, rows = out.len(), "extracted");
        Ok(out)
    }
}

/// Reads the IMDb `.tsv` dumps from a directory.
pub struct TsvSourceReader {
    dir: PathBuf,
}

impl TsvSourceReader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

fn read_tsv(path: &Path, limit: Option<usize>) -> Result<Vec<RawRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        // IMDb dumps contain bare quotes inside titles
        .quoting(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut out = Vec::new();
    for record in reader.records().take(limit.unwrap_or(usize::MAX)) {
        let record = record.with_context(|| format!("malformed line in {}", path.display()))?;
        let row: RawRow = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), record.get(i).map(str::to_string)))
            .collect();
        out.push(row);
    }
    Ok(out)
}

#[async_trait]
impl SourceReader for TsvSourceReader {
    #[instrument(skip(self))]
    async fn read_table(&self, table: SourceTable, limit: Option<usize>) -> Result<Vec<RawRow>> {
        let path = self.dir.join(table.file_name());
        let shown = path.display().to_string();
        let rows = tokio::task::spawn_blocking(move || read_tsv(&path, limit))
            .await
            .context("tsv reader task panicked")??;
        info!(file = %shown, rows = rows.len(), "extracted");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn json_row_keeps_nulls_and_stringifies_numbers() {
        let row = json_to_raw(r#"{"tconst":"tt1","startyear":1994,"genres":null}"#).unwrap();
        assert_eq!(row["tconst"].as_deref(), Some("tt1"));
        assert_eq!(row["startyear"].as_deref(), Some("1994"));
        assert_eq!(row["genres"], None);
    }

    #[test]
    fn extraction_is_ordered_by_natural_key() {
        assert_eq!(
            select_sql(SourceTable::TitleBasics, None),
            "SELECT row_to_json(t)::text FROM (SELECT * FROM title_basics ORDER BY tconst) t"
        );
        assert_eq!(
            select_sql(SourceTable::TitleAkas, Some(50)),
            "SELECT row_to_json(t)::text FROM \
             (SELECT * FROM title_akas ORDER BY titleid, ordering LIMIT 50) t"
        );
        assert!(select_sql(SourceTable::TitleRatings, Some(1)).contains("ORDER BY tconst LIMIT 1"));
    }

    #[tokio::test]
    async fn reads_tsv_dump_with_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(dir.path().join("title.ratings.tsv")).unwrap();
        writeln!(f, "tconst\taverageRating\tnumVotes").unwrap();
        writeln!(f, "tt0000001\t5.7\t2071").unwrap();
        writeln!(f, "tt0000002\t5.6\t\\N").unwrap();
        writeln!(f, "tt0000003\t6.5\t2000").unwrap();
        drop(f);

        let reader = TsvSourceReader::new(dir.path());
        let rows = reader
            .read_table(SourceTable::TitleRatings, Some(2))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["averageRating"].as_deref(), Some("5.7"));
        assert_eq!(rows[1]["numVotes"].as_deref(), Some("\\N"));
    }

    #[tokio::test]
    async fn missing_dump_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let reader = TsvSourceReader::new(dir.path());
        assert!(reader
            .read_table(SourceTable::TitleAkas, None)
            .await
            .is_err());
    }
}
