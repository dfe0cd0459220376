use std::collections::HashSet;
use std::ops::RangeInclusive;

use tracing::info;

use super::{int, normalize_row, text, UNKNOWN_LABEL};
use crate::database_ops::extract::RawRow;

/// Years outside this range are treated as missing.
pub const PLAUSIBLE_YEARS: RangeInclusive<i32> = 1800..=2200;

/// Cleaned `title_basics` row. Only the columns the warehouse reads are kept.
#[derive(Debug, Clone, PartialEq)]
pub struct TitleRecord {
    pub tconst: String,
    pub start_year: Option<i32>,
    /// Comma-separated; "Unknown" when the source had none.
    pub genres: String,
}

impl TitleRecord {
    pub fn new(
        tconst: impl Into<String>,
        genres: impl Into<String>,
        start_year: Option<i32>,
    ) -> Self {
        Self {
            tconst: tconst.into(),
            start_year,
            genres: genres.into(),
        }
    }
}

/// Rows without `tconst` are dropped; repeated `tconst` keeps the first row.
/// Unparsable or implausible start years become `None`.
pub fn clean_titles(rows: Vec<RawRow>) -> Vec<TitleRecord> {
    let mut seen = HashSet::new();
    let out: Vec<TitleRecord> = rows
        .into_iter()
        .map(normalize_row)
        .filter_map(|row| {
            let tconst = text(&row, "tconst")?;
            if !seen.insert(tconst.clone()) {
                return None;
            }
            Some(TitleRecord {
                start_year: int(&row, "startyear").filter(|y| PLAUSIBLE_YEARS.contains(y)),
                genres: text(&row, "genres").unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
                tconst,
            })
        })
        .collect();
    info!(rows = out.len(), "title_basics cleaned");
    out
}
