use std::collections::HashSet;

use tracing::info;

use super::{float, normalize_row, text};
use crate::database_ops::extract::RawRow;

#[derive(Debug, Clone, PartialEq)]
pub struct RatingRecord {
    pub tconst: String,
    pub average_rating: Option<f64>,
    pub num_votes: i64,
}

/// Invalid ratings become `None`; invalid or missing vote counts become 0.
/// One row per `tconst`, first wins.
pub fn clean_ratings(rows: Vec<RawRow>) -> Vec<RatingRecord> {
    let mut seen = HashSet::new();
    let out: Vec<RatingRecord> = rows
        .into_iter()
        .map(normalize_row)
        .filter_map(|row| {
            let tconst = text(&row, "tconst")?;
            if !seen.insert(tconst.clone()) {
                return None;
            }
            Some(RatingRecord {
                average_rating: float(&row, "averagerating"),
                num_votes: float(&row, "numvotes")
                    .filter(|v| *v >= 0.0)
                    .map(|v| v.trunc() as i64)
                    .unwrap_or(0),
                tconst,
            })
        })
        .collect();
    info!(rows = out.len(), "title_ratings cleaned");
    out
}
