use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use indexmap::IndexSet;
use tracing::{info, instrument};

use super::dimensions::Dimensions;
use crate::database_ops::warehouse::{Cell, WarehouseRow};
use crate::normalization::genre::split_genres;
use crate::normalization::{AliasRecord, RatingRecord, TitleRecord};

pub const DEFAULT_CHUNK_SIZE: usize = 1_000_000;

#[derive(Debug, Clone, PartialEq)]
pub struct FactRow {
    pub fact_id: i32,
    pub tconst: String,
    pub region_id: i32,
    pub language_id: i32,
    pub time_id: i32,
    /// `None` when the title has no alias at all.
    pub is_original_title: Option<bool>,
    pub average_rating: f64,
    pub num_votes: i64,
}

impl WarehouseRow for FactRow {
    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Int(Some(self.fact_id)),
            Cell::Text(Some(self.tconst.clone())),
            Cell::Int(Some(self.region_id)),
            Cell::Int(Some(self.language_id)),
            Cell::Int(Some(self.time_id)),
            Cell::Bool(self.is_original_title),
            Cell::Double(Some(self.average_rating)),
            Cell::BigInt(Some(self.num_votes)),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BridgeRow {
    pub fact_id: i32,
    pub genre_id: i32,
}

impl WarehouseRow for BridgeRow {
    fn cells(&self) -> Vec<Cell> {
        vec![Cell::Int(Some(self.fact_id)), Cell::Int(Some(self.genre_id))]
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactTables {
    pub facts: Vec<FactRow>,
    pub bridge: Vec<BridgeRow>,
}

/// First alias of every title: lowest `ordering`, ties (and missing
/// orderings) resolved by position in `aliases`.
pub fn representative_aliases(aliases: &[AliasRecord]) -> HashMap<&str, &AliasRecord> {
    let mut best: HashMap<&str, &AliasRecord> = HashMap::new();
    for alias in aliases {
        let rank = alias.ordering.unwrap_or(i32::MAX);
        best
            .entry(alias.title_id.as_str())
            .and_modify(|cur| {
                if rank < cur.ordering.unwrap_or(i32::MAX) {
                    *cur = alias;
                }
            })
            .or_insert(alias);
    }
    best
}

/// Join inputs shared by every chunk; built once, read-only afterwards.
struct Lookups<'a> {
    ratings: HashMap<&'a str, &'a RatingRecord>,
    aliases: HashMap<&'a str, &'a AliasRecord>,
    dims: &'a Dimensions,
}

fn build_chunk(
    offset: usize,
    chunk: &[TitleRecord],
    lookups: &Lookups<'_>,
    out: &mut FactTables,
) -> Result<()> {
    out.facts.reserve(chunk.len());
    for (i, title) in chunk.iter().enumerate() {
        let fact_id = i32::try_from(offset + i + 1).context("fact_id exceeds INTEGER range")?;
        let rating = lookups.ratings.get(title.tconst.as_str());
        let alias = lookups.aliases.get(title.tconst.as_str());
        let dims = lookups.dims;

        out.facts.push(FactRow {
            fact_id,
            tconst: title.tconst.clone(),
            region_id: dims
                .region
                .resolve(alias.and_then(|a| a.region.as_deref())),
            language_id: dims
                .language
                .resolve(alias.and_then(|a| a.language.as_deref())),
            time_id: dims.time.resolve(title.start_year.as_ref()),
            is_original_title: alias.map(|a| a.is_original_title),
            average_rating: rating.and_then(|r| r.average_rating).unwrap_or(0.0),
            num_votes: rating.map_or(0, |r| r.num_votes),
        });

        let genre_ids: IndexSet<i32> = split_genres(&title.genres)
            .iter()
            .map(|g| dims.genre.lookup(g.as_str()))
            .collect();
        out.bridge
            .extend(genre_ids.into_iter().map(|genre_id| BridgeRow { fact_id, genre_id }));
    }
    Ok(())
}

/// Builds `fact_film_version` (one row per title) and `fact_genre_bridge`,
/// walking `titles` in slices of `chunk_size`. `fact_id` is the title's
/// 1-based position, so the output does not depend on the chunk size.
#[instrument(skip_all, fields(titles = titles.len(), chunk_size = chunk_size))]
pub fn build_fact_and_bridge(
    titles: &[TitleRecord],
    ratings: &[RatingRecord],
    aliases: &[AliasRecord],
    dims: &Dimensions,
    chunk_size: usize,
) -> Result<FactTables> {
    if chunk_size == 0 {
        bail!("chunk_size must be greater than zero");
    }
    let lookups = Lookups {
        ratings: ratings.iter().map(|r| (r.tconst.as_str(), r)).collect(),
        aliases: representative_aliases(aliases),
        dims,
    };

    let chunks = titles.len().div_ceil(chunk_size);
    let mut out = FactTables::default();
    for (i, chunk) in titles.chunks(chunk_size).enumerate() {
        build_chunk(i * chunk_size, chunk, &lookups, &mut out)
            .with_context(|| format!("fact chunk {}/{chunks}", i + 1))?;
        info!(chunk = i + 1, chunks, rows = chunk.len(), "processed fact chunk");
    }
    info!(
        facts = out.facts.len(),
        bridge = out.bridge.len(),
        "fact and bridge tables built"
    );
    Ok(out)
}
