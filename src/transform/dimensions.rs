use std::hash::Hash;

use indexmap::{Equivalent, IndexMap};
use tracing::info;

use crate::database_ops::warehouse::{Cell, WarehouseRow};
use crate::normalization::genre::known_genres;
use crate::normalization::{is_unknown, AliasRecord, TitleRecord, UNKNOWN_LABEL};

/// Surrogate key of the sentinel row in every dimension.
pub const UNKNOWN_KEY: i32 = -1;

/// Value -> surrogate key mapping. Keys are dense `1..=N` in order of first
/// appearance; anything not a member resolves to [`UNKNOWN_KEY`].
#[derive(Debug, Clone, PartialEq)]
pub struct Dimension<K: Hash + Eq> {
    keys: IndexMap<K, i32>,
}

impl<K: Hash + Eq> Default for Dimension<K> {
    fn default() -> Self {
        Self {
            keys: IndexMap::new(),
        }
    }
}

impl<K: Hash + Eq> Dimension<K> {
    pub fn from_values<I: IntoIterator<Item = K>>(values: I) -> Self {
        let mut keys = IndexMap::new();
        for value in values {
            let next = keys.len() as i32 + 1;
            keys.entry(value).or_insert(next);
        }
        Self { keys }
    }

    pub fn lookup<Q>(&self, value: &Q) -> i32
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        self.keys.get(value).copied().unwrap_or(UNKNOWN_KEY)
    }

    pub fn resolve<Q>(&self, value: Option<&Q>) -> i32
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        value.map_or(UNKNOWN_KEY, |v| self.lookup(v))
    }

    /// Number of members, not counting the sentinel.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn members(&self) -> impl Iterator<Item = (&K, i32)> {
        self.keys.iter().map(|(k, id)| (k, *id))
    }
}

/// Row of a code/name dimension (`dim_region`, `dim_language`, `dim_genre`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelRow {
    pub id: i32,
    pub label: String,
}

impl WarehouseRow for LabelRow {
    fn cells(&self) -> Vec<Cell> {
        vec![Cell::Int(Some(self.id)), Cell::Text(Some(self.label.clone()))]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeRow {
    pub time_id: i32,
    pub year: Option<i32>,
    pub decade: Option<i32>,
}

impl WarehouseRow for TimeRow {
    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Int(Some(self.time_id)),
            Cell::Int(self.year),
            Cell::Int(self.decade),
        ]
    }
}

/// Start of the decade containing `year`; `None` where that would fall
/// outside `i32`.
pub fn decade_of(year: i32) -> Option<i32> {
    year.checked_sub(year.rem_euclid(10))
}

impl Dimension<String> {
    /// Table rows, sentinel first.
    pub fn label_rows(&self) -> Vec<LabelRow> {
        std::iter::once(LabelRow {
            id: UNKNOWN_KEY,
            label: UNKNOWN_LABEL.to_string(),
        })
        .chain(self.members().map(|(label, id)| LabelRow {
            id,
            label: label.clone(),
        }))
        .collect()
    }
}

impl Dimension<i32> {
    pub fn time_rows(&self) -> Vec<TimeRow> {
        std::iter::once(TimeRow {
            time_id: UNKNOWN_KEY,
            year: None,
            decade: None,
        })
        .chain(self.members().map(|(year, id)| TimeRow {
            time_id: id,
            year: Some(*year),
            decade: decade_of(*year),
        }))
        .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Dimensions {
    pub region: Dimension<String>,
    pub language: Dimension<String>,
    pub genre: Dimension<String>,
    pub time: Dimension<i32>,
}

fn codes<'a>(values: impl Iterator<Item = Option<&'a str>>) -> Dimension<String> {
    Dimension::from_values(
        values
            .flatten()
            .map(str::trim)
            .filter(|v| !v.is_empty() && !is_unknown(v))
            .map(str::to_string),
    )
}

/// Builds the four dimensions from the cleaned sources. Pure; the returned
/// lookups are read-only inputs to the fact/bridge build.
pub fn build_dimensions(aliases: &[AliasRecord], titles: &[TitleRecord]) -> Dimensions {
    let dims = Dimensions {
        region: codes(aliases.iter().map(|a| a.region.as_deref())),
        language: codes(aliases.iter().map(|a| a.language.as_deref())),
        genre: Dimension::from_values(titles.iter().flat_map(|t| known_genres(&t.genres))),
        time: Dimension::from_values(titles.iter().filter_map(|t| t.start_year)),
    };
    info!(
        regions = dims.region.len(),
        languages = dims.language.len(),
        genres = dims.genre.len(),
        years = dims.time.len(),
        "dimensions built"
    );
    dims
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(rows: &[LabelRow]) -> Vec<(i32, &str)> {
        rows.iter().map(|r| (r.id, r.label.as_str())).collect()
    }

    #[test]
    fn keys_follow_first_appearance() {
        let titles = vec![
            TitleRecord::new("t1", "Drama,Comedy", Some(1994)),
            TitleRecord::new("t2", "comedy,Action", Some(1972)),
            TitleRecord::new("t3", "Drama", Some(1994)),
        ];
        let dims = build_dimensions(&[], &titles);
        assert_eq!(
            labels(&dims.genre.label_rows()),
            vec![(-1, "Unknown"), (1, "Drama"), (2, "Comedy"), (3, "Action")]
        );
        assert_eq!(
            dims.time.time_rows(),
            vec![
                TimeRow {
                    time_id: -1,
                    year: None,
                    decade: None,
                },
                TimeRow {
                    time_id: 1,
                    year: Some(1994),
                    decade: Some(1990),
                },
                TimeRow {
                    time_id: 2,
                    year: Some(1972),
                    decade: Some(1970),
                },
            ]
        );
    }

    #[test]
    fn empty_sources_yield_sentinel_only() {
        let dims = build_dimensions(&[], &[]);
        assert_eq!(labels(&dims.region.label_rows()), vec![(-1, "Unknown")]);
        assert_eq!(labels(&dims.language.label_rows()), vec![(-1, "Unknown")]);
        assert_eq!(labels(&dims.genre.label_rows()), vec![(-1, "Unknown")]);
        assert_eq!(dims.time.time_rows().len(), 1);
    }

    #[test]
    fn unknown_markers_are_never_minted() {
        let titles = vec![TitleRecord::new("t1", "Unknown", None)];
        let aliases = vec![
            AliasRecord::new("t1", 1, Some("unknown"), Some(""), false),
            AliasRecord::new("t1", 2, Some("GB"), None, false),
        ];
        let dims = build_dimensions(&aliases, &titles);
        assert!(dims.genre.is_empty());
        assert_eq!(labels(&dims.region.label_rows()), vec![(-1, "Unknown"), (1, "GB")]);
        assert!(dims.language.is_empty());
        assert_eq!(dims.genre.lookup("Unknown"), UNKNOWN_KEY);
        let rows = dims.genre.label_rows();
        assert_eq!(rows.iter().filter(|r| r.id == UNKNOWN_KEY).count(), 1);
    }

    #[test]
    fn lookup_resolves_missing_to_sentinel() {
        let dim = Dimension::from_values(["US".to_string(), "FR".to_string(), "US".to_string()]);
        assert_eq!(dim.lookup("FR"), 2);
        assert_eq!(dim.lookup("JP"), UNKNOWN_KEY);
        assert_eq!(dim.resolve::<str>(None), UNKNOWN_KEY);
    }

    #[test]
    fn decade_rounds_down() {
        assert_eq!(decade_of(1999), Some(1990));
        assert_eq!(decade_of(2000), Some(2000));
        assert_eq!(decade_of(-5), Some(-10));
    }

    #[test]
    fn extreme_years_do_not_overflow() {
        assert_eq!(decade_of(i32::MIN), None);
        assert_eq!(decade_of(i32::MAX), Some(2_147_483_640));

        let rows = Dimension::from_values([i32::MIN, 1994]).time_rows();
        assert_eq!(rows[1].decade, None);
        assert_eq!(rows[2].decade, Some(1990));
    }
}
