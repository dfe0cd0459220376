//! Per-source cleaning of extracted rows into typed records.

pub mod aliases;
pub mod genre;
pub mod ratings;
pub mod titles;

pub use aliases::{clean_aliases, AliasRecord};
pub use ratings::{clean_ratings, RatingRecord};
pub use titles::{clean_titles, TitleRecord};

use crate::database_ops::extract::RawRow;

/// Marker the IMDb dumps use for a missing value.
pub const MISSING_MARKER: &str = "\\N";

/// Label carried by every sentinel dimension row.
pub const UNKNOWN_LABEL: &str = "Unknown";

pub fn is_unknown(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case(UNKNOWN_LABEL)
}

/// Lower-cases column names and turns blanks and `\N` into `None`.
pub(crate) fn normalize_row(row: RawRow) -> RawRow {
    row.into_iter()
        .map(|(k, v)| {
            let v = v
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty() && s != MISSING_MARKER);
            (k.trim().to_ascii_lowercase(), v)
        })
        .collect()
}

pub(crate) fn text(row: &RawRow, column: &str) -> Option<String> {
    row.get(column).cloned().flatten()
}

/// Integer coercion: `"1994"` and `"1994.0"` parse, anything else is `None`.
pub(crate) fn int(row: &RawRow, column: &str) -> Option<i32> {
    let raw = row.get(column)?.as_deref()?;
    if let Ok(v) = raw.parse::<i64>() {
        return i32::try_from(v).ok();
    }
    let f = raw.parse::<f64>().ok()?;
    if f.is_finite() && f.fract() == 0.0 && f >= i32::MIN as f64 && f <= i32::MAX as f64 {
        Some(f as i32)
    } else {
        None
    }
}

pub(crate) fn float(row: &RawRow, column: &str) -> Option<f64> {
    row.get(column)?
        .as_deref()?
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
}

#[cfg(test)]
pub(crate) fn raw(pairs: &[(&str, &str)]) -> RawRow {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Some(v.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_names_and_missing_markers() {
        let row = normalize_row(raw(&[("startYear", "\\N"), ("tconst", " tt1 "), ("x", "")]));
        assert_eq!(text(&row, "tconst").as_deref(), Some("tt1"));
        assert_eq!(text(&row, "startyear"), None);
        assert_eq!(text(&row, "x"), None);
    }

    #[test]
    fn integer_coercion_accepts_whole_floats_only() {
        let row = raw(&[("a", "1994"), ("b", "1994.0"), ("c", "19.5"), ("d", "abc")]);
        assert_eq!(int(&row, "a"), Some(1994));
        assert_eq!(int(&row, "b"), Some(1994));
        assert_eq!(int(&row, "c"), None);
        assert_eq!(int(&row, "d"), None);
        assert_eq!(int(&row, "missing"), None);
    }
}
