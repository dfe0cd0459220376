use std::collections::HashSet;

use tracing::info;

use super::{int, normalize_row, text};
use crate::database_ops::extract::RawRow;

/// Cleaned `title_akas` row; the alias text itself is not kept.
#[derive(Debug, Clone, PartialEq)]
pub struct AliasRecord {
    pub title_id: String,
    pub ordering: Option<i32>,
    pub region: Option<String>,
    pub language: Option<String>,
    pub is_original_title: bool,
}

impl AliasRecord {
    pub fn new(
        title_id: impl Into<String>,
        ordering: i32,
        region: Option<&str>,
        language: Option<&str>,
        is_original_title: bool,
    ) -> Self {
        Self {
            title_id: title_id.into(),
            ordering: Some(ordering),
            region: region.map(str::to_string),
            language: language.map(str::to_string),
            is_original_title,
        }
    }
}

fn truthy(value: Option<String>) -> bool {
    value.is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "t" | "true"))
}

/// One row per (`titleid`, `ordering`), first wins; rows without `titleid`
/// are dropped.
pub fn clean_aliases(rows: Vec<RawRow>) -> Vec<AliasRecord> {
    let mut seen = HashSet::new();
    let out: Vec<AliasRecord> = rows
        .into_iter()
        .map(normalize_row)
        .filter_map(|row| {
            let title_id = text(&row, "titleid")?;
            let ordering = int(&row, "ordering");
            if !seen.insert((title_id.clone(), ordering)) {
                return None;
            }
            Some(AliasRecord {
                region: text(&row, "region"),
                language: text(&row, "language"),
                is_original_title: truthy(text(&row, "isoriginaltitle")),
                title_id,
                ordering,
            })
        })
        .collect();
    info!(
        rows = out.len(),
        original_titles = out.iter().filter(|a| a.is_original_title).count(),
        "title_akas cleaned"
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalization::raw;

    #[test]
    fn parses_flags_and_missing_codes() {
        let rows = vec![
            raw(&[
                ("titleId", "tt1"),
                ("ordering", "1"),
                ("region", "US"),
                ("language", "\\N"),
                ("isOriginalTitle", "1"),
            ]),
            raw(&[
                ("titleId", "tt1"),
                ("ordering", "2"),
                ("region", "\\N"),
                ("language", "en"),
                ("isOriginalTitle", "False"),
            ]),
            raw(&[("titleId", "tt1"), ("ordering", "1"), ("region", "DE")]),
        ];
        let aliases = clean_aliases(rows);
        assert_eq!(aliases.len(), 2);
        assert_eq!(
            aliases[0],
            AliasRecord::new("tt1", 1, Some("US"), None, true)
        );
        assert_eq!(aliases[1].region, None);
        assert_eq!(aliases[1].language.as_deref(), Some("en"));
        assert!(!aliases[1].is_original_title);
    }
}
