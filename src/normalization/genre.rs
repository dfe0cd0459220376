use indexmap::IndexSet;

use super::is_unknown;

pub const GENRE_DELIMITER: char = ',';

/// Upper-cases the first letter of every alphabetic run and lower-cases the
/// rest, so `"sci-fi"` becomes `"Sci-Fi"` and `"DRAMA"` becomes `"Drama"`.
pub fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_word = false;
    for ch in input.chars() {
        if ch.is_alphabetic() {
            if in_word {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(ch);
            in_word = false;
        }
    }
    out
}

/// Canonical form of one genre token, `None` when blank.
pub fn normalize_genre(token: &str) -> Option<String> {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(title_case(trimmed))
    }
}

/// Distinct normalized genres of a title's genre field, in listed order.
/// The "Unknown" marker is kept so callers can map it to the sentinel.
pub fn split_genres(field: &str) -> IndexSet<String> {
    field
        .split(GENRE_DELIMITER)
        .filter_map(normalize_genre)
        .collect()
}

/// Genres that may become dimension members.
pub fn known_genres(field: &str) -> impl Iterator<Item = String> {
    split_genres(field).into_iter().filter(|g| !is_unknown(g))
}
