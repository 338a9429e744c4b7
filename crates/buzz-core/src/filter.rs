//! Keyword filters.
//!
//! A subscription carries a list of lowercase keywords. A message matches
//! when any keyword occurs anywhere in its lowercased text.

/// Separator between filters in user input and in stored rows.
pub const FILTER_SEPARATOR: char = ',';

/// Check whether `text` matches at least one of `filters`.
///
/// `text` is lowercased here; `filters` must already be lowercase. An empty
/// filter list never matches.
#[must_use]
pub fn matches<S: AsRef<str>>(text: &str, filters: &[S]) -> bool {
    if filters.is_empty() {
        return false;
    }
    matches_lowercase(&text.to_lowercase(), filters)
}

/// Same as [`matches`] for text that is already lowercase.
pub(crate) fn matches_lowercase<S: AsRef<str>>(text: &str, filters: &[S]) -> bool {
    filters.iter().any(|f| text.contains(f.as_ref()))
}

/// Normalize a comma separated filter list.
///
/// Entries are trimmed and lowercased; empty entries are dropped.
#[must_use]
pub fn parse_filters(raw: &str) -> Vec<String> {
    raw.split(FILTER_SEPARATOR)
        .map(|f| f.trim().to_lowercase())
        .filter(|f| !f.is_empty())
        .collect()
}

/// Join filters back into their stored form.
#[must_use]
pub fn join_filters<S: AsRef<str>>(filters: &[S]) -> String {
    filters
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(",")
}
