use std::collections::HashSet;

use agent_primitives::SearchResult;

/// Keeps the first result seen for each URL, preserving the order of first
/// occurrences.
#[must_use]
pub fn dedup_by_url(results: impl IntoIterator<Item = SearchResult>) -> Vec<SearchResult> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .filter(|result| seen.insert(result.url().to_owned()))
        .collect()
}
