//! Substring search over product titles, used when no query embedding is
//! available.

use std::sync::Arc;

use crate::index::ProductIndex;
use crate::product::ProductRecord;

/// Return up to `k` products whose title contains `query`, ignoring case.
///
/// Matching is a filter followed by a stable sort into two buckets: titles
/// equal to the query first, then titles that merely contain it. Catalog
/// order is preserved inside each bucket. A blank query matches nothing.
pub fn keyword_search(index: &ProductIndex, query: &str, k: usize) -> Vec<Arc<ProductRecord>> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() || k == 0 {
        return Vec::new();
    }

    let mut matches: Vec<&Arc<ProductRecord>> = index
        .records()
        .iter()
        .filter(|r| r.title_lower().contains(&needle))
        .collect();

    matches.sort_by_key(|r| r.title_lower().trim() != needle);
    matches.into_iter().take(k).map(Arc::clone).collect()
}
