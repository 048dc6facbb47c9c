use std::collections::HashSet;

use crate::feed::NewsItem;

/// Fold `incoming` into `base`, deduplicating on `url` with first-seen-wins:
/// a base entry is never overwritten by an incoming duplicate. This lets
/// cached items survive a re-merge with a fresher fetch of the same URL, and
/// gives earlier-settled sources priority over later ones when two sources
/// carry the same URL.
///
/// The result is sorted by `published_at`, most recent first; ties keep
/// insertion order. Neither input is mutated.
pub fn merge(base: &[NewsItem], incoming: &[NewsItem]) -> Vec<NewsItem> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(base.len() + incoming.len());
    let mut merged: Vec<NewsItem> = Vec::with_capacity(base.len() + incoming.len());

    for item in base.iter().chain(incoming.iter()) {
        if seen.insert(item.url.as_str()) {
            merged.push(item.clone());
        }
    }

    merged.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    merged
}
