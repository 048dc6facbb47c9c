pub mod fetcher;
pub mod merge;
pub mod parser;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single normalized news entry. The `url` is the identity key: no two
/// items in a merged result share one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsItem {
    pub title: String,
    pub url: String,
    /// May be empty and may contain markup; rendering is the caller's concern.
    pub description: String,
    /// Epoch origin when the source date was missing or unparseable,
    /// so unknown-dated items sort last.
    pub published_at: DateTime<Utc>,
    pub source_name: String,
}

impl NewsItem {
    /// Pure filter predicate for the query surface. A keyword of `""` or
    /// `"all"` matches everything; otherwise it is a case-insensitive
    /// substring match over title and description. Source filters by exact
    /// name, with the same `""`/`"all"` wildcard.
    pub fn matches(&self, keyword: &str, source: &str) -> bool {
        let keyword_ok = keyword.is_empty() || keyword.eq_ignore_ascii_case("all") || {
            let needle = keyword.to_lowercase();
            self.title.to_lowercase().contains(&needle)
                || self.description.to_lowercase().contains(&needle)
        };
        let source_ok =
            source.is_empty() || source.eq_ignore_ascii_case("all") || self.source_name == source;
        keyword_ok && source_ok
    }
}

/// One entry of the static feed registry. Names are unique; they serve as
/// both the display tag and the merge context of an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSource {
    pub name: String,
    pub url: String,
}

impl FeedSource {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
        }
    }
}
