use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::warn;

use crate::error::{Error, Result};
use crate::feed::NewsItem;

/// The two syndication dialects we understand. Each variant supplies its
/// container element and the fallback order for the description and
/// publication-date fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedDialect {
    Rss,
    Atom,
}

impl FeedDialect {
    fn container(&self) -> &'static str {
        match self {
            FeedDialect::Rss => "item",
            FeedDialect::Atom => "entry",
        }
    }

    fn description_fields(&self) -> &'static [&'static str] {
        match self {
            FeedDialect::Rss => &["description", "summary"],
            FeedDialect::Atom => &["summary", "description"],
        }
    }

    fn date_fields(&self) -> &'static [&'static str] {
        match self {
            FeedDialect::Rss => &["pubDate", "dc:date", "updated", "published"],
            FeedDialect::Atom => &["updated", "published", "pubDate", "dc:date"],
        }
    }
}

/// Raw per-node field capture before normalization. `fields` holds the first
/// non-empty text of each direct child element; a `link` element's `href`
/// attribute is kept separately because it outranks link text.
#[derive(Debug, Default)]
struct RawEntry {
    fields: HashMap<String, String>,
    link_href: Option<String>,
}

pub struct FeedParser;

impl Default for FeedParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedParser {
    pub fn new() -> Self {
        Self
    }

    /// Convert a raw XML document into normalized items. Detection prefers
    /// the RSS path: if the document has any `item` nodes they are used
    /// exclusively, otherwise the Atom `entry` path applies. A malformed
    /// document yields an empty sequence, never an error — one bad source
    /// must not stall the aggregation cycle.
    pub fn parse(&self, raw_document: &str, source_name: &str) -> Vec<NewsItem> {
        match self.parse_inner(raw_document, source_name) {
            Ok(items) => items,
            Err(e) => {
                warn!(source = source_name, error = %e, "discarding malformed feed document");
                Vec::new()
            }
        }
    }

    fn parse_inner(&self, raw_document: &str, source_name: &str) -> Result<Vec<NewsItem>> {
        let (nodes_seen, entries) = extract_nodes(raw_document, FeedDialect::Rss)?;
        let (dialect, entries) = if nodes_seen > 0 {
            (FeedDialect::Rss, entries)
        } else {
            (FeedDialect::Atom, extract_nodes(raw_document, FeedDialect::Atom)?.1)
        };

        Ok(entries
            .into_iter()
            .filter_map(|entry| build_item(entry, dialect, source_name))
            .collect())
    }
}

/// Walk the document and collect one `RawEntry` per container node of the
/// given dialect. Also reports how many container nodes were seen, so the
/// caller can distinguish "no RSS nodes" from "RSS nodes that all dropped".
fn extract_nodes(raw_document: &str, dialect: FeedDialect) -> Result<(usize, Vec<RawEntry>)> {
    let mut reader = Reader::from_str(raw_document);
    let mut entries = Vec::new();
    let mut nodes_seen = 0usize;

    let mut current: Option<RawEntry> = None;
    // Depth below the container node; field text is captured per direct
    // child (depth 1), including the text of any nested markup.
    let mut depth = 0usize;
    let mut pending: Option<(String, String)> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let tag = qualified_name(e.name().as_ref());
                match current.as_mut() {
                    None => {
                        if tag == dialect.container() {
                            nodes_seen += 1;
                            current = Some(RawEntry::default());
                            depth = 0;
                            pending = None;
                        }
                    }
                    Some(entry) => {
                        depth += 1;
                        if depth == 1 {
                            if tag == "link" && entry.link_href.is_none() {
                                entry.link_href = attribute_value(&e, b"href");
                            }
                            pending = Some((tag, String::new()));
                        }
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                let tag = qualified_name(e.name().as_ref());
                match current.as_mut() {
                    None => {
                        if tag == dialect.container() {
                            nodes_seen += 1;
                        }
                    }
                    Some(entry) => {
                        if depth == 0 && tag == "link" && entry.link_href.is_none() {
                            entry.link_href = attribute_value(&e, b"href");
                        }
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if current.is_some() {
                    if let Some((_, buf)) = pending.as_mut() {
                        match t.unescape() {
                            Ok(text) => buf.push_str(&text),
                            Err(_) => buf.push_str(&String::from_utf8_lossy(t.as_ref())),
                        }
                    }
                }
            }
            Ok(Event::CData(t)) => {
                if current.is_some() {
                    if let Some((_, buf)) = pending.as_mut() {
                        buf.push_str(&String::from_utf8_lossy(&t.into_inner()));
                    }
                }
            }
            Ok(Event::End(e)) => {
                if current.is_some() {
                    let tag = qualified_name(e.name().as_ref());
                    if depth == 0 {
                        if tag == dialect.container() {
                            if let Some(entry) = current.take() {
                                entries.push(entry);
                            }
                        }
                    } else {
                        if depth == 1 {
                            if let (Some(entry), Some((field, buf))) =
                                (current.as_mut(), pending.take())
                            {
                                let text = buf.trim();
                                if !text.is_empty() {
                                    entry.fields.entry(field).or_insert_with(|| text.to_string());
                                }
                            }
                        }
                        depth -= 1;
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(Error::FeedParse(e.to_string())),
        }
    }

    Ok((nodes_seen, entries))
}

fn qualified_name(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}

fn attribute_value(e: &BytesStart, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == name)
        .and_then(|attr| attr.unescape_value().ok())
        .map(|value| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// Normalize one captured node. Nodes without a resolvable link are dropped:
/// a link-less item cannot be deduplicated or opened.
fn build_item(entry: RawEntry, dialect: FeedDialect, source_name: &str) -> Option<NewsItem> {
    let url = entry
        .link_href
        .or_else(|| entry.fields.get("link").cloned())?;

    let title = entry
        .fields
        .get("title")
        .cloned()
        .unwrap_or_else(|| "Untitled".to_string());

    let description = dialect
        .description_fields()
        .iter()
        .find_map(|field| entry.fields.get(*field))
        .cloned()
        .unwrap_or_default();

    let published_at = dialect
        .date_fields()
        .iter()
        .find_map(|field| entry.fields.get(*field))
        .map(|raw| parse_timestamp(raw))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    Some(NewsItem {
        title,
        url,
        description,
        published_at,
        source_name: source_name.to_string(),
    })
}

/// Feed dates in the wild are mostly RFC 2822 (RSS) or RFC 3339 (Atom),
/// with the odd bare `YYYY-MM-DD HH:MM:SS`. Anything else maps to the epoch
/// origin, which sorts last.
fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc2822(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc))
        })
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS_SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
    <channel>
        <title>Tech News Daily</title>
        <link>https://example.com</link>
        <item>
            <title>First Article</title>
            <link>https://example.com/first</link>
            <description>This is the first article</description>
            <pubDate>Fri, 15 Mar 2024 09:00:00 GMT</pubDate>
        </item>
        <item>
            <title>Second Article</title>
            <link>https://example.com/second</link>
            <description>This is the second article</description>
            <pubDate>Fri, 15 Mar 2024 08:00:00 GMT</pubDate>
        </item>
    </channel>
</rss>"#;

    const ATOM_SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
    <title>Science Blog</title>
    <link href="https://example.com"/>
    <entry>
        <title>Atom Article One</title>
        <link href="https://example.com/atom1"/>
        <summary>Summary of the first atom article</summary>
        <updated>2024-03-15T09:00:00Z</updated>
        <author><name>Atom Author</name></author>
    </entry>
</feed>"#;

    #[test]
    fn test_parse_rss_items() {
        let items = FeedParser::new().parse(RSS_SAMPLE, "Tech News");

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "First Article");
        assert_eq!(items[0].url, "https://example.com/first");
        assert_eq!(items[0].description, "This is the first article");
        assert_eq!(items[0].source_name, "Tech News");
        assert!(items[0].published_at > DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn test_parse_atom_entries_via_fallback() {
        // No `item` nodes at all, so detection must take the Atom path.
        let items = FeedParser::new().parse(ATOM_SAMPLE, "Science");

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Atom Article One");
        assert_eq!(items[0].url, "https://example.com/atom1");
        assert_eq!(items[0].description, "Summary of the first atom article");
        assert_eq!(
            items[0].published_at,
            DateTime::parse_from_rfc3339("2024-03-15T09:00:00Z").unwrap()
        );
    }

    #[test]
    fn test_rss_nodes_take_precedence_over_atom_nodes() {
        let mixed = r#"<root>
            <item>
                <title>From RSS</title>
                <link>https://example.com/rss</link>
            </item>
            <entry>
                <title>From Atom</title>
                <link href="https://example.com/atom"/>
            </entry>
        </root>"#;

        let items = FeedParser::new().parse(mixed, "Mixed");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "From RSS");
    }

    #[test]
    fn test_document_with_neither_dialect_is_empty() {
        let doc = r#"<html><body><p>not a feed</p></body></html>"#;
        assert!(FeedParser::new().parse(doc, "Nope").is_empty());
    }

    #[test]
    fn test_malformed_xml_yields_empty_sequence() {
        let doc = r#"<rss><channel><item><title>Broken</wrong></title></item></channel></rss>"#;
        assert!(FeedParser::new().parse(doc, "Broken").is_empty());
    }

    #[test]
    fn test_link_less_node_is_dropped() {
        let doc = r#"<rss><channel>
            <item><title>No link here</title><description>text</description></item>
            <item><title>Has link</title><link>https://example.com/ok</link></item>
        </channel></rss>"#;

        let items = FeedParser::new().parse(doc, "Feed");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].url, "https://example.com/ok");
    }

    #[test]
    fn test_missing_title_falls_back_to_untitled() {
        let doc = r#"<rss><channel>
            <item><link>https://example.com/notitle</link></item>
        </channel></rss>"#;

        let items = FeedParser::new().parse(doc, "Feed");
        assert_eq!(items[0].title, "Untitled");
    }

    #[test]
    fn test_unparseable_date_maps_to_epoch() {
        let doc = r#"<rss><channel>
            <item>
                <title>Bad date</title>
                <link>https://example.com/bad-date</link>
                <pubDate>sometime last week</pubDate>
            </item>
        </channel></rss>"#;

        let items = FeedParser::new().parse(doc, "Feed");
        assert_eq!(items[0].published_at, DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn test_dc_date_is_honored_as_last_resort() {
        let doc = r#"<rss><channel>
            <item>
                <title>Dublin Core</title>
                <link>https://example.com/dc</link>
                <dc:date>2024-03-15T10:00:00Z</dc:date>
            </item>
        </channel></rss>"#;

        let items = FeedParser::new().parse(doc, "Feed");
        assert_eq!(
            items[0].published_at,
            DateTime::parse_from_rfc3339("2024-03-15T10:00:00Z").unwrap()
        );
    }

    #[test]
    fn test_cdata_description_is_preserved_with_markup() {
        let doc = r#"<rss><channel>
            <item>
                <title>CDATA</title>
                <link>https://example.com/cdata</link>
                <description><![CDATA[<p>This is <strong>HTML</strong></p>]]></description>
            </item>
        </channel></rss>"#;

        let items = FeedParser::new().parse(doc, "Feed");
        assert!(items[0].description.contains("<strong>HTML</strong>"));
    }

    #[test]
    fn test_rss_description_falls_back_to_summary() {
        let doc = r#"<rss><channel>
            <item>
                <title>Summary only</title>
                <link>https://example.com/summary</link>
                <summary>the summary text</summary>
            </item>
        </channel></rss>"#;

        let items = FeedParser::new().parse(doc, "Feed");
        assert_eq!(items[0].description, "the summary text");
    }

    #[test]
    fn test_atom_link_href_outranks_link_text() {
        let doc = r#"<feed>
            <entry>
                <title>Entry</title>
                <link href="https://example.com/href">https://example.com/text</link>
                <updated>2024-03-15T09:00:00Z</updated>
            </entry>
        </feed>"#;

        let items = FeedParser::new().parse(doc, "Feed");
        assert_eq!(items[0].url, "https://example.com/href");
    }

    #[test]
    fn test_nested_elements_do_not_bleed_into_fields() {
        // The <source> element inside an Atom entry carries its own title
        // and updated; neither may leak into the entry's fields.
        let doc = r#"<feed>
            <entry>
                <link href="https://example.com/nested"/>
                <source>
                    <title>Upstream Feed</title>
                    <updated>1999-01-01T00:00:00Z</updated>
                </source>
                <title>Real Title</title>
                <updated>2024-03-15T09:00:00Z</updated>
            </entry>
        </feed>"#;

        let items = FeedParser::new().parse(doc, "Feed");
        assert_eq!(items[0].title, "Real Title");
        assert_eq!(
            items[0].published_at,
            DateTime::parse_from_rfc3339("2024-03-15T09:00:00Z").unwrap()
        );
    }

    #[test]
    fn test_timestamp_formats() {
        assert_eq!(
            parse_timestamp("Fri, 15 Mar 2024 09:00:00 GMT"),
            DateTime::parse_from_rfc3339("2024-03-15T09:00:00Z").unwrap()
        );
        assert_eq!(
            parse_timestamp("2024-03-15T09:00:00+00:00"),
            DateTime::parse_from_rfc3339("2024-03-15T09:00:00Z").unwrap()
        );
        assert_eq!(
            parse_timestamp("2024-03-15 09:00:00"),
            DateTime::parse_from_rfc3339("2024-03-15T09:00:00Z").unwrap()
        );
        assert_eq!(parse_timestamp("not a date"), DateTime::<Utc>::UNIX_EPOCH);
    }
}
