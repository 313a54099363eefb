//! RSS 2.0 parser.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::error::{IngestError, Result};
use crate::feed::{fallback_pubdate, resolve_link, FeedParser, ParsedDocument, ParsedFeed};
use crate::types::{FeedType, PostCandidate};

pub struct RssParser;

impl FeedParser for RssParser {
    fn parse(&self, base_url: &str, data: &[u8]) -> Result<ParsedDocument> {
        let channel =
            rss::Channel::read_from(data).map_err(|_| IngestError::UnknownFeedType {
                url: base_url.to_string(),
            })?;

        let mut candidates = IndexMap::new();
        for item in channel.items() {
            let Some(link) = item.link().and_then(|raw| resolve_link(base_url, raw)) else {
                continue;
            };

            let mut candidate = PostCandidate::new(
                link.clone(),
                item.title().unwrap_or_default(),
                parse_pubdate(item, &link),
            );
            candidate.author = author_of(item);
            candidate.categories = item
                .categories()
                .iter()
                .map(|c| c.name().to_string())
                .filter(|name| !name.is_empty())
                .collect();
            candidate.description = item.description().unwrap_or_default().to_string();

            candidates.insert(link, candidate);
        }

        Ok(ParsedDocument {
            feed: ParsedFeed {
                title: channel.title().to_string(),
                description: channel.description().to_string(),
                feed_type: FeedType::Rss,
            },
            candidates,
        })
    }
}

/// `pubDate` (RFC 2822), falling back to a Dublin Core `dc:date`
/// (RFC 3339), falling back to fetch time.
fn parse_pubdate(item: &rss::Item, link: &str) -> DateTime<Utc> {
    if let Some(raw) = item.pub_date() {
        if let Ok(date) = DateTime::parse_from_rfc2822(raw) {
            return date.with_timezone(&Utc);
        }
        if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
            return date.with_timezone(&Utc);
        }
    }
    if let Some(dc) = item.dublin_core_ext() {
        for raw in dc.dates() {
            if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
                return date.with_timezone(&Utc);
            }
        }
    }
    fallback_pubdate(link)
}

/// `dc:creator`, falling back to the item-level `author` element.
fn author_of(item: &rss::Item) -> Option<String> {
    if let Some(dc) = item.dublin_core_ext() {
        if let Some(creator) = dc.creators().first() {
            return Some(creator.clone());
        }
    }
    item.author().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const DOC: &[u8] = br#"<?xml version="1.0"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/">
<channel>
  <title>Example Blog</title>
  <description>Posts about examples</description>
  <link>https://example.com/</link>
  <item>
    <title>First post</title>
    <link>/posts/first</link>
    <pubDate>Wed, 04 May 2022 12:30:45 GMT</pubDate>
    <dc:creator>Alice</dc:creator>
    <category>rust</category>
    <category>feeds</category>
    <description>A short summary.</description>
  </item>
  <item>
    <title>Duplicate, superseded</title>
    <link>https://example.com/posts/second</link>
    <pubDate>Thu, 05 May 2022 08:00:00 GMT</pubDate>
  </item>
  <item>
    <title>Duplicate, kept</title>
    <link>https://example.com/posts/second</link>
    <pubDate>Thu, 05 May 2022 09:00:00 GMT</pubDate>
  </item>
  <item>
    <title>No link, dropped</title>
  </item>
</channel></rss>"#;

    #[test]
    fn parses_channel_metadata() {
        let doc = RssParser.parse("https://example.com/rss.xml", DOC).unwrap();
        assert_eq!(doc.feed.title, "Example Blog");
        assert_eq!(doc.feed.description, "Posts about examples");
        assert_eq!(doc.feed.feed_type, FeedType::Rss);
    }

    #[test]
    fn parses_items_with_resolved_links() {
        let doc = RssParser.parse("https://example.com/rss.xml", DOC).unwrap();
        assert_eq!(doc.candidates.len(), 2);

        let first = &doc.candidates["https://example.com/posts/first"];
        assert_eq!(first.title, "First post");
        assert_eq!(first.author.as_deref(), Some("Alice"));
        assert_eq!(first.categories, vec!["rust", "feeds"]);
        assert_eq!(first.description, "A short summary.");
        assert_eq!(
            first.pubdate,
            Utc.with_ymd_and_hms(2022, 5, 4, 12, 30, 45).unwrap()
        );
    }

    #[test]
    fn later_duplicate_link_overwrites_earlier() {
        let doc = RssParser.parse("https://example.com/rss.xml", DOC).unwrap();
        let second = &doc.candidates["https://example.com/posts/second"];
        assert_eq!(second.title, "Duplicate, kept");
    }

    #[test]
    fn malformed_document_is_unknown_feed_type() {
        let err = RssParser
            .parse("https://example.com/rss.xml", b"<rss><unclosed")
            .unwrap_err();
        assert!(matches!(err, IngestError::UnknownFeedType { .. }));
    }
}
