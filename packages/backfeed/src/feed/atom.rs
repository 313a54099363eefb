//! Atom parser.

use atom_syndication::{Entry, Feed as AtomFeed};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::error::{IngestError, Result};
use crate::feed::{resolve_link, FeedParser, ParsedDocument, ParsedFeed};
use crate::types::{FeedType, PostCandidate};

pub struct AtomParser;

impl FeedParser for AtomParser {
    fn parse(&self, base_url: &str, data: &[u8]) -> Result<ParsedDocument> {
        let feed = AtomFeed::read_from(data).map_err(|_| IngestError::UnknownFeedType {
            url: base_url.to_string(),
        })?;

        let mut candidates = IndexMap::new();
        for entry in feed.entries() {
            let Some(link) = alternate_link(entry).and_then(|raw| resolve_link(base_url, raw))
            else {
                continue;
            };

            let mut candidate = PostCandidate::new(
                link.clone(),
                entry.title().to_string(),
                parse_pubdate(entry),
            );
            candidate.author = author_of(entry);
            candidate.categories = entry
                .categories()
                .iter()
                .map(|c| c.term().to_string())
                .filter(|term| !term.is_empty())
                .collect();
            let (description, content_type) = description_of(entry);
            candidate.description = description;
            if let Some(content_type) = content_type {
                candidate.content_type = content_type;
            }

            candidates.insert(link, candidate);
        }

        Ok(ParsedDocument {
            feed: ParsedFeed {
                title: feed.title().to_string(),
                description: feed
                    .subtitle()
                    .map(|s| s.to_string())
                    .unwrap_or_default(),
                feed_type: FeedType::Atom,
            },
            candidates,
        })
    }
}

/// The `rel="alternate"` link (Atom's post link), falling back to the
/// first link on the entry.
fn alternate_link(entry: &Entry) -> Option<&str> {
    entry
        .links()
        .iter()
        .find(|l| l.rel() == "alternate")
        .or_else(|| entry.links().first())
        .map(|l| l.href())
}

/// `published`, falling back to the mandatory `updated`.
fn parse_pubdate(entry: &Entry) -> DateTime<Utc> {
    entry
        .published()
        .copied()
        .unwrap_or_else(|| *entry.updated())
        .with_timezone(&Utc)
}

fn author_of(entry: &Entry) -> Option<String> {
    let names: Vec<&str> = entry
        .authors()
        .iter()
        .map(|person| person.name())
        .filter(|name| !name.is_empty())
        .collect();
    if names.is_empty() {
        None
    } else {
        Some(names.join(", "))
    }
}

/// `summary` first, then `content` — content wins when both are present.
/// Returns the body and, when the content element declares one, its type.
fn description_of(entry: &Entry) -> (String, Option<String>) {
    let mut description = entry
        .summary()
        .map(|s| s.to_string())
        .unwrap_or_default();
    let mut content_type = None;

    if let Some(content) = entry.content() {
        if let Some(value) = content.value() {
            description = value.to_string();
            content_type = content.content_type().map(str::to_string);
        }
    }

    (description, content_type)
}
