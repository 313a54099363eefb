//! Feed records and their deterministic identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fixed namespace for all deterministic (v5) identifiers.
///
/// Changing this value changes every feed and post id the service has ever
/// handed out, so it is a constant rather than configuration.
pub const SERVICE_NAMESPACE: Uuid = uuid::uuid!("6c6e6448-04d4-42a3-9214-4f0f7d02694e");

/// How a feed's content is discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedType {
    /// RSS 2.0 document
    Rss,
    /// Atom document
    Atom,
    /// Manually curated; no machine-readable source exists
    Skeleton,
    /// No feed at all; posts are discovered through a search index
    SearchIndex,
}

impl FeedType {
    /// Feed families that carry a parseable document.
    pub fn is_parseable(&self) -> bool {
        matches!(self, FeedType::Rss | FeedType::Atom)
    }
}

/// A subscribed content source identified by URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    /// Deterministic id: UUIDv5 of the feed URL under [`SERVICE_NAMESPACE`]
    pub id: Uuid,

    /// Canonical feed URL (identity input; never rewritten)
    pub url: String,

    /// Feed-level title, filled from the first successful parse
    pub title: Option<String>,

    /// Feed-level description, filled from the first successful parse
    pub description: Option<String>,

    /// Discovery family
    pub feed_type: FeedType,

    /// Cosmetic URL shown to humans; no identity significance
    pub pretty_url: Option<String>,

    /// Earliest publish date across all accepted posts (min fold)
    pub earliest_item_pubdate: Option<DateTime<Utc>>,

    /// Latest publish date across all accepted posts (max fold); doubles as
    /// the freshness watermark the next ingest starts from
    pub latest_item_pubdate: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Feed {
    /// Create a feed for a URL. The id is a pure function of the URL, so
    /// re-registering the same URL always yields the same identity.
    pub fn new(url: impl Into<String>, feed_type: FeedType) -> Self {
        let url = url.into();
        let now = Utc::now();
        Self {
            id: Self::id_for_url(&url),
            url,
            title: None,
            description: None,
            feed_type,
            pretty_url: None,
            earliest_item_pubdate: None,
            latest_item_pubdate: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Deterministic feed id for a URL.
    pub fn id_for_url(url: &str) -> Uuid {
        Uuid::new_v5(&SERVICE_NAMESPACE, url.as_bytes())
    }

    /// Set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the cosmetic URL.
    pub fn with_pretty_url(mut self, pretty_url: impl Into<String>) -> Self {
        self.pretty_url = Some(pretty_url.into());
        self
    }

    /// Host component of the feed URL, used for the remote-domain check.
    pub fn domain(&self) -> Option<String> {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }

    /// Fold a newly accepted post's publish date into the aggregate
    /// earliest/latest bounds. Commutative, so completion order of
    /// concurrent URL tasks does not matter.
    pub fn fold_item_pubdate(&mut self, pubdate: DateTime<Utc>) {
        self.earliest_item_pubdate = Some(match self.earliest_item_pubdate {
            Some(existing) => existing.min(pubdate),
            None => pubdate,
        });
        self.latest_item_pubdate = Some(match self.latest_item_pubdate {
            Some(existing) => existing.max(pubdate),
            None => pubdate,
        });
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn feed_id_is_deterministic() {
        let a = Feed::new("https://example.com/rss.xml", FeedType::Rss);
        let b = Feed::new("https://example.com/rss.xml", FeedType::Rss);
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn feed_id_differs_per_url() {
        let a = Feed::id_for_url("https://example.com/rss.xml");
        let b = Feed::id_for_url("https://example.com/atom.xml");
        assert_ne!(a, b);
    }

    #[test]
    fn fold_tracks_min_and_max() {
        let mut feed = Feed::new("https://example.com/rss.xml", FeedType::Rss);
        let early = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();
        let middle = Utc.with_ymd_and_hms(2022, 3, 1, 0, 0, 0).unwrap();

        feed.fold_item_pubdate(middle);
        feed.fold_item_pubdate(late);
        feed.fold_item_pubdate(early);

        assert_eq!(feed.earliest_item_pubdate, Some(early));
        assert_eq!(feed.latest_item_pubdate, Some(late));
    }

    #[test]
    fn domain_extraction() {
        let feed = Feed::new("https://example.com/blog/rss.xml", FeedType::Rss);
        assert_eq!(feed.domain().as_deref(), Some("example.com"));
    }
}
