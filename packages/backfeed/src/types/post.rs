//! Post records, categories, and the parser-facing candidate value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::feed::SERVICE_NAMESPACE;

/// Default content type for a post before full-text extraction runs.
pub const DEFAULT_CONTENT_TYPE: &str = "plain/text";

/// One article/entry belonging to a feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    /// Deterministic id: UUIDv5 over (feed id, link, pubdate@µs)
    pub id: Uuid,

    pub feed_id: Uuid,

    /// Canonical link; unique within the feed
    pub link: String,

    pub title: String,

    pub pubdate: DateTime<Utc>,

    pub author: Option<String>,

    /// Category names attached to this post
    pub categories: Vec<String>,

    /// Post body; feed-provided summary until extraction replaces it
    pub description: String,

    pub content_type: String,

    /// Whether `description` holds extracted full text
    pub is_full_text: bool,

    /// Created through the manual-post path rather than discovery
    pub added_manually: bool,

    /// Tombstone: the caller deleted this post; rediscovery must not
    /// resurrect it
    pub deleted_manually: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    /// Deterministic post id.
    ///
    /// The publish timestamp participates truncated to microseconds (UTC),
    /// so any sub-microsecond noise a parser introduces cannot change the
    /// identity.
    pub fn id_for(feed_id: Uuid, link: &str, pubdate: DateTime<Utc>) -> Uuid {
        let name = format!("{}+{}+{}", feed_id, link, pubdate.timestamp_micros());
        Uuid::new_v5(&SERVICE_NAMESPACE, name.as_bytes())
    }

    /// Build a post from a parsed candidate.
    pub fn from_candidate(feed_id: Uuid, candidate: &PostCandidate) -> Self {
        let now = Utc::now();
        Self {
            id: Self::id_for(feed_id, &candidate.link, candidate.pubdate),
            feed_id,
            link: candidate.link.clone(),
            title: candidate.title.clone(),
            pubdate: candidate.pubdate,
            author: candidate.author.clone(),
            categories: Vec::new(),
            description: candidate.description.clone(),
            content_type: candidate.content_type.clone(),
            is_full_text: false,
            added_manually: false,
            deleted_manually: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A category name, deduplicated case-sensitively across the system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
}

impl Category {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// One entry as produced by a feed parser or search discovery, before
/// materialization decides whether it becomes a [`Post`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostCandidate {
    /// Link resolved against the document's base URL
    pub link: String,
    pub title: String,
    pub pubdate: DateTime<Utc>,
    pub author: Option<String>,
    pub categories: Vec<String>,
    pub description: String,
    pub content_type: String,
}

impl PostCandidate {
    pub fn new(link: impl Into<String>, title: impl Into<String>, pubdate: DateTime<Utc>) -> Self {
        Self {
            link: link.into(),
            title: title.into(),
            pubdate,
            author: None,
            categories: Vec::new(),
            description: String::new(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
        }
    }

    /// Host component of the candidate link.
    pub fn domain(&self) -> Option<String> {
        url::Url::parse(&self.link)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn post_id_is_deterministic() {
        let feed_id = Uuid::new_v4();
        let pubdate = Utc.with_ymd_and_hms(2022, 5, 4, 12, 30, 45).unwrap();
        let a = Post::id_for(feed_id, "https://example.com/a", pubdate);
        let b = Post::id_for(feed_id, "https://example.com/a", pubdate);
        assert_eq!(a, b);
    }

    #[test]
    fn post_id_truncates_to_microseconds() {
        let feed_id = Uuid::new_v4();
        let base = Utc.with_ymd_and_hms(2022, 5, 4, 12, 30, 45).unwrap();
        let with_nanos = base + chrono::Duration::nanoseconds(750);
        assert_eq!(
            Post::id_for(feed_id, "https://example.com/a", base),
            Post::id_for(feed_id, "https://example.com/a", with_nanos),
        );
    }

    #[test]
    fn post_id_differs_per_link_and_feed() {
        let feed_a = Uuid::new_v4();
        let feed_b = Uuid::new_v4();
        let pubdate = Utc.with_ymd_and_hms(2022, 5, 4, 12, 30, 45).unwrap();
        assert_ne!(
            Post::id_for(feed_a, "https://example.com/a", pubdate),
            Post::id_for(feed_a, "https://example.com/b", pubdate),
        );
        assert_ne!(
            Post::id_for(feed_a, "https://example.com/a", pubdate),
            Post::id_for(feed_b, "https://example.com/a", pubdate),
        );
    }
}
