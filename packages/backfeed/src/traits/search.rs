//! Search-index trait for feedless discovery.
//!
//! Sites with no machine-readable feed are reconstructed by walking an
//! external web-search API in fixed time windows. The trait exposes one
//! result page at a time; the windowed walk lives in
//! [`crate::discovery::search_candidates`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

/// One ranked result from the search index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub link: String,
    pub title: String,

    /// Publish date when the index reports one; discovery substitutes the
    /// window end otherwise
    pub date: Option<DateTime<Utc>>,

    pub snippet: Option<String>,
}

impl SearchHit {
    pub fn new(link: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            link: link.into(),
            title: title.into(),
            date: None,
            snippet: None,
        }
    }

    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }
}

/// One page of search results plus the credits it consumed.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub hits: Vec<SearchHit>,
    pub credits_used: u32,
}

/// External search-query endpoint, paginated per time window.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// One result page (1-based `page`) for posts on `site` published
    /// within `[from, to]`.
    async fn search_window(
        &self,
        site: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        page: u32,
    ) -> Result<SearchPage>;

    /// Results per page; a shorter page ends the window's pagination.
    fn page_size(&self) -> usize {
        100
    }
}

/// Mock search index for testing.
pub struct MockSearchIndex {
    hits: std::sync::RwLock<Vec<SearchHit>>,
    page_size: usize,
}

impl Default for MockSearchIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSearchIndex {
    pub fn new() -> Self {
        Self {
            hits: std::sync::RwLock::new(Vec::new()),
            page_size: 100,
        }
    }

    /// Add a hit returned for every window that covers its date (hits
    /// without a date are returned in every window).
    pub fn with_hit(self, hit: SearchHit) -> Self {
        self.hits.write().unwrap().push(hit);
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }
}

#[async_trait]
impl SearchIndex for MockSearchIndex {
    async fn search_window(
        &self,
        _site: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        page: u32,
    ) -> Result<SearchPage> {
        let hits: Vec<SearchHit> = self
            .hits
            .read()
            .unwrap()
            .iter()
            .filter(|hit| match hit.date {
                Some(date) => date >= from && date <= to,
                None => true,
            })
            .cloned()
            .collect();

        let start = (page.saturating_sub(1) as usize) * self.page_size;
        let page_hits = hits.into_iter().skip(start).take(self.page_size).collect();

        Ok(SearchPage {
            hits: page_hits,
            credits_used: 1,
        })
    }

    fn page_size(&self) -> usize {
        self.page_size
    }
}
