//! Serper-backed search index client.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Deserialize;

use crate::error::{IngestError, Result};
use crate::traits::search::{SearchHit, SearchIndex, SearchPage};

const SERPER_ENDPOINT: &str = "https://google.serper.dev/search";

/// Search index backed by the Serper web-search API.
pub struct SerperSearch {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    page_size: usize,
}

impl SerperSearch {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            endpoint: SERPER_ENDPOINT.to_string(),
            page_size: 100,
        }
    }

    /// Override the endpoint (tests point this at a mock server).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperResult>,
    #[serde(default)]
    credits: u32,
}

#[derive(Debug, Deserialize)]
struct SerperResult {
    link: String,
    title: String,
    date: Option<String>,
    snippet: Option<String>,
}

#[async_trait]
impl SearchIndex for SerperSearch {
    async fn search_window(
        &self,
        site: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        page: u32,
    ) -> Result<SearchPage> {
        let query = format!(
            "site:{} after:{} before:{}",
            site,
            from.date_naive(),
            to.date_naive()
        );

        let response = self
            .client
            .get(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .header("Content-Type", "application/json")
            .query(&[
                ("q", query.as_str()),
                ("num", &self.page_size.to_string()),
                ("page", &page.to_string()),
            ])
            .send()
            .await
            .map_err(|err| IngestError::Search(format!("request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::Search(format!(
                "search request got {status}: {body}"
            )));
        }

        let parsed: SerperResponse = response
            .json()
            .await
            .map_err(|err| IngestError::Search(format!("malformed response: {err}")))?;

        let hits = parsed
            .organic
            .into_iter()
            .map(|result| SearchHit {
                link: result.link,
                title: result.title,
                date: result.date.as_deref().and_then(parse_result_date),
                snippet: result.snippet,
            })
            .collect();

        Ok(SearchPage {
            hits,
            credits_used: parsed.credits,
        })
    }

    fn page_size(&self) -> usize {
        self.page_size
    }
}

/// Search results report dates in a handful of human formats; anything
/// unparseable is treated as missing (discovery substitutes the window
/// end).
fn parse_result_date(raw: &str) -> Option<DateTime<Utc>> {
    const FORMATS: &[&str] = &["%b %d, %Y", "%d %b %Y", "%Y-%m-%d"];
    for format in FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Utc
                .from_local_datetime(&date.and_hms_opt(0, 0, 0)?)
                .single();
        }
    }
    None
}
