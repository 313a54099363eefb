//! Wayback Machine CDX client.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{IngestError, Result};
use crate::fetch::Fetcher;
use crate::traits::archive::{ArchiveIndex, SnapshotRecord};
use crate::traits::store::NeverCancelled;

const CDX_ENDPOINT: &str = "http://web.archive.org/cdx/search/cdx";

/// Archive index backed by the Wayback Machine's CDX API.
///
/// Queries go through the shared [`Fetcher`] so they get the same retry,
/// user-agent, and proxy treatment as page fetches.
pub struct WaybackCdx {
    fetcher: Arc<Fetcher>,
    endpoint: String,
}

impl WaybackCdx {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self {
            fetcher,
            endpoint: CDX_ENDPOINT.to_string(),
        }
    }

    /// Override the CDX endpoint (tests point this at a mock server).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn query_url(&self, url: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("from", &from.format("%Y%m%d").to_string())
            .append_pair("to", &to.format("%Y%m%d").to_string())
            .append_pair("url", url)
            .append_pair("filter", "statuscode:200")
            .append_pair("output", "json")
            .append_pair("collapse", "digest")
            .finish();
        format!("{}?{}", self.endpoint, query)
    }
}

#[async_trait]
impl ArchiveIndex for WaybackCdx {
    async fn snapshots(
        &self,
        url: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SnapshotRecord>> {
        let query_url = self.query_url(url, from, to);
        let page = self
            .fetcher
            .fetch_with_retries(&query_url, &NeverCancelled)
            .await?;

        // CDX json output: an array of string rows, first row is the header.
        let rows: Vec<Vec<String>> = serde_json::from_slice(&page.body)
            .map_err(|err| IngestError::Archive(format!("malformed CDX response: {err}")))?;

        let records: Vec<SnapshotRecord> = rows
            .into_iter()
            .skip(1)
            .filter_map(parse_row)
            .collect();

        debug!(url = %url, snapshots = records.len(), "CDX query complete");
        Ok(records)
    }
}

/// Convert one CDX row; malformed rows are dropped, not fatal.
fn parse_row(row: Vec<String>) -> Option<SnapshotRecord> {
    let [_urlkey, timestamp, original_url, mimetype, statuscode, digest, length] =
        TryInto::<[String; 7]>::try_into(row).ok()?;
    Some(SnapshotRecord {
        timestamp,
        original_url,
        mimetype,
        status_code: statuscode.parse().ok()?,
        digest,
        length: length.parse().ok()?,
    })
}
