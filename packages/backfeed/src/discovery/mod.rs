//! Historical-URL discovery.
//!
//! Live feeds typically expose only recent entries, so the pipeline
//! reconstructs history from independent sources: archive snapshots of the
//! feed URL, or — for sites with no feed at all — a windowed walk of an
//! external search index.

pub mod serper;
pub mod wayback;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use indexmap::IndexMap;
use tracing::{info, warn};

use crate::error::Result;
use crate::traits::archive::ArchiveIndex;
use crate::traits::search::SearchIndex;
use crate::types::{IngestConfig, PostCandidate};

pub use serper::SerperSearch;
pub use wayback::WaybackCdx;

/// Candidate URLs to fetch and parse for a feed: one playback URL per
/// distinct archived content digest, then the live feed URL last.
///
/// Snapshot lookups are retried with multiplicative backoff; a fatal
/// classification short-circuits to just the live URL rather than failing
/// the job — archive coverage is best-effort by design.
pub async fn historical_urls(
    archive: &dyn ArchiveIndex,
    url: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    config: &IngestConfig,
) -> Result<Vec<String>> {
    let mut snapshots = Vec::new();
    let mut last_error = None;

    for attempt in 0..=config.request_retry_count {
        if attempt > 0 {
            tokio::time::sleep(config.backoff_for_attempt(attempt)).await;
        }
        match archive.snapshots(url, from, to).await {
            Ok(records) => {
                snapshots = records;
                last_error = None;
                break;
            }
            Err(err) if err.is_fatal_fetch() => {
                warn!(url = %url, error = %err, "archive index unavailable, falling back to live feed only");
                last_error = None;
                break;
            }
            Err(err) => {
                warn!(url = %url, attempt = attempt, error = %err, "archive lookup failed");
                last_error = Some(err);
            }
        }
    }
    if let Some(err) = last_error {
        return Err(err);
    }

    // Same content captured at multiple timestamps is one discovery unit.
    let mut by_digest = IndexMap::new();
    for record in snapshots {
        if record.status_code != 200 {
            continue;
        }
        by_digest.insert(record.digest.clone(), record);
    }

    let mut urls: Vec<String> = by_digest
        .values()
        .map(|record| archive.playback_url(record))
        .collect();
    urls.push(url.to_string());

    info!(url = %url, candidates = urls.len(), "historical discovery complete");
    Ok(urls)
}

/// Walk the search index over `[from − 1 day, to]` in fixed windows,
/// accumulating candidates keyed by link (a later hit for the same link
/// overwrites an earlier one). A hit with no reported date is assigned the
/// window's end — a deliberate best-effort default, not an error.
pub async fn search_candidates(
    index: &dyn SearchIndex,
    site: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    config: &IngestConfig,
) -> Result<IndexMap<String, PostCandidate>> {
    let window = ChronoDuration::days(config.search_window_days);
    let overlap = ChronoDuration::days(1);

    let mut entries: IndexMap<String, PostCandidate> = IndexMap::new();
    let mut credits_used: u32 = 0;

    let mut frame_start = from - overlap;
    while frame_start < to {
        let frame_end = frame_start + window;

        let mut page = 1;
        loop {
            let result = index.search_window(site, frame_start, frame_end, page).await?;
            credits_used += result.credits_used;
            let hit_count = result.hits.len();

            for hit in result.hits {
                let pubdate = hit.date.unwrap_or_else(|| frame_end.min(to));
                let mut candidate = PostCandidate::new(hit.link.clone(), hit.title, pubdate);
                if let Some(snippet) = hit.snippet {
                    candidate.description = snippet;
                }
                entries.insert(candidate.link.clone(), candidate);
            }

            if hit_count < index.page_size() {
                break;
            }
            page += 1;
        }

        // Windows overlap by a day so posts published on a boundary are
        // never missed.
        frame_start = frame_end - overlap;
    }

    info!(
        site = %site,
        posts = entries.len(),
        credits = credits_used,
        "search-index discovery complete"
    );
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::archive::MockArchiveIndex;
    use crate::traits::search::{MockSearchIndex, SearchHit};
    use chrono::TimeZone;
    use std::time::Duration;

    fn fast_config() -> IngestConfig {
        IngestConfig::default()
            .with_retry_count(1)
            .with_base_backoff(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn duplicate_digests_collapse_to_one_playback_url() {
        let feed_url = "https://example.com/rss.xml";
        let archive = MockArchiveIndex::new()
            .with_snapshot(feed_url, "20210101000000", "DIGEST-A")
            .with_snapshot(feed_url, "20210601000000", "DIGEST-A")
            .with_snapshot(feed_url, "20220101000000", "DIGEST-B");

        let from = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let urls = historical_urls(&archive, feed_url, from, to, &fast_config())
            .await
            .unwrap();

        // one URL per distinct digest, live feed last
        assert_eq!(urls.len(), 3);
        assert_eq!(urls.last().map(String::as_str), Some(feed_url));
        assert!(urls[0].contains("id_/https://example.com/rss.xml"));
    }

    #[tokio::test]
    async fn empty_archive_still_yields_live_url() {
        let archive = MockArchiveIndex::new();
        let from = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();

        let urls = historical_urls(
            &archive,
            "https://example.com/rss.xml",
            from,
            to,
            &fast_config(),
        )
        .await
        .unwrap();

        assert_eq!(urls, vec!["https://example.com/rss.xml".to_string()]);
    }

    #[tokio::test]
    async fn search_walk_accumulates_across_windows() {
        let early = Utc.with_ymd_and_hms(2022, 1, 15, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2022, 7, 20, 0, 0, 0).unwrap();
        let index = MockSearchIndex::new()
            .with_hit(SearchHit::new("https://example.com/a", "Post A").with_date(early))
            .with_hit(SearchHit::new("https://example.com/b", "Post B").with_date(late));

        let from = Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2022, 12, 31, 0, 0, 0).unwrap();
        let candidates = search_candidates(&index, "example.com", from, to, &fast_config())
            .await
            .unwrap();

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates["https://example.com/a"].pubdate, early);
        assert_eq!(candidates["https://example.com/b"].pubdate, late);
    }

    #[tokio::test]
    async fn dateless_hits_get_the_window_end() {
        let index =
            MockSearchIndex::new().with_hit(SearchHit::new("https://example.com/x", "Post X"));

        let from = Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2022, 2, 1, 0, 0, 0).unwrap();
        let candidates = search_candidates(&index, "example.com", from, to, &fast_config())
            .await
            .unwrap();

        // window end clamps to `to` when the window overshoots it
        assert_eq!(candidates["https://example.com/x"].pubdate, to);
    }
}
