//! Archive-index trait for historical snapshot discovery.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One historical capture of a URL, as reported by an archive index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Capture timestamp in the archive's `YYYYMMDDhhmmss` form
    pub timestamp: String,

    /// The URL that was captured
    pub original_url: String,

    pub mimetype: String,

    pub status_code: u16,

    /// Digest of the captured content; snapshots sharing a digest are the
    /// same content captured at different times
    pub digest: String,

    pub length: u64,
}

impl SnapshotRecord {
    /// Direct-content playback URL for this capture (`id_` suppresses the
    /// archive's HTML chrome).
    pub fn playback_url(&self) -> String {
        format!(
            "https://web.archive.org/web/{}id_/{}",
            self.timestamp, self.original_url
        )
    }
}

/// Query endpoint over an archive of historical captures.
#[async_trait]
pub trait ArchiveIndex: Send + Sync {
    /// Successful captures of `url` within `[from, to]`.
    ///
    /// Implementations should filter to success responses; callers
    /// deduplicate by digest.
    async fn snapshots(
        &self,
        url: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SnapshotRecord>>;

    /// Direct-content playback URL for one of this index's snapshots.
    fn playback_url(&self, record: &SnapshotRecord) -> String {
        record.playback_url()
    }
}

/// Mock archive index for testing.
#[derive(Default)]
pub struct MockArchiveIndex {
    records: std::sync::RwLock<std::collections::HashMap<String, Vec<SnapshotRecord>>>,
}

impl MockArchiveIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add snapshot records for a URL.
    pub fn with_snapshots(self, url: &str, records: Vec<SnapshotRecord>) -> Self {
        self.records
            .write()
            .unwrap()
            .insert(url.to_string(), records);
        self
    }

    /// Add one snapshot with the given timestamp and digest.
    pub fn with_snapshot(self, url: &str, timestamp: &str, digest: &str) -> Self {
        let record = SnapshotRecord {
            timestamp: timestamp.to_string(),
            original_url: url.to_string(),
            mimetype: "application/rss+xml".to_string(),
            status_code: 200,
            digest: digest.to_string(),
            length: 0,
        };
        let mut records = self.records.write().unwrap();
        records.entry(url.to_string()).or_default().push(record);
        drop(records);
        self
    }
}

#[async_trait]
impl ArchiveIndex for MockArchiveIndex {
    async fn snapshots(
        &self,
        url: &str,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<Vec<SnapshotRecord>> {
        Ok(self
            .records
            .read()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_default())
    }
}
