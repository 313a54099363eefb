//! Per-post full-text extraction.
//!
//! Fetches a post's page and derives the main readable body with a
//! reader-mode algorithm. Every failure — transport, parse, bad URL — is
//! wrapped into [`IngestError::Extraction`] so callers never see a raw
//! transport error.

use std::io::Cursor;

use tracing::debug;

use crate::error::{IngestError, Result};
use crate::fetch::Fetcher;
use crate::traits::store::CancelProbe;

/// Extracted readable content for one post.
#[derive(Debug, Clone)]
pub struct ExtractedContent {
    /// Main readable body (HTML)
    pub body: String,

    /// Content type reported by the page's server
    pub content_type: String,
}

/// Fetch `link` and extract its readable body.
pub async fn extract_full_text(
    fetcher: &Fetcher,
    link: &str,
    probe: &dyn CancelProbe,
) -> Result<ExtractedContent> {
    let page = fetcher
        .fetch_with_retries(link, probe)
        .await
        .map_err(|err| wrap(link, err))?;

    let final_url = url::Url::parse(&page.url).map_err(|err| wrap(link, err))?;

    let product = readability::extractor::extract(&mut Cursor::new(&page.body), &final_url)
        .map_err(|err| IngestError::Extraction {
            link: link.to_string(),
            source: format!("readable-body extraction failed: {err:?}").into(),
        })?;

    debug!(link = %link, bytes = product.content.len(), "extracted readable body");

    Ok(ExtractedContent {
        body: product.content,
        content_type: page
            .content_type
            .unwrap_or_else(|| "text/html".to_string()),
    })
}

fn wrap(link: &str, err: impl std::error::Error + Send + Sync + 'static) -> IngestError {
    IngestError::Extraction {
        link: link.to_string(),
        source: Box::new(err),
    }
}
