//! HTTP retrieval with retry/backoff and proxy fallback.
//!
//! Every outbound page request in the pipeline goes through [`Fetcher`]:
//! archive playback URLs, live feed URLs, and post pages for full-text
//! extraction. Retries back off multiplicatively; a fatal classification
//! aborts without consuming retries. When an anti-bot proxy credential is
//! configured, requests route through the proxy service instead of going
//! direct.

use std::io::Read;
use std::time::Duration;

use rand::seq::SliceRandom;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{FetchError, FetchResult};
use crate::traits::store::CancelProbe;
use crate::types::IngestConfig;

const PROXY_ENDPOINT: &str = "https://api.scrapfly.io/scrape";

/// Countries the proxy may route through.
const PROXY_COUNTRIES: &str = "us,ca,mx,gb,fr,de,au,at,be,hr,cz,dk,ee,fi,ie,se,es,pt,nl";

/// Rotated per request; archive frontends throttle repeated agents.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:124.0) Gecko/20100101 Firefox/124.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (Version/17.4 Safari/605.1.15)",
];

/// A fetched page: body bytes, reported content type, and the final URL
/// after redirects.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub url: String,
}

impl FetchedPage {
    /// Body decoded as UTF-8, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// HTTP fetcher with retry/backoff and an optional anti-bot proxy path.
pub struct Fetcher {
    client: reqwest::Client,
    retry_count: u32,
    base_backoff: Duration,
    backoff_multiplier: f64,
    proxy_api_key: Option<String>,
    proxy_endpoint: String,
}

impl Fetcher {
    pub fn new(config: &IngestConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.fetch_timeout)
            .redirect(reqwest::redirect::Policy::limited(3))
            .build()
            .expect("reqwest client construction cannot fail with static options");

        Self {
            client,
            retry_count: config.request_retry_count,
            base_backoff: config.base_backoff,
            backoff_multiplier: config.backoff_multiplier,
            proxy_api_key: config.proxy_api_key.clone(),
            proxy_endpoint: PROXY_ENDPOINT.to_string(),
        }
    }

    /// Override the proxy endpoint (tests point this at a mock server).
    pub fn with_proxy_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.proxy_endpoint = endpoint.into();
        self
    }

    /// Fetch a URL, retrying transient failures with multiplicative
    /// backoff. Fatal errors abort immediately; the cancellation probe is
    /// checked at every backoff boundary so a cancelled job stops sleeping
    /// instead of finishing its retry budget.
    pub async fn fetch_with_retries(
        &self,
        url: &str,
        probe: &dyn CancelProbe,
    ) -> FetchResult<FetchedPage> {
        let mut last_error: Option<FetchError> = None;

        for attempt in 0..=self.retry_count {
            if attempt > 0 {
                tokio::time::sleep(self.backoff_for_attempt(attempt)).await;
                if probe.is_cancelled().await {
                    return Err(FetchError::Cancelled);
                }
            }

            match self.fetch_once(url).await {
                Ok(page) => return Ok(page),
                Err(err) if err.is_fatal() => return Err(err),
                Err(FetchError::Cancelled) => return Err(FetchError::Cancelled),
                Err(err) => {
                    warn!(url = %url, attempt = attempt, error = %err, "fetch attempt failed");
                    last_error = Some(err);
                }
            }
        }

        Err(FetchError::RetriesExhausted {
            url: url.to_string(),
            attempts: self.retry_count + 1,
            source: Box::new(last_error.expect("at least one attempt ran")),
        })
    }

    /// Single fetch attempt; routes through the proxy when configured.
    pub async fn fetch_once(&self, url: &str) -> FetchResult<FetchedPage> {
        match &self.proxy_api_key {
            Some(key) => self.fetch_via_proxy(url, key).await,
            None => self.fetch_direct(url).await,
        }
    }

    async fn fetch_direct(&self, url: &str) -> FetchResult<FetchedPage> {
        debug!(url = %url, "fetching");
        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, random_user_agent())
            .send()
            .await?;

        let status = response.status();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if !status.is_success() {
            return Err(FetchError::Status {
                url: final_url,
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?.to_vec();
        // Archive playback sometimes hands back a raw br body regardless of
        // the Accept-Encoding negotiation.
        let body = decompress_if_brotli(body);

        Ok(FetchedPage {
            body,
            content_type,
            url: final_url,
        })
    }

    async fn fetch_via_proxy(&self, url: &str, api_key: &str) -> FetchResult<FetchedPage> {
        debug!(url = %url, "fetching via anti-bot proxy");
        let response = self
            .client
            .get(&self.proxy_endpoint)
            .query(&[
                ("key", api_key),
                ("url", url),
                ("country", PROXY_COUNTRIES),
            ])
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let reason = response.text().await.unwrap_or_default();
            return Err(FetchError::Proxy {
                status: status.as_u16(),
                reason,
            });
        }

        let envelope: ProxyEnvelope = response.json().await?;
        let result = envelope.result;

        if result.status_code > 499 {
            return Err(FetchError::Fatal {
                url: url.to_string(),
                status: result.status_code,
            });
        }
        if result.status_code > 399 {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: result.status_code,
            });
        }
        if result.status_code > 299 {
            return Err(FetchError::Redirected {
                url: url.to_string(),
                status: result.status_code,
            });
        }

        Ok(FetchedPage {
            body: result.content.into_bytes(),
            content_type: result.content_type,
            url: result.url,
        })
    }

    fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        self.base_backoff.mul_f64(factor)
    }
}

/// Envelope the proxy service wraps around the upstream response.
#[derive(Debug, Deserialize)]
struct ProxyEnvelope {
    result: ProxyResult,
}

#[derive(Debug, Deserialize)]
struct ProxyResult {
    status_code: u16,
    #[allow(dead_code)]
    status: String,
    content: String,
    content_type: Option<String>,
    url: String,
}

fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .expect("user agent pool is not empty")
}

/// Try decompressing the body as brotli; keep the original bytes when it
/// is not actually br-encoded.
fn decompress_if_brotli(body: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::new();
    let mut reader = brotli::Decompressor::new(&body[..], 4096);
    match reader.read_to_end(&mut out) {
        Ok(n) if n > 0 => {
            debug!(original = body.len(), decompressed = n, "brotli fallback decompressed body");
            out
        }
        _ => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::store::NeverCancelled;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_config() -> IngestConfig {
        IngestConfig::default()
            .with_retry_count(2)
            .with_base_backoff(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn direct_fetch_returns_body_and_final_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<rss/>".as_bytes(), "application/rss+xml"),
            )
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(&fast_config());
        let page = fetcher
            .fetch_with_retries(&format!("{}/feed", server.uri()), &NeverCancelled)
            .await
            .unwrap();

        assert_eq!(page.text(), "<rss/>");
        assert_eq!(page.content_type.as_deref(), Some("application/rss+xml"));
    }

    #[tokio::test]
    async fn transient_status_is_retried_until_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(&fast_config());
        let page = fetcher
            .fetch_with_retries(&format!("{}/feed", server.uri()), &NeverCancelled)
            .await
            .unwrap();

        assert_eq!(page.text(), "ok");
    }

    #[tokio::test]
    async fn exhausted_retries_wrap_the_last_cause() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .expect(3) // initial attempt + 2 retries
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(&fast_config());
        let err = fetcher
            .fetch_with_retries(&format!("{}/feed", server.uri()), &NeverCancelled)
            .await
            .unwrap_err();

        match err {
            FetchError::RetriesExhausted { attempts, source, .. } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*source, FetchError::Status { status: 502, .. }));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn proxy_server_error_is_fatal_without_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": {
                    "status_code": 503,
                    "status": "Service Unavailable",
                    "content": "",
                    "content_type": null,
                    "url": "https://example.com/post"
                }
            })))
            .expect(1) // fatal: no retry traffic
            .mount(&server)
            .await;

        let config = fast_config().with_proxy_api_key("test-key");
        let fetcher = Fetcher::new(&config).with_proxy_endpoint(format!("{}/scrape", server.uri()));

        let err = fetcher
            .fetch_with_retries("https://example.com/post", &NeverCancelled)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Fatal { status: 503, .. }));
    }

    #[tokio::test]
    async fn proxy_redirect_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": {
                    "status_code": 301,
                    "status": "Moved Permanently",
                    "content": "",
                    "content_type": null,
                    "url": "https://example.com/post"
                }
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": {
                    "status_code": 200,
                    "status": "OK",
                    "content": "<html>post</html>",
                    "content_type": "text/html",
                    "url": "https://example.com/post"
                }
            })))
            .mount(&server)
            .await;

        let config = fast_config().with_proxy_api_key("test-key");
        let fetcher = Fetcher::new(&config).with_proxy_endpoint(format!("{}/scrape", server.uri()));

        let page = fetcher
            .fetch_with_retries("https://example.com/post", &NeverCancelled)
            .await
            .unwrap();

        assert_eq!(page.text(), "<html>post</html>");
        assert_eq!(page.content_type.as_deref(), Some("text/html"));
    }

    #[test]
    fn non_brotli_bodies_pass_through() {
        let body = b"<?xml version=\"1.0\"?><rss></rss>".to_vec();
        assert_eq!(decompress_if_brotli(body.clone()), body);
    }
}
