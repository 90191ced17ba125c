//! Crawl worker: fetch → validate → dedup → index (§4.5).

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use infomesh_primitives::hash::sha256_hex;
use infomesh_ssrf::{validate, validate_post_redirect};

use crate::dedup::DedupStore;
use crate::extract::{ExtractedPage, Extractor};
use crate::links::extract_links;
use crate::robots::RobotsChecker;
use crate::scheduler::Scheduler;

/// Maximum HTTP body size accepted from a crawl target, in bytes.
pub const MAX_RESPONSE_BYTES: usize = 10 * 1024 * 1024;
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
/// Total attempts for a transient 5xx before giving up (1 initial + 2 retries).
const MAX_FETCH_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Network-wide crawl-lock capability (§4.11). A no-op implementation is
/// used when no DHT is configured, matching the source's "proceed without
/// lock if unavailable" behavior.
#[async_trait]
pub trait CrawlLockProvider: Send + Sync {
    async fn acquire(&self, url: &str) -> bool;
    async fn release(&self, url: &str);
}

pub struct NoCrawlLock;

#[async_trait]
impl CrawlLockProvider for NoCrawlLock {
    async fn acquire(&self, _url: &str) -> bool {
        true
    }
    async fn release(&self, _url: &str) {}
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CrawlResult {
    pub url: String,
    pub success: bool,
    pub page: Option<ExtractedPage>,
    pub raw_html_hash: Option<String>,
    pub text_hash: Option<String>,
    pub error: Option<String>,
    pub is_paywall: bool,
    pub elapsed_ms: f64,
    pub discovered_links: Vec<String>,
}

impl CrawlResult {
    fn failure(url: &str, error: impl Into<String>, start: Instant) -> Self {
        Self {
            url: url.to_owned(),
            success: false,
            error: Some(error.into()),
            elapsed_ms: elapsed_ms(start),
            ..Default::default()
        }
    }
}

pub struct CrawlWorker {
    client: reqwest::Client,
    scheduler: Arc<Scheduler>,
    dedup: Arc<DedupStore>,
    robots: Arc<RobotsChecker>,
    extractor: Arc<dyn Extractor>,
    crawl_lock: Arc<dyn CrawlLockProvider>,
    respect_robots: bool,
    max_depth: u32,
}

impl CrawlWorker {
    pub fn new(
        user_agent: &str,
        scheduler: Arc<Scheduler>,
        dedup: Arc<DedupStore>,
        robots: Arc<RobotsChecker>,
        extractor: Arc<dyn Extractor>,
        crawl_lock: Arc<dyn CrawlLockProvider>,
        respect_robots: bool,
        max_depth: u32,
    ) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(FETCH_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .expect("http client builds");

        Self {
            client,
            scheduler,
            dedup,
            robots,
            extractor,
            crawl_lock,
            respect_robots,
            max_depth,
        }
    }

    pub async fn crawl_url(&self, url: &str, depth: u32, force: bool) -> CrawlResult {
        let start = Instant::now();
        let lock_acquired = self.crawl_lock.acquire(url).await;
        if !lock_acquired {
            return CrawlResult::failure(url, "locked_by_peer", start);
        }

        let result = self.crawl_url_inner(url, depth, force, start).await;
        self.crawl_lock.release(url).await;
        result
    }

    /// GET `url`, retrying transient 5xx responses with exponential backoff
    /// up to [`MAX_FETCH_ATTEMPTS`]. Network errors and non-5xx statuses are
    /// returned immediately without retry.
    async fn fetch_with_retry(&self, url: &str) -> Result<reqwest::Response, String> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(url).send().await {
                Ok(resp) if resp.status().is_server_error() && attempt < MAX_FETCH_ATTEMPTS => {
                    let delay = RETRY_BASE_DELAY * 2u32.pow(attempt - 1);
                    tracing::warn!(url, attempt, status = resp.status().as_u16(), ?delay, "crawl_retry_5xx");
                    tokio::time::sleep(delay).await;
                }
                Ok(resp) => return Ok(resp),
                Err(e) if attempt < MAX_FETCH_ATTEMPTS && e.is_timeout() => {
                    let delay = RETRY_BASE_DELAY * 2u32.pow(attempt - 1);
                    tracing::warn!(url, attempt, ?delay, "crawl_retry_timeout");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.to_string()),
            }
        }
    }

    async fn crawl_url_inner(&self, url: &str, depth: u32, force: bool, start: Instant) -> CrawlResult {
        if let Err(e) = validate(url) {
            return CrawlResult::failure(url, format!("blocked: {e}"), start);
        }

        if !force {
            match self.dedup.is_url_seen(url) {
                Ok(true) => return CrawlResult::failure(url, "already_seen", start),
                Ok(false) => {}
                Err(e) => return CrawlResult::failure(url, format!("dedup_error: {e}"), start),
            }
        }

        if self.respect_robots && !self.robots.is_allowed(&self.client, url).await {
            return CrawlResult::failure(url, "blocked_by_robots", start);
        }

        let response = match self.fetch_with_retry(url).await {
            Ok(resp) => resp,
            Err(e) => {
                self.scheduler.mark_error(url).await;
                return CrawlResult::failure(url, e, start);
            }
        };

        if let Err(e) = validate_post_redirect(response.url().as_str()) {
            return CrawlResult::failure(url, format!("redirect_blocked: {e}"), start);
        }

        let status = response.status();
        if status.as_u16() == 402 || status.as_u16() == 403 {
            let mut result = CrawlResult::failure(url, format!("http_{}", status.as_u16()), start);
            result.is_paywall = true;
            return result;
        }
        if !status.is_success() {
            self.scheduler.mark_error(url).await;
            return CrawlResult::failure(url, format!("http_{}", status.as_u16()), start);
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_owned();
        if !content_type.contains("text/html") && !content_type.contains("text/plain") {
            return CrawlResult::failure(url, format!("unsupported_content_type: {content_type}"), start);
        }

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => {
                self.scheduler.mark_error(url).await;
                return CrawlResult::failure(url, e.to_string(), start);
            }
        };
        if body.len() > MAX_RESPONSE_BYTES {
            return CrawlResult::failure(url, "response_too_large", start);
        }

        let raw_hash = sha256_hex(body.as_bytes());

        let Some(page) = self.extractor.extract(&body, url) else {
            return CrawlResult::failure(url, "extraction_failed", start);
        };
        if page.text.chars().count() < 50 {
            return CrawlResult::failure(url, "extraction_failed", start);
        }

        let text_hash = sha256_hex(page.text.as_bytes());
        let is_paywall = crate::paywall::is_paywall_content(&page.text);

        match self.dedup.is_content_seen(&text_hash) {
            Ok(true) => {
                let _ = self.dedup.mark_seen(url, &text_hash, Some(&page.text));
                let mut result = CrawlResult::failure(url, "duplicate_content", start);
                result.is_paywall = is_paywall;
                return result;
            }
            Ok(false) => {}
            Err(e) => return CrawlResult::failure(url, format!("dedup_error: {e}"), start),
        }

        if self.dedup.is_near_duplicate_default(&page.text) {
            let _ = self.dedup.mark_seen(url, &text_hash, Some(&page.text));
            let mut result = CrawlResult::failure(url, "near_duplicate", start);
            result.is_paywall = is_paywall;
            return result;
        }

        if let Err(e) = self.dedup.mark_seen(url, &text_hash, Some(&page.text)) {
            return CrawlResult::failure(url, format!("dedup_error: {e}"), start);
        }

        let mut discovered = Vec::new();
        if depth < self.max_depth || self.max_depth == 0 {
            discovered = extract_links(&body, url);
            for link in &discovered {
                if matches!(self.dedup.is_url_seen(link), Ok(false)) {
                    self.scheduler.add_url(link, depth + 1).await;
                }
            }
        }

        CrawlResult {
            url: url.to_owned(),
            success: true,
            page: Some(page),
            raw_html_hash: Some(raw_hash),
            text_hash: Some(text_hash),
            error: None,
            is_paywall,
            elapsed_ms: elapsed_ms(start),
            discovered_links: discovered,
        }
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
