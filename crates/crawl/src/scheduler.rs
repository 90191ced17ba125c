//! Politeness-aware URL scheduler (§4.4).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::time::sleep;

const QUEUE_CAPACITY: usize = 10_000;
const MAX_TRACKED_DOMAINS: usize = 50_000;
const DOMAIN_STALE: Duration = Duration::from_secs(3600);

#[derive(Default)]
struct DomainState {
    last_request_at: Option<Instant>,
    pending_count: usize,
    error_count: u64,
    crawl_delay: Option<Duration>,
}

struct Inner {
    domains: HashMap<String, DomainState>,
    queue: std::collections::VecDeque<(String, u32)>,
    hourly_count: u32,
    hour_start: Instant,
    last_prune: Instant,
}

/// Bounded FIFO URL queue with per-domain politeness and an optional
/// global hourly rate limit.
pub struct Scheduler {
    politeness_delay: Duration,
    urls_per_hour: u32,
    pending_per_domain: usize,
    max_depth: u32,
    inner: Mutex<Inner>,
}

impl Scheduler {
    #[must_use]
    pub fn new(
        politeness_delay: Duration,
        urls_per_hour: u32,
        pending_per_domain: usize,
        max_depth: u32,
    ) -> Self {
        Self {
            politeness_delay,
            urls_per_hour,
            pending_per_domain,
            max_depth,
            inner: Mutex::new(Inner {
                domains: HashMap::new(),
                queue: std::collections::VecDeque::new(),
                hourly_count: 0,
                hour_start: Instant::now(),
                last_prune: Instant::now(),
            }),
        }
    }

    /// Enqueue `url` at `depth`. Rejects when `depth` exceeds `max_depth`
    /// (0 means unlimited), the queue is at capacity, or the domain already
    /// has `pending_per_domain` URLs outstanding.
    pub async fn add_url(&self, url: &str, depth: u32) -> bool {
        if self.max_depth > 0 && depth > self.max_depth {
            return false;
        }
        let domain = domain_of(url);
        let mut inner = self.inner.lock().await;
        if inner.queue.len() >= QUEUE_CAPACITY {
            return false;
        }
        let state = inner.domains.entry(domain).or_default();
        if state.pending_count >= self.pending_per_domain {
            return false;
        }
        state.pending_count += 1;
        inner.queue.push_back((url.to_owned(), depth));
        true
    }

    pub async fn set_crawl_delay(&self, domain: &str, delay: Duration) {
        let capped = delay.min(Duration::from_secs(60));
        let mut inner = self.inner.lock().await;
        inner.domains.entry(domain.to_owned()).or_default().crawl_delay = Some(capped);
    }

    /// Pop the next URL, blocking (sleeping) to respect per-domain
    /// politeness delay and, if configured, the rolling hourly limit.
    pub async fn get_url(&self) -> (String, u32) {
        loop {
            let (url, depth, wait) = {
                let mut inner = self.inner.lock().await;
                self.maybe_prune(&mut inner);

                let Some((url, depth)) = inner.queue.pop_front() else {
                    drop(inner);
                    sleep(Duration::from_millis(50)).await;
                    continue;
                };

                let domain = domain_of(&url);
                let delay = inner
                    .domains
                    .get(&domain)
                    .and_then(|s| s.crawl_delay)
                    .unwrap_or(self.politeness_delay);
                let last = inner.domains.get(&domain).and_then(|s| s.last_request_at);
                let wait = last
                    .map(|t| delay.saturating_sub(t.elapsed()))
                    .unwrap_or_default();

                if self.urls_per_hour > 0 {
                    if inner.hour_start.elapsed() >= Duration::from_secs(3600) {
                        inner.hour_start = Instant::now();
                        inner.hourly_count = 0;
                    }
                    if inner.hourly_count >= self.urls_per_hour {
                        let remaining = Duration::from_secs(3600)
                            .saturating_sub(inner.hour_start.elapsed())
                            .max(Duration::from_secs(1));
                        inner.queue.push_back((url, depth));
                        drop(inner);
                        sleep(remaining).await;
                        continue;
                    }
                }

                (url, depth, wait)
            };

            if !wait.is_zero() {
                sleep(wait).await;
            }

            let mut inner = self.inner.lock().await;
            let domain = domain_of(&url);
            let state = inner.domains.entry(domain).or_default();
            state.last_request_at = Some(Instant::now());
            if self.urls_per_hour > 0 {
                inner.hourly_count += 1;
            }
            return (url, depth);
        }
    }

    /// Release the pending slot for `url`'s domain, called once the crawl
    /// attempt (success or failure) has completed.
    pub async fn mark_done(&self, url: &str) {
        let domain = domain_of(url);
        let mut inner = self.inner.lock().await;
        if let Some(state) = inner.domains.get_mut(&domain) {
            state.pending_count = state.pending_count.saturating_sub(1);
        }
    }

    pub async fn mark_error(&self, url: &str) {
        let domain = domain_of(url);
        let mut inner = self.inner.lock().await;
        inner.domains.entry(domain).or_default().error_count += 1;
    }

    fn maybe_prune(&self, inner: &mut Inner) {
        if inner.last_prune.elapsed() < Duration::from_secs(3600) {
            return;
        }
        inner.last_prune = Instant::now();
        if inner.domains.len() <= MAX_TRACKED_DOMAINS {
            return;
        }
        inner.domains.retain(|_, state| {
            state.pending_count > 0
                || state
                    .last_request_at
                    .map(|t| t.elapsed() < DOMAIN_STALE)
                    .unwrap_or(true)
        });
    }
}

fn domain_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_beyond_max_depth() {
        let scheduler = Scheduler::new(Duration::from_millis(0), 0, 10, 2);
        assert!(!scheduler.add_url("https://example.com/a", 3).await);
        assert!(scheduler.add_url("https://example.com/a", 2).await);
    }

    #[tokio::test]
    async fn rejects_when_domain_pending_is_full() {
        let scheduler = Scheduler::new(Duration::from_millis(0), 0, 1, 0);
        assert!(scheduler.add_url("https://example.com/a", 0).await);
        assert!(!scheduler.add_url("https://example.com/b", 0).await);
    }

    #[tokio::test]
    async fn get_url_returns_enqueued_urls() {
        let scheduler = Scheduler::new(Duration::from_millis(0), 0, 10, 0);
        scheduler.add_url("https://example.com/a", 0).await;
        let (url, depth) = scheduler.get_url().await;
        assert_eq!(url, "https://example.com/a");
        assert_eq!(depth, 0);
    }
}
