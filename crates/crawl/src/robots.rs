//! robots.txt compliance with per-domain caching (§4.4).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use texting_robots::Robot;
use tokio::sync::Mutex;

/// Maximum cached domains before the oldest tenth is evicted.
pub const MAX_CACHE_SIZE: usize = 10_000;
/// Crawl-delay values longer than this are capped.
pub const MAX_CRAWL_DELAY_SECS: f32 = 60.0;

struct CachedRobots {
    robot: Robot,
    sitemaps: Vec<String>,
    crawl_delay: Option<f32>,
    cached_at: Instant,
}

/// Fetches, parses, and caches robots.txt per domain. On fetch failure the
/// most restrictive policy (disallow everything) is cached instead of
/// leaving the domain unchecked.
pub struct RobotsChecker {
    user_agent: String,
    cache_ttl: Duration,
    cache: Mutex<HashMap<String, CachedRobots>>,
}

impl RobotsChecker {
    #[must_use]
    pub fn new(user_agent: impl Into<String>, cache_ttl: Duration) -> Self {
        Self {
            user_agent: user_agent.into(),
            cache_ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Check whether `url` may be fetched, fetching and caching robots.txt
    /// for its domain first if needed.
    pub async fn is_allowed(&self, client: &reqwest::Client, url: &str) -> bool {
        let Ok(parsed) = url::Url::parse(url) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };
        let domain = host.to_owned();
        let base_url = format!("{}://{}", parsed.scheme(), domain);

        {
            let cache = self.cache.lock().await;
            if let Some(entry) = cache.get(&domain) {
                if entry.cached_at.elapsed() < self.cache_ttl {
                    return entry.robot.allowed(parsed.as_str());
                }
            }
        }

        let fresh = self.fetch_robots(client, &base_url).await;
        let allowed = fresh.robot.allowed(parsed.as_str());

        let mut cache = self.cache.lock().await;
        if cache.len() >= MAX_CACHE_SIZE {
            self.evict_oldest(&mut cache);
        }
        cache.insert(domain, fresh);
        allowed
    }

    /// Robots-derived `Crawl-delay` for `domain`, if cached and present.
    pub async fn crawl_delay(&self, domain: &str) -> Option<f32> {
        let cache = self.cache.lock().await;
        cache.get(domain).and_then(|e| e.crawl_delay)
    }

    async fn fetch_robots(&self, client: &reqwest::Client, base_url: &str) -> CachedRobots {
        let robots_url = format!("{base_url}/robots.txt");
        let body = match client
            .get(&robots_url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp.bytes().await.ok().map(|b| b.to_vec()),
            Ok(_) => Some(Vec::new()),
            Err(err) => {
                tracing::warn!(url = %robots_url, error = %err, "robots_fetch_error");
                None
            }
        };

        let robot = match body {
            Some(bytes) => Robot::new(&self.user_agent, &bytes).unwrap_or_else(|_| {
                Robot::new(&self.user_agent, b"User-agent: *\nDisallow: /").expect("deny-all robots parses")
            }),
            None => Robot::new(&self.user_agent, b"User-agent: *\nDisallow: /").expect("deny-all robots parses"),
        };

        let sitemaps = robot.sitemaps.clone();
        let crawl_delay = robot.delay.map(|d| d.min(MAX_CRAWL_DELAY_SECS));

        CachedRobots {
            robot,
            sitemaps,
            crawl_delay,
            cached_at: Instant::now(),
        }
    }

    fn evict_oldest(&self, cache: &mut HashMap<String, CachedRobots>) {
        let evict_count = (cache.len() / 10).max(1);
        let mut entries: Vec<(String, Instant)> =
            cache.iter().map(|(k, v)| (k.clone(), v.cached_at)).collect();
        entries.sort_by_key(|(_, at)| *at);
        for (domain, _) in entries.into_iter().take(evict_count) {
            cache.remove(&domain);
        }
    }

    /// Discovered sitemap URLs for a cached domain, if any.
    pub async fn sitemaps(&self, domain: &str) -> Vec<String> {
        let cache = self.cache.lock().await;
        cache
            .get(domain)
            .map(|e| e.sitemaps.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn network_error_denies_everything() {
        let checker = RobotsChecker::new("InfoMeshBot/1.0", Duration::from_secs(3600));
        let client = reqwest::Client::new();
        // unroutable address triggers a connection error
        let allowed = checker
            .is_allowed(&client, "http://10.255.255.1/page")
            .await;
        assert!(!allowed);
    }
}
