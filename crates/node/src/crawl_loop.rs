//! Continuous crawl loop (§4.18): seeds the scheduler, pulls URLs off
//! it, runs each through the crawl worker, and routes successes to
//! either a local index or a configured set of indexer peers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use camino::Utf8PathBuf;
use infomesh_credits::{ActionType, CreditLedger};
use infomesh_crawl::dedup::DedupStore;
use infomesh_crawl::links::extract_links;
use infomesh_crawl::worker::{CrawlResult, CrawlWorker};
use infomesh_index::LocalStore;
use infomesh_primitives::identity::KeyPair;
use infomesh_primitives::time::now_unix;
use infomesh_replicate::Replicator;
use infomesh_ssrf::validate as validate_url;

use crate::diskspace::{is_low, DiskSpaceProvider};
use crate::index_submit::{IndexSubmitMessage, IndexSubmitSender};

/// Ceiling on consecutive empty pulls before the loop re-seeds.
const IDLE_BEFORE_RESEED: Duration = Duration::from_secs(10);
/// How long `get_url` is allowed to block before the loop checks idle time.
const PULL_TIMEOUT: Duration = Duration::from_secs(5);
/// How often the disk-space watchdog runs.
const DISK_CHECK_INTERVAL: Duration = Duration::from_secs(60);
/// How often the local FTS index is compacted.
const OPTIMIZE_INTERVAL: Duration = Duration::from_secs(3600);
/// How long to back off once disk space is low.
const LOW_DISK_BACKOFF: Duration = Duration::from_secs(30);

/// Capability seam for the one-shot "refetch this seed to rediscover its
/// links" fetch; kept separate from [`CrawlWorker`] because a re-seed
/// fetch must not be short-circuited by the dedup/duplicate-content path.
#[async_trait]
pub trait SeedFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Option<String>;
}

/// Default fetcher backed by a plain `reqwest` GET.
pub struct ReqwestSeedFetcher {
    client: reqwest::Client,
}

impl Default for ReqwestSeedFetcher {
    fn default() -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("InfoMeshBot/1.0")
                .timeout(Duration::from_secs(30))
                .build()
                .expect("http client builds"),
        }
    }
}

#[async_trait]
impl SeedFetcher for ReqwestSeedFetcher {
    async fn fetch(&self, url: &str) -> Option<String> {
        let response = self.client.get(url).send().await.ok()?;
        response.text().await.ok()
    }
}

/// Where a successfully crawled page goes: a `crawler` role forwards it
/// to indexer peers, a `full`/`search` role indexes it locally.
pub enum CrawlSink {
    Submit {
        sender: IndexSubmitSender,
        local_peer_id: String,
        key_pair: Option<Arc<KeyPair>>,
    },
    Local {
        store: Arc<LocalStore>,
        ledger: Option<Arc<CreditLedger>>,
        replicator: Option<Arc<Replicator>>,
    },
}

#[derive(Default)]
pub struct CrawlLoopStats {
    pub urls_crawled: AtomicU64,
    pub documents_routed: AtomicU64,
    pub reseed_rounds: AtomicU64,
}

pub struct ContinuousCrawlLoop {
    scheduler: Arc<infomesh_crawl::scheduler::Scheduler>,
    worker: Arc<CrawlWorker>,
    dedup: Arc<DedupStore>,
    seed_fetcher: Arc<dyn SeedFetcher>,
    seeds: Vec<String>,
    sink: CrawlSink,
    disk_provider: Arc<dyn DiskSpaceProvider>,
    data_dir: Utf8PathBuf,
    stats: CrawlLoopStats,
}

impl ContinuousCrawlLoop {
    #[must_use]
    pub fn new(
        scheduler: Arc<infomesh_crawl::scheduler::Scheduler>,
        worker: Arc<CrawlWorker>,
        dedup: Arc<DedupStore>,
        seed_fetcher: Arc<dyn SeedFetcher>,
        seeds: Vec<String>,
        sink: CrawlSink,
        disk_provider: Arc<dyn DiskSpaceProvider>,
        data_dir: Utf8PathBuf,
    ) -> Self {
        Self {
            scheduler,
            worker,
            dedup,
            seed_fetcher,
            seeds,
            sink,
            disk_provider,
            data_dir,
            stats: CrawlLoopStats::default(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> &CrawlLoopStats {
        &self.stats
    }

    /// Enqueue unseen seeds directly; for already-seen seeds, refetch
    /// once to rediscover outbound links and enqueue only the unseen
    /// children.
    pub async fn reseed(&self) {
        self.stats.reseed_rounds.fetch_add(1, Ordering::Relaxed);
        for seed in &self.seeds {
            if validate_url(seed).is_err() {
                tracing::warn!(seed, "crawl_loop_seed_rejected_ssrf");
                continue;
            }

            let already_seen = matches!(self.dedup.is_url_seen(seed), Ok(true));
            if !already_seen {
                self.scheduler.add_url(seed, 0).await;
                continue;
            }
            let Some(html) = self.seed_fetcher.fetch(seed).await else {
                continue;
            };
            for link in extract_links(&html, seed) {
                if validate_url(&link).is_err() {
                    continue;
                }
                if matches!(self.dedup.is_url_seen(&link), Ok(false)) {
                    self.scheduler.add_url(&link, 1).await;
                }
            }
        }
    }

    /// Route a successful [`CrawlResult`] to the configured sink,
    /// indexing locally or forwarding to indexer peers, and recording a
    /// `CRAWL` credit when indexing happens on this node.
    async fn route_result(&self, result: CrawlResult) {
        let Some(page) = result.page else { return };
        let Some(raw_hash) = result.raw_html_hash else { return };
        let Some(text_hash) = result.text_hash else { return };

        match &self.sink {
            CrawlSink::Local { store, ledger, replicator } => {
                let store = Arc::clone(store);
                let url = result.url.clone();
                let title = page.title.clone();
                let text = page.text.clone();
                let language = page.language.clone();
                let insert_text_hash = text_hash.clone();
                let inserted = tokio::task::spawn_blocking(move || {
                    store.add_document(&url, &title, &text, &raw_hash, &insert_text_hash, language.as_deref())
                })
                .await
                .expect("indexing task does not panic");

                match inserted {
                    Ok(Some(doc_id)) => {
                        self.stats.documents_routed.fetch_add(1, Ordering::Relaxed);
                        if let Some(ledger) = ledger {
                            let ledger = Arc::clone(ledger);
                            let _ = tokio::task::spawn_blocking(move || {
                                ledger.record_action(ActionType::Crawl, 1.0, None, None)
                            })
                            .await;
                        }
                        if let Some(replicator) = replicator {
                            replicator
                                .replicate_document(
                                    doc_id as u64,
                                    &result.url,
                                    &page.title,
                                    &page.text,
                                    &text_hash,
                                    page.language.as_deref().unwrap_or(""),
                                )
                                .await;
                        }
                    }
                    Ok(None) => tracing::debug!(url = %result.url, "crawl_loop_duplicate_document"),
                    Err(error) => tracing::warn!(url = %result.url, %error, "crawl_loop_index_failed"),
                }
            }
            CrawlSink::Submit {
                sender,
                local_peer_id,
                key_pair,
            } => {
                let mut message = IndexSubmitMessage {
                    url: result.url.clone(),
                    title: page.title,
                    text: page.text,
                    raw_html_hash: raw_hash,
                    text_hash,
                    language: page.language,
                    crawled_at: now_unix(),
                    peer_id: local_peer_id.clone(),
                    signature: None,
                    discovered_links: result.discovered_links,
                };
                if let Some(key_pair) = key_pair {
                    message.signature = Some(key_pair.sign(&message.canonical_bytes()).to_bytes().to_vec());
                }
                let acked = sender.submit(&message).await;
                if acked > 0 {
                    self.stats.documents_routed.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Run forever, pulling URLs from the scheduler, crawling, routing
    /// results, and re-seeding on prolonged idleness. Runs the periodic
    /// disk-space and FTS-optimize housekeeping inline, matching the
    /// "single logical scheduler" model of §5.
    pub async fn run(&self) -> ! {
        self.reseed().await;
        let mut last_progress = Instant::now();
        let mut last_disk_check = Instant::now();
        let mut last_optimize = Instant::now();

        loop {
            match tokio::time::timeout(PULL_TIMEOUT, self.scheduler.get_url()).await {
                Ok((url, depth)) => {
                    last_progress = Instant::now();
                    let result = self.worker.crawl_url(&url, depth, false).await;
                    self.scheduler.mark_done(&url).await;
                    self.stats.urls_crawled.fetch_add(1, Ordering::Relaxed);
                    if result.success {
                        self.route_result(result).await;
                    }
                }
                Err(_elapsed) => {
                    if last_progress.elapsed() >= IDLE_BEFORE_RESEED {
                        self.reseed().await;
                        last_progress = Instant::now();
                    }
                }
            }

            if last_disk_check.elapsed() >= DISK_CHECK_INTERVAL {
                last_disk_check = Instant::now();
                if is_low(self.disk_provider.as_ref(), &self.data_dir) {
                    tracing::warn!(data_dir = %self.data_dir, "crawl_loop_low_disk_space");
                    tokio::time::sleep(LOW_DISK_BACKOFF).await;
                }
            }

            if last_optimize.elapsed() >= OPTIMIZE_INTERVAL {
                last_optimize = Instant::now();
                if let CrawlSink::Local { store, .. } = &self.sink {
                    let store = Arc::clone(store);
                    let _ = tokio::task::spawn_blocking(move || store.optimize()).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infomesh_crawl::extract::NaiveExtractor;
    use infomesh_crawl::robots::RobotsChecker;
    use infomesh_crawl::scheduler::Scheduler;
    use infomesh_crawl::worker::NoCrawlLock;
    use std::collections::HashMap;

    struct FakeSeedFetcher {
        pages: HashMap<String, String>,
    }

    #[async_trait]
    impl SeedFetcher for FakeSeedFetcher {
        async fn fetch(&self, url: &str) -> Option<String> {
            self.pages.get(url).cloned()
        }
    }

    struct NullDisk;
    impl DiskSpaceProvider for NullDisk {
        fn available_bytes(&self, _path: &camino::Utf8Path) -> u64 {
            u64::MAX
        }
    }

    fn test_loop(seeds: Vec<String>, pages: HashMap<String, String>) -> ContinuousCrawlLoop {
        let scheduler = Arc::new(Scheduler::new(Duration::from_millis(0), 0, 100, 2));
        let dedup = Arc::new(DedupStore::open_in_memory().unwrap());
        let worker = Arc::new(CrawlWorker::new(
            "InfoMeshBot/1.0",
            Arc::clone(&scheduler),
            Arc::clone(&dedup),
            Arc::new(RobotsChecker::new("InfoMeshBot/1.0", Duration::from_secs(3600))),
            Arc::new(NaiveExtractor),
            Arc::new(NoCrawlLock),
            false,
            2,
        ));
        let store = Arc::new(LocalStore::open_in_memory("unicode61").unwrap());
        ContinuousCrawlLoop::new(
            scheduler,
            worker,
            dedup,
            Arc::new(FakeSeedFetcher { pages }),
            seeds,
            CrawlSink::Local {
                store,
                ledger: None,
                replicator: None,
            },
            Arc::new(NullDisk),
            Utf8PathBuf::from("/tmp/infomesh-test"),
        )
    }

    #[tokio::test]
    async fn reseed_enqueues_unseen_seed() {
        let crawl_loop = test_loop(vec!["https://example.com/seed".into()], HashMap::new());
        crawl_loop.reseed().await;
        let (url, depth) = crawl_loop.scheduler.get_url().await;
        assert_eq!(url, "https://example.com/seed");
        assert_eq!(depth, 0);
    }

    #[tokio::test]
    async fn reseed_rediscovers_links_from_seen_seed() {
        let seed = "https://example.com/seed".to_owned();
        let child = "https://example.com/child".to_owned();
        let mut pages = HashMap::new();
        pages.insert(seed.clone(), format!(r#"<a href="{child}">child</a>"#));

        let crawl_loop = test_loop(vec![seed.clone()], pages);
        crawl_loop.dedup.mark_seen(&seed, "already-indexed-hash", None).unwrap();

        crawl_loop.reseed().await;
        let (url, depth) = crawl_loop.scheduler.get_url().await;
        assert_eq!(url, child);
        assert_eq!(depth, 1);
    }

    #[tokio::test]
    async fn reseed_skips_already_seen_children() {
        let seed = "https://example.com/seed".to_owned();
        let child = "https://example.com/child".to_owned();
        let mut pages = HashMap::new();
        pages.insert(seed.clone(), format!(r#"<a href="{child}">child</a>"#));

        let crawl_loop = test_loop(vec![seed.clone()], pages);
        crawl_loop.dedup.mark_seen(&seed, "seed-hash", None).unwrap();
        crawl_loop.dedup.mark_seen(&child, "child-hash", None).unwrap();

        crawl_loop.reseed().await;
        let timed_out = tokio::time::timeout(Duration::from_millis(200), crawl_loop.scheduler.get_url()).await;
        assert!(timed_out.is_err(), "no url should have been enqueued");
    }
}
