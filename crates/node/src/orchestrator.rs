//! Per-role service wiring (§2 component U, §4.18).
//!
//! This module does not open any socket itself — every transport seam
//! (search, replicate, index-submit, LAN discovery, PEX) is injected by
//! the caller, the same way `calimero-node`'s service layer is handed
//! an already-constructed network client rather than building one. What
//! lives here is the InfoMesh-specific wiring and the handful of public
//! verbs a CLI or test harness needs: `search`, `submit_crawl_result`,
//! `status_snapshot`.

use std::sync::Arc;

use infomesh_credits::{ActionType, CreditLedger};
use infomesh_dht::extract_keywords;
use infomesh_discovery::{MdnsDiscovery, PexTracker, VersionGossipTracker};
use infomesh_index::{LocalStore, SearchFilters};
use infomesh_primitives::config::NodeRole;
use infomesh_primitives::identity::KeyPair;
use infomesh_primitives::time::now_unix;
use infomesh_ranking::{rank_results, LinkGraph, RankedResult, RawCandidate, DEFAULT_TRUST};
use infomesh_router::QueryRouter;
use infomesh_sybil::SybilValidator;

use crate::crawl_loop::ContinuousCrawlLoop;
use crate::error::NodeResult;
use crate::index_submit::IndexSubmitReceiver;
use crate::status::StatusSnapshot;

/// Keywords kept per query when consulting the DHT, mirroring the
/// per-document cap used at index time (§4.9).
const MAX_QUERY_KEYWORDS: usize = 10;

/// Local-index search plus distributed query routing, present on `full`
/// and `search` roles (§4.12, §4.8).
pub struct SearchServices {
    pub store: Arc<LocalStore>,
    pub link_graph: Arc<LinkGraph>,
    pub router: Arc<QueryRouter>,
    pub credits: Arc<CreditLedger>,
    pub key_pair: Option<Arc<KeyPair>>,
    pub index_submit: Option<Arc<IndexSubmitReceiver>>,
}

impl SearchServices {
    /// Run `query` against the local index and, through `router`,
    /// against remote peers that advertise matching keywords in the
    /// DHT. Local and remote candidates are merged into one composite
    /// ranking pass so neither source can dominate purely by being
    /// first, then a `query_process` credit is recorded for the work.
    pub async fn search(&self, query: &str, limit: usize) -> NodeResult<Vec<RankedResult>> {
        let now = now_unix();
        let keywords = extract_keywords(query, MAX_QUERY_KEYWORDS);
        let link_graph = Arc::clone(&self.link_graph);
        let authority_of = |url: &str| link_graph.url_authority(url).unwrap_or(0.0);

        let local = self.store.search(query, limit, 0, SearchFilters::default())?;
        let mut seen: std::collections::HashSet<String> = local.iter().map(|r| r.url.clone()).collect();

        let mut candidates: Vec<RawCandidate> = local
            .iter()
            .map(|r| RawCandidate {
                doc_id: r.doc_id,
                url: r.url.clone(),
                title: r.title.clone(),
                snippet: r.snippet.clone(),
                bm25_raw: r.score,
                crawled_at: r.crawled_at,
                peer_id: None,
                trust: DEFAULT_TRUST,
                authority: authority_of(&r.url),
            })
            .collect();

        let remote = self.router.route_query(query, &keywords, limit).await;
        for r in remote {
            if !seen.insert(r.url.clone()) {
                continue;
            }
            let authority = authority_of(&r.url);
            candidates.push(RawCandidate {
                doc_id: r.doc_id as i64,
                url: r.url,
                title: r.title,
                snippet: r.snippet,
                bm25_raw: r.score,
                crawled_at: now,
                peer_id: Some(r.peer_id),
                trust: DEFAULT_TRUST,
                authority,
            });
        }

        let ranked = rank_results(&candidates, limit, now);
        self.credits
            .record_action(ActionType::QueryProcess, 1.0, Some(query), self.key_pair.as_deref())?;
        Ok(ranked)
    }

    #[must_use]
    pub fn stats(&self) -> NodeResult<StatusFragment> {
        let index_stats = self.store.get_stats()?;
        Ok(StatusFragment {
            documents_indexed: index_stats.document_count as u64,
        })
    }
}

/// Subset of [`StatusSnapshot`] that only the search-capable half of a
/// node can fill in.
pub struct StatusFragment {
    pub documents_indexed: u64,
}

/// LAN discovery, peer exchange, and version gossip: present on every
/// role (§4.17 lists components S/T under `full`, `crawler`, and
/// `search` alike).
pub struct DiscoveryServices {
    pub mdns: Arc<MdnsDiscovery>,
    pub pex: Arc<PexTracker>,
    pub version_gossip: Arc<VersionGossipTracker>,
}

impl DiscoveryServices {
    #[must_use]
    pub fn new(local_peer_id: impl Into<String>, local_version: impl Into<String>) -> Self {
        Self {
            mdns: Arc::new(MdnsDiscovery::new(local_peer_id)),
            pex: Arc::new(PexTracker::new()),
            version_gossip: Arc::new(VersionGossipTracker::new(local_version)),
        }
    }
}

/// Per-role assembly of the crates above. Construction is left to the
/// caller (a CLI `main` or a test): this type only holds what's already
/// built and exposes the operations valid for its role.
pub enum Node {
    Full {
        search: SearchServices,
        crawl_loop: Arc<ContinuousCrawlLoop>,
        sybil: Arc<SybilValidator>,
        discovery: DiscoveryServices,
    },
    Crawler {
        crawl_loop: Arc<ContinuousCrawlLoop>,
        sybil: Arc<SybilValidator>,
        discovery: DiscoveryServices,
    },
    Search {
        search: SearchServices,
        sybil: Arc<SybilValidator>,
        discovery: DiscoveryServices,
    },
}

impl Node {
    #[must_use]
    pub fn role(&self) -> NodeRole {
        match self {
            Self::Full { .. } => NodeRole::Full,
            Self::Crawler { .. } => NodeRole::Crawler,
            Self::Search { .. } => NodeRole::Search,
        }
    }

    #[must_use]
    pub fn sybil(&self) -> &SybilValidator {
        match self {
            Self::Full { sybil, .. } | Self::Crawler { sybil, .. } | Self::Search { sybil, .. } => sybil,
        }
    }

    #[must_use]
    pub fn discovery(&self) -> &DiscoveryServices {
        match self {
            Self::Full { discovery, .. } | Self::Crawler { discovery, .. } | Self::Search { discovery, .. } => discovery,
        }
    }

    /// `Some` on roles that serve search queries (`full`, `search`).
    #[must_use]
    pub fn search_services(&self) -> Option<&SearchServices> {
        match self {
            Self::Full { search, .. } | Self::Search { search, .. } => Some(search),
            Self::Crawler { .. } => None,
        }
    }

    /// `Some` on roles that run the continuous crawl loop (`full`, `crawler`).
    #[must_use]
    pub fn crawl_loop(&self) -> Option<&Arc<ContinuousCrawlLoop>> {
        match self {
            Self::Full { crawl_loop, .. } | Self::Crawler { crawl_loop, .. } => Some(crawl_loop),
            Self::Search { .. } => None,
        }
    }

    /// Run `query` against this node's search path. Returns an empty
    /// result set (rather than an error) for the `crawler` role, which
    /// has no local index or router to serve queries from.
    pub async fn search(&self, query: &str, limit: usize) -> NodeResult<Vec<RankedResult>> {
        match self.search_services() {
            Some(services) => services.search(query, limit).await,
            None => Ok(Vec::new()),
        }
    }

    /// Build a [`StatusSnapshot`] from whatever counters this role
    /// tracks, leaving network-layer fields (`listen_address`,
    /// `connected_peers`) for the caller to fill in from its transport.
    pub fn status_snapshot(&self, peer_id: &str, listen_address: &str, connected_peers: usize) -> NodeResult<StatusSnapshot> {
        let (documents_indexed, urls_crawled, credits_earned) = match self {
            Self::Full { search, crawl_loop, .. } => {
                let fragment = search.stats()?;
                let urls_crawled = crawl_loop.stats().urls_crawled.load(std::sync::atomic::Ordering::Relaxed);
                let credits_earned = search.credits.stats()?.total_earned;
                (fragment.documents_indexed, urls_crawled, credits_earned)
            }
            Self::Crawler { crawl_loop, .. } => {
                let urls_crawled = crawl_loop.stats().urls_crawled.load(std::sync::atomic::Ordering::Relaxed);
                (0, urls_crawled, 0.0)
            }
            Self::Search { search, .. } => {
                let fragment = search.stats()?;
                let credits_earned = search.credits.stats()?.total_earned;
                (fragment.documents_indexed, 0, credits_earned)
            }
        };

        Ok(StatusSnapshot {
            peer_id: peer_id.to_owned(),
            role: role_str(self.role()).to_owned(),
            listen_address: listen_address.to_owned(),
            connected_peers,
            documents_indexed,
            urls_crawled,
            credits_earned,
            updated_at: now_unix(),
        })
    }
}

#[must_use]
fn role_str(role: NodeRole) -> &'static str {
    match role {
        NodeRole::Full => "full",
        NodeRole::Crawler => "crawler",
        NodeRole::Search => "search",
    }
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;

    use async_trait::async_trait;
    use infomesh_crawl::dedup::DedupStore;
    use infomesh_crawl::extract::{Extractor, NaiveExtractor};
    use infomesh_crawl::robots::RobotsChecker;
    use infomesh_crawl::scheduler::Scheduler;
    use infomesh_crawl::worker::{CrawlWorker, NoCrawlLock};
    use infomesh_dht::{InfoMeshDht, MemoryDhtStore};
    use infomesh_router::{PeerProfileTracker, RemoteSearchResult, SearchRequest, SearchTransport};
    use infomesh_sybil::pow::generate_pow;

    use super::*;
    use crate::diskspace::SysinfoDiskSpace;

    struct NoRemotePeers;

    #[async_trait]
    impl SearchTransport for NoRemotePeers {
        async fn send_search_request(&self, _peer_id: &str, _request: &SearchRequest) -> Option<Vec<RemoteSearchResult>> {
            None
        }
    }

    fn search_services() -> SearchServices {
        let store = Arc::new(LocalStore::open_in_memory("unicode61").unwrap());
        store
            .add_document(
                "https://example.com/rust",
                "Rust",
                "the rust programming language favors safety and zero cost abstractions",
                "raw1",
                "hash1",
                Some("en"),
            )
            .unwrap();
        let link_graph = Arc::new(LinkGraph::open_in_memory().unwrap());
        let dht = Arc::new(InfoMeshDht::new(Arc::new(MemoryDhtStore::new()), "local-peer"));
        let profiles = Arc::new(PeerProfileTracker::new());
        let router = Arc::new(QueryRouter::new(dht, Arc::new(NoRemotePeers), "local-peer", profiles));
        let credits = Arc::new(CreditLedger::open_in_memory().unwrap());
        SearchServices {
            store,
            link_graph,
            router,
            credits,
            key_pair: None,
            index_submit: None,
        }
    }

    #[tokio::test]
    async fn search_role_returns_local_match() {
        let node = Node::Search {
            search: search_services(),
            sybil: Arc::new(SybilValidator::default()),
            discovery: DiscoveryServices::new("local-peer", "1.0.0"),
        };
        let results = node.search("rust safety", 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://example.com/rust");
    }

    #[tokio::test]
    async fn search_records_query_process_credit() {
        let services = search_services();
        let before = services.credits.stats().unwrap().total_earned;
        services.search("rust", 10).await.unwrap();
        let after = services.credits.stats().unwrap().total_earned;
        assert!(after > before);
    }

    #[tokio::test]
    async fn crawler_role_has_no_search_services() {
        let scheduler = Arc::new(Scheduler::new(std::time::Duration::from_millis(0), 10_000, 100, 0));
        let dedup = Arc::new(DedupStore::open_in_memory().unwrap());
        let robots = Arc::new(RobotsChecker::new("InfoMeshBot/1.0", std::time::Duration::from_secs(3600)));
        let extractor: Arc<dyn Extractor> = Arc::new(NaiveExtractor);
        let worker = Arc::new(CrawlWorker::new(
            "InfoMeshBot/1.0",
            Arc::clone(&scheduler),
            Arc::clone(&dedup),
            robots,
            extractor,
            Arc::new(NoCrawlLock),
            false,
            0,
        ));
        let sender = crate::index_submit::IndexSubmitSender::new(
            Arc::new(NoOpTransport),
            vec!["indexer-1".into()],
        );
        let crawl_loop = Arc::new(ContinuousCrawlLoop::new(
            scheduler,
            worker,
            dedup,
            Arc::new(crate::crawl_loop::ReqwestSeedFetcher::default()),
            vec![],
            crate::crawl_loop::CrawlSink::Submit {
                sender,
                local_peer_id: "crawler-1".into(),
                key_pair: None,
            },
            Arc::new(SysinfoDiskSpace),
            camino::Utf8PathBuf::from("/tmp/infomesh-test"),
        ));
        let node = Node::Crawler {
            crawl_loop,
            sybil: Arc::new(SybilValidator::default()),
            discovery: DiscoveryServices::new("crawler-1", "1.0.0"),
        };
        assert!(node.search_services().is_none());
        assert!(node.search("anything", 10).await.unwrap().is_empty());
    }

    struct NoOpTransport;

    #[async_trait]
    impl crate::index_submit::IndexSubmitTransport for NoOpTransport {
        async fn send_submission(&self, _peer_id: &str, _message: &crate::index_submit::IndexSubmitMessage) -> bool {
            true
        }
    }

    #[test]
    fn sybil_validator_accessible_on_every_role() {
        let node = Node::Search {
            search: search_services(),
            sybil: Arc::new(SybilValidator::new(4, 3)),
            discovery: DiscoveryServices::new("local-peer", "1.0.0"),
        };
        let pubkey = [7u8; 32];
        let pow = generate_pow(&pubkey, 4).unwrap();
        let node_id = infomesh_sybil::derive_node_id(&pubkey, pow.nonce);
        let ip: IpAddr = "1.2.3.4".parse().unwrap();
        let (ok, _) = node.sybil().validate_peer(&pubkey, pow.nonce, ip, &node_id, 0);
        assert!(ok);
    }

    #[tokio::test]
    async fn status_snapshot_reports_role_and_counts() {
        let services = search_services();
        services.credits.record_action(ActionType::Crawl, 1.0, None, None).unwrap();
        let node = Node::Search {
            search: services,
            sybil: Arc::new(SybilValidator::default()),
            discovery: DiscoveryServices::new("local-peer", "1.0.0"),
        };
        let snapshot = node.status_snapshot("local-peer", "0.0.0.0:4001", 0).unwrap();
        assert_eq!(snapshot.role, "search");
        assert_eq!(snapshot.documents_indexed, 1);
        assert!(snapshot.credits_earned > 0.0);
    }
}
