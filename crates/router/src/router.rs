//! Distributed search query routing: finds peers with matching keywords
//! via the DHT inverted index, fans out `SEARCH_REQUEST`s with hedged,
//! latency-adaptive timeouts, and returns the collected remote results
//! for merging with the local search (§4.12).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use infomesh_dht::InfoMeshDht;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;

use crate::peer_profile::PeerProfileTracker;

pub const SEARCH_TIMEOUT_MS: f64 = 2000.0;
pub const MAX_FANOUT: usize = 5;
pub const MAX_RESULTS_PER_PEER: usize = 20;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub keywords: Vec<String>,
    pub limit: usize,
    pub request_id: String,
}

/// Search result received from a remote peer.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RemoteSearchResult {
    pub url: String,
    pub title: String,
    pub snippet: String,
    pub score: f64,
    pub peer_id: String,
    pub doc_id: u64,
}

/// Capability seam for delivering a search request to a remote peer and
/// collecting its response. A real implementation opens a libp2p stream
/// on the search protocol; out of scope here (§9).
#[async_trait]
pub trait SearchTransport: Send + Sync {
    async fn send_search_request(
        &self,
        peer_id: &str,
        request: &SearchRequest,
    ) -> Option<Vec<RemoteSearchResult>>;
}

#[derive(Default)]
pub struct RoutingStats {
    pub queries_routed: AtomicU64,
    pub queries_local_only: AtomicU64,
    pub peers_contacted: AtomicU64,
    pub peers_responded: AtomicU64,
    pub peers_timed_out: AtomicU64,
    response_times: Mutex<Vec<f64>>,
}

impl RoutingStats {
    fn record_response(&self, elapsed_ms: f64) {
        self.peers_responded.fetch_add(1, Ordering::Relaxed);
        self.response_times.lock().push(elapsed_ms);
    }

    #[must_use]
    pub fn avg_response_ms(&self) -> f64 {
        let times = self.response_times.lock();
        if times.is_empty() {
            0.0
        } else {
            times.iter().sum::<f64>() / times.len() as f64
        }
    }
}

pub struct QueryRouter {
    dht: Arc<InfoMeshDht>,
    transport: Arc<dyn SearchTransport>,
    local_peer_id: String,
    timeout_ms: f64,
    max_fanout: usize,
    stats: RoutingStats,
    profiles: Arc<PeerProfileTracker>,
}

impl QueryRouter {
    #[must_use]
    pub fn new(
        dht: Arc<InfoMeshDht>,
        transport: Arc<dyn SearchTransport>,
        local_peer_id: impl Into<String>,
        profiles: Arc<PeerProfileTracker>,
    ) -> Self {
        Self {
            dht,
            transport,
            local_peer_id: local_peer_id.into(),
            timeout_ms: SEARCH_TIMEOUT_MS,
            max_fanout: MAX_FANOUT,
            stats: RoutingStats::default(),
            profiles,
        }
    }

    #[must_use]
    pub fn with_limits(mut self, timeout_ms: f64, max_fanout: usize) -> Self {
        self.timeout_ms = timeout_ms;
        self.max_fanout = max_fanout;
        self
    }

    #[must_use]
    pub fn stats(&self) -> &RoutingStats {
        &self.stats
    }

    #[must_use]
    pub fn profile_tracker(&self) -> &Arc<PeerProfileTracker> {
        &self.profiles
    }

    /// Route `query` to peers that have indexed documents matching
    /// `keywords`, collect their responses, and return up to `limit`
    /// results sorted by score.
    pub async fn route_query(
        &self,
        query: &str,
        keywords: &[String],
        limit: usize,
    ) -> Vec<RemoteSearchResult> {
        self.stats.queries_routed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(query, keyword_count = keywords.len(), "route_query_start");

        let mut peer_scores: std::collections::HashMap<String, f64> = std::collections::HashMap::new();
        for kw in keywords {
            let Ok(pointers) = self.dht.query_keyword(kw).await else {
                continue;
            };
            for ptr in pointers {
                if ptr.peer_id.is_empty() || ptr.peer_id == self.local_peer_id {
                    continue;
                }
                *peer_scores.entry(ptr.peer_id.clone()).or_insert(0.0) += ptr.score;
            }
        }

        if peer_scores.is_empty() {
            self.stats.queries_local_only.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(query, "route_query_no_peers");
            return Vec::new();
        }

        let mut ranked: Vec<(String, f64)> = peer_scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        let candidates: Vec<String> = ranked
            .into_iter()
            .take(self.max_fanout * 2)
            .map(|(pid, _)| pid)
            .collect();

        let target_peers: Vec<String> = self
            .profiles
            .rank_by_latency(&candidates, true)
            .into_iter()
            .take(self.max_fanout)
            .collect();
        self.stats
            .peers_contacted
            .fetch_add(target_peers.len() as u64, Ordering::Relaxed);

        let request = SearchRequest {
            query: query.to_owned(),
            keywords: keywords.to_vec(),
            limit: limit.min(MAX_RESULTS_PER_PEER),
            request_id: format!("{}:{:.0}", self.local_peer_id, infomesh_primitives::time::now_unix()),
        };

        let mut join_set = JoinSet::new();
        for peer_id in target_peers {
            let transport = Arc::clone(&self.transport);
            let profiles = Arc::clone(&self.profiles);
            let request = request.clone();
            let timeout_ms = self.profiles.adaptive_timeout(&peer_id, self.timeout_ms);
            join_set.spawn(async move {
                let start = std::time::Instant::now();
                let outcome = tokio::time::timeout(
                    std::time::Duration::from_secs_f64(timeout_ms / 1000.0),
                    transport.send_search_request(&peer_id, &request),
                )
                .await;
                let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
                match outcome {
                    Ok(Some(results)) => {
                        profiles.record(&peer_id, elapsed_ms, true);
                        (peer_id, Some(results), elapsed_ms, true)
                    }
                    Ok(None) => {
                        profiles.record(&peer_id, elapsed_ms, false);
                        (peer_id, None, elapsed_ms, false)
                    }
                    Err(_) => {
                        profiles.record(&peer_id, elapsed_ms, false);
                        (peer_id, None, elapsed_ms, false)
                    }
                }
            });
        }

        let mut all_results = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            let Ok((_peer_id, results, elapsed_ms, ok)) = joined else {
                continue;
            };
            if ok {
                self.stats.record_response(elapsed_ms);
            } else {
                self.stats.peers_timed_out.fetch_add(1, Ordering::Relaxed);
            }
            // A peer whose live search times out or fails contributes nothing.
            if let Some(results) = results {
                all_results.extend(results);
            }
        }

        all_results.sort_by(|a: &RemoteSearchResult, b: &RemoteSearchResult| {
            b.score.partial_cmp(&a.score).unwrap()
        });
        all_results.truncate(limit);
        tracing::debug!(query, returned = all_results.len(), "route_query_done");
        all_results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infomesh_dht::{MemoryDhtStore, PeerPointer};

    struct EchoTransport;

    #[async_trait]
    impl SearchTransport for EchoTransport {
        async fn send_search_request(
            &self,
            peer_id: &str,
            request: &SearchRequest,
        ) -> Option<Vec<RemoteSearchResult>> {
            Some(vec![RemoteSearchResult {
                url: format!("https://{peer_id}.test/"),
                title: request.query.clone(),
                snippet: String::new(),
                score: 0.8,
                peer_id: peer_id.to_owned(),
                doc_id: 1,
            }])
        }
    }

    fn router() -> QueryRouter {
        let dht = Arc::new(InfoMeshDht::new(Arc::new(MemoryDhtStore::new()), "local"));
        QueryRouter::new(dht, Arc::new(EchoTransport), "local", Arc::new(PeerProfileTracker::new()))
    }

    #[tokio::test]
    async fn empty_dht_yields_local_only() {
        let router = router();
        let results = router.route_query("rust", &["rust".to_owned()], 10).await;
        assert!(results.is_empty());
        assert_eq!(router.stats().queries_local_only.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn routes_to_peer_with_matching_pointer() {
        let router = router();
        router
            .dht
            .publish_keyword(
                "rust",
                &[PeerPointer {
                    peer_id: "peer-b".into(),
                    doc_id: 5,
                    url: "https://peer-b.test/page".into(),
                    score: 0.9,
                    title: "Rust".into(),
                }],
                vec![],
            )
            .await
            .unwrap();

        let results = router.route_query("rust", &["rust".to_owned()], 10).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].peer_id, "peer-b");
    }

    struct DeadTransport;

    #[async_trait]
    impl SearchTransport for DeadTransport {
        async fn send_search_request(&self, _peer_id: &str, _request: &SearchRequest) -> Option<Vec<RemoteSearchResult>> {
            None
        }
    }

    #[tokio::test]
    async fn all_peers_timing_out_yields_empty_results() {
        let dht = Arc::new(InfoMeshDht::new(Arc::new(MemoryDhtStore::new()), "local"));
        let router = QueryRouter::new(dht, Arc::new(DeadTransport), "local", Arc::new(PeerProfileTracker::new()));
        router
            .dht
            .publish_keyword(
                "rust",
                &[PeerPointer {
                    peer_id: "peer-c".into(),
                    doc_id: 9,
                    url: "https://peer-c.test/page".into(),
                    score: 0.7,
                    title: "Rust on peer-c".into(),
                }],
                vec![],
            )
            .await
            .unwrap();

        let results = router.route_query("rust", &["rust".to_owned()], 10).await;
        assert!(results.is_empty());
        assert_eq!(router.stats().peers_timed_out.load(Ordering::Relaxed), 1);
        assert_eq!(router.stats().peers_responded.load(Ordering::Relaxed), 0);
    }
}
