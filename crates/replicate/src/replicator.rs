//! N-way document replication across the peers closest to `hash(url)`
//! in XOR distance (§4.13).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use infomesh_primitives::hash::sha256_hex;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

pub const DEFAULT_REPLICATION_FACTOR: usize = 3;
pub const REPLICATE_TIMEOUT_SECONDS: f64 = 10.0;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplicateRequest {
    pub doc_id: u64,
    pub url: String,
    pub title: String,
    pub text: String,
    pub text_hash: String,
    pub language: String,
    pub source_peer_id: String,
    pub replica_index: u32,
}

/// Capability seam for delivering a replica to a remote peer and for
/// discovering which peers are currently connected. A real implementation
/// opens a libp2p stream on the replicate protocol (§9).
#[async_trait]
pub trait ReplicaTransport: Send + Sync {
    async fn connected_peer_ids(&self) -> Vec<String>;
    async fn send_replicate_request(&self, peer_id: &str, request: &ReplicateRequest) -> bool;
}

#[derive(Default)]
pub struct ReplicationStats {
    pub documents_replicated: AtomicU64,
    pub replicas_sent: AtomicU64,
    pub replicas_received: AtomicU64,
    pub replicas_failed: AtomicU64,
    times: Mutex<Vec<f64>>,
}

impl ReplicationStats {
    fn record_time(&self, ms: f64) {
        self.times.lock().push(ms);
    }

    #[must_use]
    pub fn avg_replicate_ms(&self) -> f64 {
        let times = self.times.lock();
        if times.is_empty() {
            0.0
        } else {
            times.iter().sum::<f64>() / times.len() as f64
        }
    }
}

pub struct Replicator {
    transport: Arc<dyn ReplicaTransport>,
    local_peer_id: String,
    replication_factor: usize,
    stats: ReplicationStats,
}

impl Replicator {
    #[must_use]
    pub fn new(transport: Arc<dyn ReplicaTransport>, local_peer_id: impl Into<String>) -> Self {
        Self {
            transport,
            local_peer_id: local_peer_id.into(),
            replication_factor: DEFAULT_REPLICATION_FACTOR,
            stats: ReplicationStats::default(),
        }
    }

    #[must_use]
    pub fn with_replication_factor(mut self, n: usize) -> Self {
        self.replication_factor = n;
        self
    }

    #[must_use]
    pub fn stats(&self) -> &ReplicationStats {
        &self.stats
    }

    /// Replicate a document to the `replication_factor` peers closest to
    /// `hash(url)`. Returns the number of peers that acknowledged storage.
    pub async fn replicate_document(
        &self,
        doc_id: u64,
        url: &str,
        title: &str,
        text: &str,
        text_hash: &str,
        language: &str,
    ) -> usize {
        let targets = self.find_replica_peers(url).await;
        if targets.is_empty() {
            tracing::debug!(url, "replicate_no_peers");
            return 0;
        }

        let mut join_set = tokio::task::JoinSet::new();
        for (idx, peer_id) in targets.into_iter().enumerate() {
            let transport = Arc::clone(&self.transport);
            let request = ReplicateRequest {
                doc_id,
                url: url.to_owned(),
                title: title.to_owned(),
                text: text.to_owned(),
                text_hash: text_hash.to_owned(),
                language: language.to_owned(),
                source_peer_id: self.local_peer_id.clone(),
                replica_index: idx as u32,
            };
            join_set.spawn(async move {
                let start = std::time::Instant::now();
                let ok = tokio::time::timeout(
                    std::time::Duration::from_secs_f64(REPLICATE_TIMEOUT_SECONDS),
                    transport.send_replicate_request(&peer_id, &request),
                )
                .await
                .unwrap_or(false);
                (ok, start.elapsed().as_secs_f64() * 1000.0)
            });
        }

        let mut success_count = 0;
        while let Some(joined) = join_set.join_next().await {
            let Ok((ok, elapsed_ms)) = joined else {
                self.stats.replicas_failed.fetch_add(1, Ordering::Relaxed);
                continue;
            };
            if ok {
                self.stats.replicas_sent.fetch_add(1, Ordering::Relaxed);
                self.stats.record_time(elapsed_ms);
                success_count += 1;
            } else {
                self.stats.replicas_failed.fetch_add(1, Ordering::Relaxed);
            }
        }

        if success_count > 0 {
            self.stats.documents_replicated.fetch_add(1, Ordering::Relaxed);
        }
        tracing::debug!(url, target = self.replication_factor, success = success_count, "document_replicated");
        success_count
    }

    async fn find_replica_peers(&self, url: &str) -> Vec<String> {
        let key = sha256_hex(url.as_bytes());
        let connected = self.transport.connected_peer_ids().await;
        let candidates: Vec<String> = connected
            .into_iter()
            .filter(|pid| pid != &self.local_peer_id)
            .collect();
        crate::xor::closest_peers(&key, &candidates, self.replication_factor)
    }

    /// Store an incoming replica locally via `store_fn` and record receipt.
    pub async fn handle_replicate_request<F, Fut>(&self, request: &ReplicateRequest, store_fn: F) -> bool
    where
        F: FnOnce(ReplicateRequest) -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let ok = store_fn(request.clone()).await;
        self.stats.replicas_received.fetch_add(1, Ordering::Relaxed);
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct FakeTransport {
        peers: Vec<String>,
        fail: Vec<String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ReplicaTransport for FakeTransport {
        async fn connected_peer_ids(&self) -> Vec<String> {
            self.peers.clone()
        }

        async fn send_replicate_request(&self, peer_id: &str, _request: &ReplicateRequest) -> bool {
            self.calls.fetch_add(1, Ordering::Relaxed);
            !self.fail.contains(&peer_id.to_owned())
        }
    }

    #[tokio::test]
    async fn replicates_to_closest_peers_and_counts_success() {
        let transport = Arc::new(FakeTransport {
            peers: vec![format!("{:040x}", 1), format!("{:040x}", 2), format!("{:040x}", 3)],
            fail: vec![],
            calls: AtomicUsize::new(0),
        });
        let replicator = Replicator::new(transport, "local").with_replication_factor(2);
        let n = replicator
            .replicate_document(1, "https://example.com/", "Example", "body text", "hash", "en")
            .await;
        assert_eq!(n, 2);
        assert_eq!(replicator.stats().documents_replicated.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn no_connected_peers_replicates_to_nobody() {
        let transport = Arc::new(FakeTransport {
            peers: vec![],
            fail: vec![],
            calls: AtomicUsize::new(0),
        });
        let replicator = Replicator::new(transport, "local");
        let n = replicator
            .replicate_document(1, "https://example.com/", "Example", "body", "hash", "en")
            .await;
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn failed_replica_is_counted_but_does_not_block_others() {
        let peer_a = format!("{:040x}", 1);
        let peer_b = format!("{:040x}", 2);
        let transport = Arc::new(FakeTransport {
            peers: vec![peer_a.clone(), peer_b.clone()],
            fail: vec![peer_a],
            calls: AtomicUsize::new(0),
        });
        let replicator = Replicator::new(transport, "local").with_replication_factor(2);
        let n = replicator
            .replicate_document(1, "https://example.com/", "Example", "body", "hash", "en")
            .await;
        assert_eq!(n, 1);
        assert_eq!(replicator.stats().replicas_failed.load(Ordering::Relaxed), 1);
    }
}
