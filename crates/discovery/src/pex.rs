//! Peer exchange (PEX): gossip a sample of connected peers over a
//! dedicated stream protocol (§4.17).

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::DiscoveryResult;

/// Hard ceiling on peers requested/returned in one PEX round.
pub const MAX_PEERS_PER_REQUEST: usize = 10;
/// Minimum seconds between two requests from the same sender.
pub const REQUEST_RATE_LIMIT_SECS: f64 = 60.0;
/// Seconds between self-initiated PEX rounds.
pub const PEX_ROUND_INTERVAL_SECS: u64 = 300;
/// Peers contacted per self-initiated round.
pub const PEERS_PER_ROUND: usize = 3;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PexRequest {
    pub peer_id: String,
    pub max_peers: usize,
    pub version: String,
}

impl PexRequest {
    #[must_use]
    pub fn new(peer_id: impl Into<String>, max_peers: usize, version: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            max_peers: max_peers.min(MAX_PEERS_PER_REQUEST),
            version: version.into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PexEntry {
    pub peer_id: String,
    pub multiaddr: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PexResponse {
    pub peers: Vec<PexEntry>,
}

/// Capability seam for opening a PEX stream to a peer; the stream
/// protocol itself is Non-goal transport machinery.
#[async_trait]
pub trait PexTransport: Send + Sync {
    async fn request_peers(&self, peer_id: &str, request: &PexRequest) -> Option<PexResponse>;
}

/// Responder-side state: rate limits inbound requests per sender and
/// answers from the locally known connected-peer set.
pub struct PexTracker {
    last_request_at: Mutex<HashMap<String, f64>>,
}

impl Default for PexTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PexTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_request_at: Mutex::new(HashMap::new()),
        }
    }

    /// `true` if `sender` may issue a request at `now` given the
    /// one-per-60s-per-sender limit; records the attempt when allowed.
    pub fn allow_request(&self, sender: &str, now: f64) -> bool {
        let mut last = self.last_request_at.lock();
        match last.get(sender) {
            Some(&prev) if now - prev < REQUEST_RATE_LIMIT_SECS => false,
            _ => {
                last.insert(sender.to_owned(), now);
                true
            }
        }
    }

    /// Build a response from `connected` (peer_id, multiaddr pairs),
    /// excluding `self_peer_id` and `requester`, capped to
    /// `request.max_peers`.
    #[must_use]
    pub fn respond(
        &self,
        connected: &[(String, String)],
        self_peer_id: &str,
        requester: &str,
        request: &PexRequest,
    ) -> PexResponse {
        let limit = request.max_peers.min(MAX_PEERS_PER_REQUEST);
        let peers = connected
            .iter()
            .filter(|(peer_id, _)| peer_id != self_peer_id && peer_id != requester)
            .take(limit)
            .map(|(peer_id, multiaddr)| PexEntry {
                peer_id: peer_id.clone(),
                multiaddr: multiaddr.clone(),
            })
            .collect();
        PexResponse { peers }
    }
}

/// Run one requester-initiated PEX round against up to
/// [`PEERS_PER_ROUND`] peers, merging returned entries by peer id.
pub async fn run_pex_round(
    transport: &dyn PexTransport,
    targets: &[String],
    self_peer_id: &str,
    version: &str,
) -> DiscoveryResult<Vec<PexEntry>> {
    let request = PexRequest::new(self_peer_id, MAX_PEERS_PER_REQUEST, version);
    let mut discovered: HashMap<String, PexEntry> = HashMap::new();
    for peer_id in targets.iter().take(PEERS_PER_ROUND) {
        if let Some(response) = transport.request_peers(peer_id, &request).await {
            for entry in response.peers {
                if entry.peer_id != self_peer_id {
                    discovered.insert(entry.peer_id.clone(), entry);
                }
            }
        }
    }
    Ok(discovered.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limits_repeat_requests_from_same_sender() {
        let tracker = PexTracker::new();
        assert!(tracker.allow_request("peer-a", 0.0));
        assert!(!tracker.allow_request("peer-a", 30.0));
        assert!(tracker.allow_request("peer-a", 61.0));
    }

    #[test]
    fn different_senders_are_independent() {
        let tracker = PexTracker::new();
        assert!(tracker.allow_request("peer-a", 0.0));
        assert!(tracker.allow_request("peer-b", 0.0));
    }

    #[test]
    fn response_excludes_self_and_requester() {
        let tracker = PexTracker::new();
        let connected = vec![
            ("self".to_owned(), "/ip4/127.0.0.1/tcp/1".to_owned()),
            ("requester".to_owned(), "/ip4/127.0.0.1/tcp/2".to_owned()),
            ("peer-c".to_owned(), "/ip4/127.0.0.1/tcp/3".to_owned()),
        ];
        let request = PexRequest::new("requester", 10, "0.1.0");
        let response = tracker.respond(&connected, "self", "requester", &request);
        assert_eq!(response.peers.len(), 1);
        assert_eq!(response.peers[0].peer_id, "peer-c");
    }

    #[test]
    fn response_caps_to_max_peers() {
        let tracker = PexTracker::new();
        let connected: Vec<_> = (0..20)
            .map(|i| (format!("peer-{i}"), format!("/ip4/127.0.0.1/tcp/{i}")))
            .collect();
        let request = PexRequest::new("requester", 25, "0.1.0");
        let response = tracker.respond(&connected, "self", "requester", &request);
        assert_eq!(response.peers.len(), MAX_PEERS_PER_REQUEST);
    }

    struct FakeTransport {
        answers: HashMap<String, PexResponse>,
    }

    #[async_trait]
    impl PexTransport for FakeTransport {
        async fn request_peers(&self, peer_id: &str, _request: &PexRequest) -> Option<PexResponse> {
            self.answers.get(peer_id).cloned()
        }
    }

    #[tokio::test]
    async fn round_merges_entries_across_peers() {
        let mut answers = HashMap::new();
        answers.insert(
            "peer-a".to_owned(),
            PexResponse {
                peers: vec![PexEntry {
                    peer_id: "peer-x".into(),
                    multiaddr: "/ip4/10.0.0.1/tcp/1".into(),
                }],
            },
        );
        answers.insert(
            "peer-b".to_owned(),
            PexResponse {
                peers: vec![PexEntry {
                    peer_id: "peer-y".into(),
                    multiaddr: "/ip4/10.0.0.2/tcp/1".into(),
                }],
            },
        );
        let transport = FakeTransport { answers };
        let discovered = run_pex_round(
            &transport,
            &["peer-a".to_owned(), "peer-b".to_owned()],
            "self",
            "0.1.0",
        )
        .await
        .unwrap();
        assert_eq!(discovered.len(), 2);
    }
}
