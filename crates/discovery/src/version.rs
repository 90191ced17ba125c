//! Peer software-version gossip (§4.17, component T).
//!
//! Every PING/PEX payload carries the sender's version; this tracker
//! records the latest reported version per peer and flags when a peer
//! reports something strictly newer than our own.

use std::cmp::Ordering;
use std::collections::HashMap;

use parking_lot::RwLock;

/// Compare two `major.minor.patch`-shaped version strings. Falls back to
/// lexicographic comparison for anything that doesn't parse cleanly —
/// gossiped strings are untrusted input and must never panic.
fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |v: &str| -> Option<Vec<u64>> {
        v.split('.').map(|part| part.parse::<u64>().ok()).collect()
    };
    match (parse(a), parse(b)) {
        (Some(pa), Some(pb)) => pa.cmp(&pb),
        _ => a.cmp(b),
    }
}

/// Tracks the most recently reported version string per peer.
pub struct VersionGossipTracker {
    local_version: String,
    versions: RwLock<HashMap<String, String>>,
}

impl VersionGossipTracker {
    #[must_use]
    pub fn new(local_version: impl Into<String>) -> Self {
        Self {
            local_version: local_version.into(),
            versions: RwLock::new(HashMap::new()),
        }
    }

    /// Record that `peer_id` reported `version`, returning `true` if it
    /// is strictly newer than our own.
    pub fn record(&self, peer_id: &str, version: &str) -> bool {
        self.versions
            .write()
            .insert(peer_id.to_owned(), version.to_owned());
        compare_versions(version, &self.local_version) == Ordering::Greater
    }

    #[must_use]
    pub fn version_of(&self, peer_id: &str) -> Option<String> {
        self.versions.read().get(peer_id).cloned()
    }

    /// Peers whose last-reported version is strictly newer than ours —
    /// an update hint for the operator.
    #[must_use]
    pub fn peers_with_newer_version(&self) -> Vec<(String, String)> {
        self.versions
            .read()
            .iter()
            .filter(|(_, v)| compare_versions(v, &self.local_version) == Ordering::Greater)
            .map(|(peer_id, v)| (peer_id.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_newer_peer_version() {
        let tracker = VersionGossipTracker::new("1.2.0");
        assert!(tracker.record("peer-a", "1.3.0"));
        assert!(!tracker.record("peer-b", "1.1.0"));
        assert!(!tracker.record("peer-c", "1.2.0"));
    }

    #[test]
    fn lists_peers_reporting_newer_versions() {
        let tracker = VersionGossipTracker::new("1.0.0");
        tracker.record("peer-a", "1.1.0");
        tracker.record("peer-b", "0.9.0");
        let newer = tracker.peers_with_newer_version();
        assert_eq!(newer.len(), 1);
        assert_eq!(newer[0].0, "peer-a");
    }

    #[test]
    fn malformed_version_strings_do_not_panic() {
        let tracker = VersionGossipTracker::new("1.0.0");
        assert!(!tracker.record("peer-a", "not-a-version"));
    }
}
