//! Per-peer network performance tracking for latency-aware routing and
//! hedged request decisions (§4.12).

use std::collections::HashMap;

use parking_lot::RwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};

const EMA_ALPHA: f64 = 0.3;
const MAX_HISTORY: usize = 100;
const STALE_TIMEOUT_SECONDS: f64 = 3600.0;
const DIVERSITY_RATIO: f64 = 0.2;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum BandwidthClass {
    Fast,
    Medium,
    Slow,
    #[default]
    Unknown,
}

fn classify_bandwidth(avg_latency_ms: f64) -> BandwidthClass {
    if avg_latency_ms < 100.0 {
        BandwidthClass::Fast
    } else if avg_latency_ms < 500.0 {
        BandwidthClass::Medium
    } else {
        BandwidthClass::Slow
    }
}

fn percentile(sorted_values: &[f64], pct: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }
    let idx = (pct / 100.0) * (sorted_values.len() - 1) as f64;
    let lower = idx.floor() as usize;
    let upper = idx.ceil() as usize;
    if lower == upper {
        return sorted_values[lower];
    }
    let frac = idx - lower as f64;
    sorted_values[lower] * (1.0 - frac) + sorted_values[upper] * frac
}

/// Network performance profile for a single peer.
#[derive(Clone, Debug)]
pub struct PeerProfile {
    pub peer_id: String,
    pub avg_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub success_rate: f64,
    pub last_seen: f64,
    pub bandwidth_class: BandwidthClass,
    pub total_interactions: u64,
    latency_history: Vec<f64>,
    success_history: Vec<bool>,
}

impl PeerProfile {
    fn new(peer_id: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            avg_latency_ms: 0.0,
            p95_latency_ms: 0.0,
            success_rate: 1.0,
            last_seen: 0.0,
            bandwidth_class: BandwidthClass::Unknown,
            total_interactions: 0,
            latency_history: Vec::new(),
            success_history: Vec::new(),
        }
    }
}

/// Tracks latency, success rate, and bandwidth class for every known peer.
#[derive(Default)]
pub struct PeerProfileTracker {
    profiles: RwLock<HashMap<String, PeerProfile>>,
}

impl PeerProfileTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one interaction with `peer_id` and return the updated profile.
    pub fn record(&self, peer_id: &str, elapsed_ms: f64, success: bool) -> PeerProfile {
        let mut profiles = self.profiles.write();
        let profile = profiles
            .entry(peer_id.to_owned())
            .or_insert_with(|| PeerProfile::new(peer_id));

        profile.total_interactions += 1;
        profile.last_seen = infomesh_primitives::time::now_unix();

        if success {
            profile.avg_latency_ms = if profile.avg_latency_ms == 0.0 {
                elapsed_ms
            } else {
                EMA_ALPHA * elapsed_ms + (1.0 - EMA_ALPHA) * profile.avg_latency_ms
            };

            profile.latency_history.push(elapsed_ms);
            if profile.latency_history.len() > MAX_HISTORY {
                profile.latency_history.remove(0);
            }
            let mut sorted = profile.latency_history.clone();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
            profile.p95_latency_ms = percentile(&sorted, 95.0);
        }

        profile.success_history.push(success);
        if profile.success_history.len() > MAX_HISTORY {
            profile.success_history.remove(0);
        }
        let successes = profile.success_history.iter().filter(|s| **s).count();
        profile.success_rate = successes as f64 / profile.success_history.len() as f64;

        if profile.total_interactions >= 3 {
            profile.bandwidth_class = classify_bandwidth(profile.avg_latency_ms);
        }

        profile.clone()
    }

    #[must_use]
    pub fn get(&self, peer_id: &str) -> Option<PeerProfile> {
        self.profiles.read().get(peer_id).cloned()
    }

    #[must_use]
    pub fn get_or_default(&self, peer_id: &str) -> PeerProfile {
        self.get(peer_id).unwrap_or_else(|| PeerProfile::new(peer_id))
    }

    #[must_use]
    pub fn known_peers(&self) -> usize {
        self.profiles.read().len()
    }

    /// Rank `peer_ids` fastest-first. With `diversity` enabled, roughly
    /// [`DIVERSITY_RATIO`] of the slower half is randomly promoted ahead
    /// of the rest of the slow group, so laggards aren't starved forever.
    #[must_use]
    pub fn rank_by_latency(&self, peer_ids: &[String], diversity: bool) -> Vec<String> {
        let mut profiles: Vec<(String, PeerProfile)> = peer_ids
            .iter()
            .map(|pid| (pid.clone(), self.get_or_default(pid)))
            .collect();

        profiles.sort_by(|a, b| {
            let key = |p: &PeerProfile| {
                if p.bandwidth_class == BandwidthClass::Unknown {
                    9999.0
                } else {
                    p.avg_latency_ms
                }
            };
            key(&a.1).partial_cmp(&key(&b.1)).unwrap()
        });

        if !diversity || profiles.len() <= 2 {
            return profiles.into_iter().map(|(pid, _)| pid).collect();
        }

        let mid = (profiles.len() / 2).max(1);
        let fast: Vec<String> = profiles[..mid].iter().map(|(pid, _)| pid.clone()).collect();
        let slow: Vec<String> = profiles[mid..].iter().map(|(pid, _)| pid.clone()).collect();

        let mut rng = rand::thread_rng();
        let mut promoted = Vec::new();
        let mut remaining = Vec::new();
        for pid in slow {
            if rng.gen::<f64>() < DIVERSITY_RATIO {
                promoted.push(pid);
            } else {
                remaining.push(pid);
            }
        }

        let mut result = fast;
        result.extend(promoted);
        result.extend(remaining);
        result
    }

    /// Per-peer adaptive timeout: slower peers get proportionally more
    /// time, clamped to `[500, 5000]` ms.
    #[must_use]
    pub fn adaptive_timeout(&self, peer_id: &str, base_ms: f64) -> f64 {
        let Some(profile) = self.get(peer_id) else {
            return base_ms;
        };
        if profile.avg_latency_ms == 0.0 {
            return base_ms;
        }
        let factor = profile.avg_latency_ms / 200.0;
        (base_ms * factor).clamp(500.0, 5000.0)
    }

    /// Remove profiles not seen within `max_age` seconds; returns the count
    /// removed.
    pub fn prune_stale(&self, max_age: f64) -> usize {
        let now = infomesh_primitives::time::now_unix();
        let mut profiles = self.profiles.write();
        let stale: Vec<String> = profiles
            .iter()
            .filter(|(_, p)| p.last_seen > 0.0 && now - p.last_seen > max_age)
            .map(|(pid, _)| pid.clone())
            .collect();
        for pid in &stale {
            profiles.remove(pid);
        }
        stale.len()
    }

    pub fn reset(&self) {
        self.profiles.write().clear();
    }
}

pub const DEFAULT_STALE_TIMEOUT_SECONDS: f64 = STALE_TIMEOUT_SECONDS;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_ema_latency_and_success_rate() {
        let tracker = PeerProfileTracker::new();
        tracker.record("peer-a", 100.0, true);
        let profile = tracker.record("peer-a", 200.0, true);
        assert!((profile.avg_latency_ms - (0.3 * 200.0 + 0.7 * 100.0)).abs() < 1e-9);
        assert_eq!(profile.success_rate, 1.0);
    }

    #[test]
    fn classifies_bandwidth_after_three_interactions() {
        let tracker = PeerProfileTracker::new();
        tracker.record("peer-a", 10.0, true);
        tracker.record("peer-a", 10.0, true);
        let profile = tracker.record("peer-a", 10.0, true);
        assert_eq!(profile.bandwidth_class, BandwidthClass::Fast);
    }

    #[test]
    fn rank_by_latency_without_diversity_is_pure_sort() {
        let tracker = PeerProfileTracker::new();
        tracker.record("peer-a", 10.0, true);
        tracker.record("peer-a", 10.0, true);
        tracker.record("peer-a", 10.0, true);
        tracker.record("peer-b", 900.0, true);
        tracker.record("peer-b", 900.0, true);
        tracker.record("peer-b", 900.0, true);
        let ranked = tracker.rank_by_latency(&["peer-b".to_owned(), "peer-a".to_owned()], false);
        assert_eq!(ranked, vec!["peer-a".to_owned(), "peer-b".to_owned()]);
    }

    #[test]
    fn adaptive_timeout_scales_with_latency() {
        let tracker = PeerProfileTracker::new();
        tracker.record("peer-a", 400.0, true);
        let timeout = tracker.adaptive_timeout("peer-a", 2000.0);
        assert!(timeout > 2000.0);
        assert!(timeout <= 5000.0);
    }

    #[test]
    fn unknown_peer_uses_base_timeout() {
        let tracker = PeerProfileTracker::new();
        assert_eq!(tracker.adaptive_timeout("ghost", 2000.0), 2000.0);
    }
}
