//! Per-subnet rate limiting for DHT routing buckets (§4.10).
//!
//! Caps the number of peers accepted from a single `/24` (IPv4) or `/48`
//! (IPv6) network per routing bucket, so one Sybil-controlled network
//! location cannot dominate a bucket.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;

use parking_lot::Mutex;

pub const DEFAULT_MAX_PER_SUBNET: usize = 3;

fn subnet_key(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            format!("{}.{}.{}.0/24", o[0], o[1], o[2])
        }
        IpAddr::V6(v6) => {
            let s = v6.segments();
            format!("{:x}:{:x}:{:x}::/48", s[0], s[1], s[2])
        }
    }
}

#[derive(Default)]
struct Buckets {
    // bucket_id -> subnet -> peer_ids
    inner: HashMap<u32, HashMap<String, HashSet<String>>>,
}

/// Tracks, per DHT routing bucket, how many distinct peers come from each
/// subnet; rejects additions past [`Self::max_per_subnet`].
pub struct SubnetLimiter {
    max_per_subnet: usize,
    buckets: Mutex<Buckets>,
}

impl SubnetLimiter {
    #[must_use]
    pub fn new(max_per_subnet: usize) -> Self {
        Self {
            max_per_subnet,
            buckets: Mutex::new(Buckets::default()),
        }
    }

    #[must_use]
    pub fn can_add(&self, ip: IpAddr, bucket_id: u32) -> bool {
        let subnet = subnet_key(ip);
        let buckets = self.buckets.lock();
        let count = buckets
            .inner
            .get(&bucket_id)
            .and_then(|b| b.get(&subnet))
            .map_or(0, HashSet::len);
        count < self.max_per_subnet
    }

    /// Register `peer_id` under `ip`'s subnet in `bucket_id`. Returns
    /// `false` without registering if the subnet is already at capacity.
    pub fn add(&self, ip: IpAddr, peer_id: &str, bucket_id: u32) -> bool {
        let subnet = subnet_key(ip);
        let mut buckets = self.buckets.lock();
        let bucket = buckets.inner.entry(bucket_id).or_default();
        let peers = bucket.entry(subnet.clone()).or_default();
        if peers.len() >= self.max_per_subnet {
            tracing::warn!(subnet, bucket_id, peer_id, "subnet_limit_reached");
            return false;
        }
        peers.insert(peer_id.to_owned());
        true
    }

    pub fn remove(&self, ip: IpAddr, peer_id: &str, bucket_id: u32) {
        let subnet = subnet_key(ip);
        let mut buckets = self.buckets.lock();
        if let Some(bucket) = buckets.inner.get_mut(&bucket_id) {
            if let Some(peers) = bucket.get_mut(&subnet) {
                peers.remove(peer_id);
                if peers.is_empty() {
                    bucket.remove(&subnet);
                }
            }
            if bucket.is_empty() {
                buckets.inner.remove(&bucket_id);
            }
        }
    }

    #[must_use]
    pub fn total_nodes(&self) -> usize {
        self.buckets
            .lock()
            .inner
            .values()
            .flat_map(HashMap::values)
            .map(HashSet::len)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_peers_per_subnet() {
        let limiter = SubnetLimiter::new(2);
        let ip: IpAddr = "1.2.3.4".parse().unwrap();
        assert!(limiter.add(ip, "peer-a", 0));
        assert!(limiter.add(ip, "peer-b", 0));
        assert!(!limiter.can_add(ip, 0));
        assert!(!limiter.add(ip, "peer-c", 0));
    }

    #[test]
    fn distinct_subnets_are_independent() {
        let limiter = SubnetLimiter::new(1);
        assert!(limiter.add("1.2.3.4".parse().unwrap(), "peer-a", 0));
        assert!(limiter.add("5.6.7.8".parse().unwrap(), "peer-b", 0));
    }

    #[test]
    fn remove_frees_capacity() {
        let limiter = SubnetLimiter::new(1);
        let ip: IpAddr = "1.2.3.4".parse().unwrap();
        assert!(limiter.add(ip, "peer-a", 0));
        limiter.remove(ip, "peer-a", 0);
        assert!(limiter.add(ip, "peer-b", 0));
    }

    #[test]
    fn ipv6_uses_48_bit_prefix() {
        let limiter = SubnetLimiter::new(1);
        let a: IpAddr = "2001:db8:1::1".parse().unwrap();
        let b: IpAddr = "2001:db8:1::2".parse().unwrap();
        assert!(limiter.add(a, "peer-a", 0));
        assert!(!limiter.add(b, "peer-b", 0));
    }
}
