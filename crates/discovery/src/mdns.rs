//! LAN peer discovery via UDP multicast mDNS-style announcements.
//!
//! The multicast socket itself (`224.0.0.251:5353`, TTL 1, loopback
//! disabled) is opaque transport machinery (Non-goal); this module owns
//! packet framing and the peer table. A real binding lives in the `node`
//! orchestration crate behind the [`LanTransport`] trait.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{DiscoveryError, DiscoveryResult};

/// Fixed 8-byte magic prefix identifying an InfoMesh LAN announcement.
pub const MAGIC: [u8; 8] = *b"INFOMDNS";

/// Multicast group address used for LAN discovery.
pub const MULTICAST_ADDR: &str = "224.0.0.251";
/// Multicast port used for LAN discovery.
pub const MULTICAST_PORT: u16 = 5353;
/// Multicast TTL: LAN-only, never routed.
pub const MULTICAST_TTL: u32 = 1;

/// Seconds between outgoing announcements.
pub const ANNOUNCE_INTERVAL_SECS: u64 = 30;
/// Seconds of silence after which a peer is pruned from the table.
pub const PRUNE_AFTER_SECS: f64 = 120.0;

/// The msgpack body carried after the magic header.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LanAnnounce {
    pub peer_id: String,
    pub port: u16,
    pub ts: f64,
    #[serde(default)]
    pub version: Option<String>,
}

/// A peer discovered on the LAN.
#[derive(Clone, Debug, PartialEq)]
pub struct LanPeer {
    pub peer_id: String,
    pub addr: String,
    pub port: u16,
    pub last_seen: f64,
    pub version: Option<String>,
}

/// Send/receive seam around the UDP multicast socket; the socket itself
/// (bind, join-group, loopback-disable) is left to the orchestration
/// layer, matching the Non-goal on transport machinery.
#[async_trait]
pub trait LanTransport: Send + Sync {
    async fn send_multicast(&self, packet: &[u8]) -> DiscoveryResult<()>;
    async fn recv_multicast(&self) -> DiscoveryResult<(Vec<u8>, String)>;
}

/// Encode an announcement as `MAGIC || msgpack(LanAnnounce)`.
pub fn encode_announce(announce: &LanAnnounce) -> DiscoveryResult<Vec<u8>> {
    let body = rmp_serde::to_vec_named(announce)?;
    let mut packet = Vec::with_capacity(MAGIC.len() + body.len());
    packet.extend_from_slice(&MAGIC);
    packet.extend_from_slice(&body);
    Ok(packet)
}

/// Decode a packet, rejecting anything missing the magic prefix.
pub fn decode_announce(packet: &[u8]) -> DiscoveryResult<LanAnnounce> {
    if packet.len() < MAGIC.len() || packet[..MAGIC.len()] != MAGIC {
        return Err(DiscoveryError::MalformedPacket("missing magic header".into()));
    }
    let announce: LanAnnounce = rmp_serde::from_slice(&packet[MAGIC.len()..])?;
    Ok(announce)
}

/// Tracks LAN peers discovered via mDNS-style announcements.
pub struct MdnsDiscovery {
    local_peer_id: String,
    peers: Mutex<HashMap<String, LanPeer>>,
}

impl MdnsDiscovery {
    #[must_use]
    pub fn new(local_peer_id: impl Into<String>) -> Self {
        Self {
            local_peer_id: local_peer_id.into(),
            peers: Mutex::new(HashMap::new()),
        }
    }

    /// Build this node's announcement packet for `now`.
    pub fn announce_packet(&self, port: u16, now: f64, version: Option<String>) -> DiscoveryResult<Vec<u8>> {
        encode_announce(&LanAnnounce {
            peer_id: self.local_peer_id.clone(),
            port,
            ts: now,
            version,
        })
    }

    /// Handle an inbound packet from `from_addr`. Ignores our own
    /// announcements (loopback is disabled at the socket, but a switch
    /// can still echo on some LANs). Returns the peer recorded, if any.
    pub fn handle_packet(&self, packet: &[u8], from_addr: &str, now: f64) -> DiscoveryResult<Option<LanPeer>> {
        let announce = decode_announce(packet)?;
        if announce.peer_id == self.local_peer_id {
            return Ok(None);
        }
        let peer = LanPeer {
            peer_id: announce.peer_id.clone(),
            addr: from_addr.to_owned(),
            port: announce.port,
            last_seen: now,
            version: announce.version,
        };
        self.peers.lock().insert(peer.peer_id.clone(), peer.clone());
        Ok(Some(peer))
    }

    /// Drop peers not seen within [`PRUNE_AFTER_SECS`] of `now`.
    pub fn prune(&self, now: f64) {
        self.peers
            .lock()
            .retain(|_, peer| now - peer.last_seen < PRUNE_AFTER_SECS);
    }

    #[must_use]
    pub fn peers(&self) -> Vec<LanPeer> {
        self.peers.lock().values().cloned().collect()
    }

    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.peers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_announce_packet() {
        let announce = LanAnnounce {
            peer_id: "abc123".into(),
            port: 4001,
            ts: 1000.0,
            version: Some("0.1.0".into()),
        };
        let packet = encode_announce(&announce).unwrap();
        assert_eq!(&packet[..8], &MAGIC);
        let decoded = decode_announce(&packet).unwrap();
        assert_eq!(decoded, announce);
    }

    #[test]
    fn rejects_packet_without_magic() {
        let err = decode_announce(b"not-a-valid-packet-at-all").unwrap_err();
        assert!(matches!(err, DiscoveryError::MalformedPacket(_)));
    }

    #[test]
    fn ignores_own_announcement() {
        let discovery = MdnsDiscovery::new("self-peer");
        let packet = discovery.announce_packet(4001, 1000.0, None).unwrap();
        let result = discovery.handle_packet(&packet, "127.0.0.1:5353", 1000.0).unwrap();
        assert!(result.is_none());
        assert_eq!(discovery.peer_count(), 0);
    }

    #[test]
    fn records_peer_announcement() {
        let discovery = MdnsDiscovery::new("self-peer");
        let announce = LanAnnounce {
            peer_id: "other-peer".into(),
            port: 4002,
            ts: 1000.0,
            version: None,
        };
        let packet = encode_announce(&announce).unwrap();
        let peer = discovery
            .handle_packet(&packet, "192.168.1.5:5353", 1000.0)
            .unwrap()
            .unwrap();
        assert_eq!(peer.peer_id, "other-peer");
        assert_eq!(discovery.peer_count(), 1);
    }

    #[test]
    fn prunes_stale_peers() {
        let discovery = MdnsDiscovery::new("self-peer");
        let packet = encode_announce(&LanAnnounce {
            peer_id: "stale-peer".into(),
            port: 4002,
            ts: 0.0,
            version: None,
        })
        .unwrap();
        discovery.handle_packet(&packet, "192.168.1.5:5353", 0.0).unwrap();
        assert_eq!(discovery.peer_count(), 1);

        discovery.prune(PRUNE_AFTER_SECS + 1.0);
        assert_eq!(discovery.peer_count(), 0);
    }

    #[test]
    fn does_not_prune_recently_seen_peer() {
        let discovery = MdnsDiscovery::new("self-peer");
        let packet = encode_announce(&LanAnnounce {
            peer_id: "fresh-peer".into(),
            port: 4002,
            ts: 0.0,
            version: None,
        })
        .unwrap();
        discovery.handle_packet(&packet, "192.168.1.5:5353", 0.0).unwrap();
        discovery.prune(PRUNE_AFTER_SECS - 1.0);
        assert_eq!(discovery.peer_count(), 1);
    }
}
