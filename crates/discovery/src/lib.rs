//! LAN peer discovery (mDNS), peer exchange (PEX), and version gossip
//! (§4.17, components S and T).
//!
//! The UDP multicast socket and the PEX stream protocol are both named in
//! the Non-goals as libp2p/transport machinery; this crate expresses them
//! as the [`LanTransport`] and [`PexTransport`] capability seams and
//! implements everything above the socket: packet framing, prune timers,
//! per-sender rate limiting, and the version-gossip tracker.

pub mod error;
pub mod mdns;
pub mod pex;
pub mod version;

pub use error::{DiscoveryError, DiscoveryResult};
pub use mdns::{LanAnnounce, LanPeer, LanTransport, MdnsDiscovery};
pub use pex::{PexEntry, PexRequest, PexResponse, PexTracker, PexTransport};
pub use version::VersionGossipTracker;
