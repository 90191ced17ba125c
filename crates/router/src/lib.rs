//! Latency-aware distributed query routing: peer performance tracking
//! and DHT-guided search fan-out (§4.12).

pub mod error;
pub mod peer_profile;
pub mod router;

pub use error::{RouterError, RouterResult};
pub use peer_profile::{BandwidthClass, PeerProfile, PeerProfileTracker};
pub use router::{
    QueryRouter, RemoteSearchResult, RoutingStats, SearchRequest, SearchTransport, MAX_FANOUT,
    MAX_RESULTS_PER_PEER, SEARCH_TIMEOUT_MS,
};
