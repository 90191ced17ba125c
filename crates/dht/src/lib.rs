//! Distributed keyword index, crawl locks, and content attestations over
//! a DHT abstraction (§4.9, §4.11). The libp2p Kademlia transport itself
//! is out of scope; this crate provides the capability seam ([`DhtStore`])
//! and the InfoMesh-specific semantics layered on top of it.

pub mod client;
pub mod error;
pub mod keywords;
pub mod memory;
pub mod pointer;
pub mod stats;
pub mod wrapper;

pub use client::DhtStore;
pub use error::{DhtError, DhtResult};
pub use keywords::{extract_keywords, MAX_KEYWORDS_PER_DOC, MIN_KEYWORD_LENGTH};
pub use memory::MemoryDhtStore;
pub use pointer::{keyword_to_dht_key, url_to_dht_key, KeywordEntry, PeerPointer};
pub use stats::DhtStats;
pub use wrapper::{default_lock_ttl_seconds, Attestation, InfoMeshDht};
