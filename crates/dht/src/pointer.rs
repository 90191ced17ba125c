//! Inverted-index entry shape published and retrieved over the DHT (§4.9).

use serde::{Deserialize, Serialize};

/// A single peer's claim to hold a document matching a keyword.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PeerPointer {
    pub peer_id: String,
    pub doc_id: u64,
    pub url: String,
    pub score: f64,
    pub title: String,
}

/// On-the-wire keyword entry: one peer's pointer set for a single keyword,
/// signed by the publishing peer.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct KeywordEntry {
    pub keyword: String,
    pub pointers: Vec<PeerPointer>,
    pub peer_id: String,
    pub timestamp: f64,
    pub signature: Vec<u8>,
}

/// Derive the DHT key under which a keyword's pointer entry is stored.
#[must_use]
pub fn keyword_to_dht_key(keyword: &str) -> String {
    let lowered = keyword.to_lowercase();
    format!("/infomesh/kw/{}", infomesh_primitives::hash::sha256_hex(lowered.as_bytes()))
}

/// Derive the DHT key used for crawl-ownership locks on a URL.
#[must_use]
pub fn url_to_dht_key(url: &str) -> String {
    format!("/infomesh/url/{}", infomesh_primitives::hash::sha256_hex(url.as_bytes()))
}
