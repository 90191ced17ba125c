//! DHT capability seam (§9 "Polymorphism"). The libp2p swarm/transport
//! itself is out of scope; this crate consumes a key/value store behind
//! [`DhtStore`] and layers InfoMesh-specific semantics on top.

use async_trait::async_trait;

use crate::error::DhtResult;

/// Minimal asynchronous key/value capability a DHT transport must
/// provide. A real implementation backs this with a libp2p Kademlia
/// record store; [`crate::memory::MemoryDhtStore`] is the in-process
/// stand-in used by tests and single-node deployments.
#[async_trait]
pub trait DhtStore: Send + Sync {
    async fn put(&self, key: &str, value: Vec<u8>) -> DhtResult<()>;
    async fn get(&self, key: &str) -> DhtResult<Option<Vec<u8>>>;
}
