//! N=3 document replication across the peers closest (by XOR distance)
//! to `hash(url)` (§4.13).

pub mod replicator;
pub mod xor;

pub use replicator::{
    ReplicaTransport, ReplicateRequest, Replicator, ReplicationStats, DEFAULT_REPLICATION_FACTOR,
    REPLICATE_TIMEOUT_SECONDS,
};
pub use xor::closest_peers;
