//! Combined PoW + subnet validation for peers joining the routing table.

use std::net::IpAddr;

use crate::pow::{derive_node_id, verify_pow, DEFAULT_DIFFICULTY_BITS};
use crate::subnet::{SubnetLimiter, DEFAULT_MAX_PER_SUBNET};

/// Outcome of [`SybilValidator::validate_peer`] when rejected.
pub const REASON_INVALID_POW: &str = "invalid_pow";
pub const REASON_NODE_ID_MISMATCH: &str = "node_id_mismatch";
pub const REASON_SUBNET_LIMIT_EXCEEDED: &str = "subnet_limit_exceeded";
pub const REASON_OK: &str = "ok";

pub struct SybilValidator {
    difficulty_bits: u32,
    subnet_limiter: SubnetLimiter,
}

impl Default for SybilValidator {
    fn default() -> Self {
        Self::new(DEFAULT_DIFFICULTY_BITS, DEFAULT_MAX_PER_SUBNET)
    }
}

impl SybilValidator {
    #[must_use]
    pub fn new(difficulty_bits: u32, max_per_subnet: usize) -> Self {
        Self {
            difficulty_bits,
            subnet_limiter: SubnetLimiter::new(max_per_subnet),
        }
    }

    #[must_use]
    pub fn subnet_limiter(&self) -> &SubnetLimiter {
        &self.subnet_limiter
    }

    /// Validate a candidate peer's PoW, derived ID, and subnet quota, and
    /// register it in the subnet limiter on success.
    ///
    /// Returns `(true, "ok")` when accepted, else `(false, reason)`.
    pub fn validate_peer(
        &self,
        public_key_bytes: &[u8],
        pow_nonce: u64,
        ip: IpAddr,
        peer_id: &str,
        bucket_id: u32,
    ) -> (bool, &'static str) {
        if !verify_pow(public_key_bytes, pow_nonce, self.difficulty_bits) {
            tracing::warn!(peer_id, "sybil_pow_invalid");
            return (false, REASON_INVALID_POW);
        }

        let expected_id = derive_node_id(public_key_bytes, pow_nonce);
        if peer_id != expected_id {
            tracing::warn!(peer_id, expected_id, "sybil_id_mismatch");
            return (false, REASON_NODE_ID_MISMATCH);
        }

        if !self.subnet_limiter.can_add(ip, bucket_id) {
            tracing::warn!(peer_id, bucket_id, "sybil_subnet_limit");
            return (false, REASON_SUBNET_LIMIT_EXCEEDED);
        }

        self.subnet_limiter.add(ip, peer_id, bucket_id);
        tracing::info!(peer_id, "peer_validated");
        (true, REASON_OK)
    }
}
