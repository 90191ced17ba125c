//! Proof-of-work node identity (§4.10).
//!
//! A node proves it spent computation before joining the network: the
//! SHA-256 hash of `public_key || nonce_le_u64` must carry at least
//! `difficulty_bits` leading zero bits. The derived peer ID is the first
//! 40 hex characters of that same hash, tying identity to the PoW.

use std::time::Instant;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{SybilError, SybilResult};

/// ~2^20 average attempts, a few tens of seconds on one core.
pub const DEFAULT_DIFFICULTY_BITS: u32 = 20;

const DEFAULT_MAX_NONCE: u64 = 1 << 48;

/// Proof of work for a node's identity.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProofOfWork {
    pub nonce: u64,
    pub difficulty_bits: u32,
    pub hash_hex: String,
    pub elapsed_seconds: f64,
}

/// SHA-256(`public_key_bytes` || `nonce` as little-endian u64).
#[must_use]
pub fn compute_pow_hash(public_key_bytes: &[u8], nonce: u64) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(public_key_bytes);
    hasher.update(nonce.to_le_bytes());
    hasher.finalize().into()
}

fn count_leading_zero_bits(hash: &[u8]) -> u32 {
    let mut count = 0;
    for byte in hash {
        if *byte == 0 {
            count += 8;
        } else {
            count += byte.leading_zeros();
            break;
        }
    }
    count
}

/// Search for a nonce satisfying `difficulty_bits`, starting from zero.
///
/// # Errors
/// Returns [`SybilError::PowExhausted`] if no valid nonce turns up within
/// `max_nonce` attempts.
pub fn generate_pow(public_key_bytes: &[u8], difficulty_bits: u32) -> SybilResult<ProofOfWork> {
    generate_pow_bounded(public_key_bytes, difficulty_bits, DEFAULT_MAX_NONCE)
}

pub fn generate_pow_bounded(
    public_key_bytes: &[u8],
    difficulty_bits: u32,
    max_nonce: u64,
) -> SybilResult<ProofOfWork> {
    let start = Instant::now();
    for nonce in 0..max_nonce {
        let hash = compute_pow_hash(public_key_bytes, nonce);
        if count_leading_zero_bits(&hash) >= difficulty_bits {
            let elapsed_seconds = start.elapsed().as_secs_f64();
            tracing::info!(nonce, difficulty_bits, elapsed_seconds, "pow_found");
            return Ok(ProofOfWork {
                nonce,
                difficulty_bits,
                hash_hex: hex::encode(hash),
                elapsed_seconds,
            });
        }
    }
    Err(SybilError::PowExhausted(max_nonce))
}

/// Verify that `nonce` produces a hash with `difficulty_bits` leading zeros.
#[must_use]
pub fn verify_pow(public_key_bytes: &[u8], nonce: u64, difficulty_bits: u32) -> bool {
    let hash = compute_pow_hash(public_key_bytes, nonce);
    count_leading_zero_bits(&hash) >= difficulty_bits
}

/// First 40 hex characters of the PoW hash (160 bits, matches Kademlia).
#[must_use]
pub fn derive_node_id(public_key_bytes: &[u8], nonce: u64) -> String {
    let hash = compute_pow_hash(public_key_bytes, nonce);
    hex::encode(hash)[..40].to_owned()
}

/// Load a cached [`ProofOfWork`] from `path`, generating and persisting a
/// new one if the cache is missing, unreadable, or no longer valid for
/// `public_key_bytes`.
pub fn load_or_generate(
    path: &Utf8Path,
    public_key_bytes: &[u8],
    difficulty_bits: u32,
) -> SybilResult<ProofOfWork> {
    if let Some(cached) = read_cache(path) {
        if cached.difficulty_bits == difficulty_bits
            && verify_pow(public_key_bytes, cached.nonce, difficulty_bits)
        {
            return Ok(cached);
        }
    }
    let pow = generate_pow(public_key_bytes, difficulty_bits)?;
    write_cache(path, &pow)?;
    Ok(pow)
}

fn read_cache(path: &Utf8Path) -> Option<ProofOfWork> {
    let bytes = std::fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn write_cache(path: &Utf8Path, pow: &ProofOfWork) -> SybilResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let bytes = serde_json::to_vec(pow).map_err(|e| SybilError::Io(e.into()))?;
    std::fs::write(path, bytes)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_mode(0o600);
        std::fs::set_permissions(path, perms)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_difficulty_pow_round_trips() {
        let pubkey = [7u8; 32];
        let pow = generate_pow(&pubkey, 8).unwrap();
        assert!(verify_pow(&pubkey, pow.nonce, 8));
        assert_eq!(derive_node_id(&pubkey, pow.nonce).len(), 40);
    }

    #[test]
    fn wrong_nonce_fails_verification() {
        let pubkey = [3u8; 32];
        let pow = generate_pow(&pubkey, 8).unwrap();
        assert!(!verify_pow(&pubkey, pow.nonce.wrapping_add(1), pow.difficulty_bits + 16));
    }

    #[test]
    fn exhausted_search_space_errors() {
        let pubkey = [9u8; 32];
        let err = generate_pow_bounded(&pubkey, 64, 4).unwrap_err();
        assert!(matches!(err, SybilError::PowExhausted(4)));
    }

    #[test]
    fn cache_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(dir.path().join("pow.json")).unwrap();
        let pubkey = [1u8; 32];
        let first = load_or_generate(&path, &pubkey, 8).unwrap();
        let second = load_or_generate(&path, &pubkey, 8).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn cache_regenerates_for_different_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(dir.path().join("pow.json")).unwrap();
        let first = load_or_generate(&path, &[1u8; 32], 8).unwrap();
        let second = load_or_generate(&path, &[2u8; 32], 8).unwrap();
        assert!(!verify_pow(&[2u8; 32], first.nonce, 8) || first.nonce != second.nonce);
    }
}
