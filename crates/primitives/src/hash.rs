//! SHA-256 content hashing and zstd (de)compression (component A).

use sha2::{Digest, Sha256};

use crate::error::PrimitivesResult;

/// Lowercase hex SHA-256 digest of arbitrary bytes.
#[must_use]
pub fn sha256_hex(data: impl AsRef<[u8]>) -> String {
    hex::encode(sha256_bytes(data))
}

/// Raw SHA-256 digest of arbitrary bytes.
#[must_use]
pub fn sha256_bytes(data: impl AsRef<[u8]>) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data.as_ref());
    hasher.finalize().into()
}

/// Compress `data` at the given zstd level.
pub fn compress(data: &[u8], level: i32) -> PrimitivesResult<Vec<u8>> {
    Ok(zstd::stream::encode_all(data, level)?)
}

/// Decompress a zstd frame produced by [`compress`].
pub fn decompress(data: &[u8]) -> PrimitivesResult<Vec<u8>> {
    Ok(zstd::stream::decode_all(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_is_stable() {
        let digest = sha256_hex(b"infomesh");
        assert_eq!(digest, sha256_hex(b"infomesh"));
        assert_eq!(digest.len(), 64);
    }

    #[test]
    fn compress_round_trips() {
        let payload = b"the quick brown fox jumps over the lazy dog".repeat(16);
        let compressed = compress(&payload, 3).expect("compress");
        assert!(compressed.len() < payload.len());
        let restored = decompress(&compressed).expect("decompress");
        assert_eq!(restored, payload);
    }
}
