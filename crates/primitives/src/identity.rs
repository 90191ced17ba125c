//! Ed25519 node identity (§3 "Key pair").
//!
//! `peer_id` is derived, not chosen: the first 40 hex characters of
//! `SHA-256(public_key_bytes)`. Private key material is written to disk
//! with owner-only permissions.

use std::path::Path;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

use crate::error::{PrimitivesError, PrimitivesResult};
use crate::hash::sha256_hex;

/// Number of hex characters of the public-key hash used as a peer id.
pub const PEER_ID_HEX_LEN: usize = 40;

/// An Ed25519 signing key pair plus its derived peer id.
#[derive(Debug)]
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    /// Generate a fresh random key pair.
    #[must_use]
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Reconstruct a key pair from its 32-byte secret scalar.
    pub fn from_secret_bytes(bytes: &[u8]) -> PrimitivesResult<Self> {
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| PrimitivesError::InvalidKey("expected 32-byte secret key".into()))?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&array),
        })
    }

    /// Load a PEM-encoded private key from `path`.
    pub fn load(path: &Path) -> PrimitivesResult<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| PrimitivesError::InvalidKey(format!("reading {path:?}: {e}")))?;
        let der = pem_body_to_bytes(&contents)?;
        Self::from_secret_bytes(&der)
    }

    /// Write the private key as PEM to `path`, restricting permissions to
    /// owner read/write (`0o600`) on unix platforms.
    pub fn save(&self, path: &Path) -> PrimitivesResult<()> {
        let pem = bytes_to_pem_body(self.signing_key.to_bytes().as_slice());
        std::fs::write(path, pem)
            .map_err(|e| PrimitivesError::InvalidKey(format!("writing {path:?}: {e}")))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(path)
                .map_err(|e| PrimitivesError::InvalidKey(e.to_string()))?
                .permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(path, perms)
                .map_err(|e| PrimitivesError::InvalidKey(e.to_string()))?;
        }

        Ok(())
    }

    /// Save the corresponding public key as PEM to `path`.
    pub fn save_public(&self, path: &Path) -> PrimitivesResult<()> {
        let pem = bytes_to_pem_body(self.verifying_key().as_bytes());
        std::fs::write(path, pem)
            .map_err(|e| PrimitivesError::InvalidKey(format!("writing {path:?}: {e}")))
    }

    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    #[must_use]
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.verifying_key().to_bytes()
    }

    /// Derived peer id: first 40 hex chars of `SHA-256(public_key_bytes)`.
    #[must_use]
    pub fn peer_id(&self) -> String {
        peer_id_from_public_key(&self.public_key_bytes())
    }

    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }
}

/// Derive a peer id from raw public-key bytes without needing the full
/// [`KeyPair`] (used to verify a remote peer's signature/peer-id pair).
#[must_use]
pub fn peer_id_from_public_key(public_key_bytes: &[u8]) -> String {
    sha256_hex(public_key_bytes)[..PEER_ID_HEX_LEN].to_owned()
}

/// Verify a signature produced by [`KeyPair::sign`] against raw public-key
/// bytes.
pub fn verify_signature(
    public_key_bytes: &[u8; 32],
    message: &[u8],
    signature_bytes: &[u8; 64],
) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(public_key_bytes) else {
        return false;
    };
    let signature = Signature::from_bytes(signature_bytes);
    verifying_key.verify(message, &signature).is_ok()
}

fn bytes_to_pem_body(bytes: &[u8]) -> String {
    format!(
        "-----BEGIN INFOMESH ED25519 KEY-----\n{}\n-----END INFOMESH ED25519 KEY-----\n",
        hex::encode(bytes)
    )
}

fn pem_body_to_bytes(pem: &str) -> PrimitivesResult<Vec<u8>> {
    let hex_body: String = pem
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect();
    hex::decode(hex_body.trim())
        .map_err(|e| PrimitivesError::InvalidKey(format!("malformed key file: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_id_is_40_hex_chars() {
        let key_pair = KeyPair::generate();
        let peer_id = key_pair.peer_id();
        assert_eq!(peer_id.len(), PEER_ID_HEX_LEN);
        assert!(peer_id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let key_pair = KeyPair::generate();
        let message = b"crawl this url";
        let signature = key_pair.sign(message);
        assert!(verify_signature(
            &key_pair.public_key_bytes(),
            message,
            &signature.to_bytes()
        ));
    }

    #[test]
    fn verify_fails_for_tampered_message() {
        let key_pair = KeyPair::generate();
        let signature = key_pair.sign(b"original");
        assert!(!verify_signature(
            &key_pair.public_key_bytes(),
            b"tampered",
            &signature.to_bytes()
        ));
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("private.pem");
        let key_pair = KeyPair::generate();
        key_pair.save(&path).expect("save");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);
        }

        let loaded = KeyPair::load(&path).expect("load");
        assert_eq!(loaded.peer_id(), key_pair.peer_id());
    }
}
