//! Sampled Merkle proof construction and verification (§4.15).
//!
//! A proof lets a peer convince another peer of its credit totals without
//! handing over the whole ledger: it carries the Merkle root (signed), a
//! sample of individual entries, and an inclusion proof per sampled entry.
//! Verification recomputes each sampled entry's hash and signature and
//! checks its inclusion proof against the claimed root, and checks the
//! root's own signature.

use infomesh_primitives::identity::KeyPair;
use serde::{Deserialize, Serialize};

use crate::error::CreditsResult;
use crate::ledger::{entry_canonical, verify_hex_signature, CreditEntry, CreditLedger};
use crate::merkle::{verify_inclusion, Hash, MerkleTree, ProofStep};

fn hash_from_hex(s: &str) -> Option<Hash> {
    let bytes = hex::decode(s).ok()?;
    bytes.try_into().ok()
}

/// Wire form of a [`ProofStep`]: the sibling hash hex-encoded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProofStepWire {
    pub sibling: String,
    pub sibling_is_right: bool,
}

impl From<ProofStep> for ProofStepWire {
    fn from(step: ProofStep) -> Self {
        Self { sibling: hex::encode(step.sibling), sibling_is_right: step.sibling_is_right }
    }
}

impl ProofStepWire {
    fn to_step(&self) -> Option<ProofStep> {
        Some(ProofStep { sibling: hash_from_hex(&self.sibling)?, sibling_is_right: self.sibling_is_right })
    }
}

/// A credit proof: claimed totals plus a verifiable sample of entries.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreditProof {
    pub peer_id: String,
    pub entry_count: usize,
    pub total_earned: f64,
    pub total_spent: f64,
    pub action_breakdown: std::collections::BTreeMap<String, f64>,
    pub sample_entries: Vec<CreditEntry>,
    pub sample_proofs: Vec<Vec<ProofStepWire>>,
    pub merkle_root: String,
    pub root_signature: String,
    pub public_key: String,
    pub request_id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub verified: bool,
    pub merkle_root_valid: bool,
    pub valid_signatures: usize,
    pub invalid_signatures: usize,
    pub valid_proofs: usize,
    pub invalid_proofs: usize,
    pub detail: String,
}

/// Builds and verifies [`CreditProof`]s for a single node's ledger.
pub struct CreditProofBuilder<'a> {
    ledger: &'a CreditLedger,
    key_pair: &'a KeyPair,
}

impl<'a> CreditProofBuilder<'a> {
    #[must_use]
    pub fn new(ledger: &'a CreditLedger, key_pair: &'a KeyPair) -> Self {
        Self { ledger, key_pair }
    }

    /// Build a proof over the ledger's *signed* entries (unsigned entries
    /// carry no verifiable signature and are excluded from both the Merkle
    /// tree and `entry_count`). `sample_size` defaults to every signed
    /// entry when omitted or larger than the signed set; callers should
    /// keep it small in practice to bound response size.
    pub fn build_proof(&self, sample_size: Option<usize>, request_id: Option<&str>) -> CreditsResult<CreditProof> {
        let entries = self.ledger.signed_entries()?;
        let stats = self.ledger.stats()?;
        let action_breakdown = self.ledger.action_breakdown()?;
        let peer_id = self.key_pair.peer_id();
        let public_key = hex::encode(self.key_pair.public_key_bytes());

        if entries.is_empty() {
            return Ok(CreditProof {
                peer_id,
                entry_count: 0,
                total_earned: 0.0,
                total_spent: 0.0,
                action_breakdown,
                sample_entries: Vec::new(),
                sample_proofs: Vec::new(),
                merkle_root: String::new(),
                root_signature: String::new(),
                public_key,
                request_id: request_id.map(str::to_owned),
            });
        }

        let leaves: Vec<Hash> = entries
            .iter()
            .map(|e| hash_from_hex(&e.entry_hash).unwrap_or([0u8; 32]))
            .collect();
        let tree = MerkleTree::build(&leaves);
        let root = tree.root().expect("non-empty leaf set has a root");
        let root_signature = hex::encode(self.key_pair.sign(&root).to_bytes());

        let n = sample_size.unwrap_or(entries.len()).min(entries.len());
        let mut indices = rand::seq::index::sample(&mut rand::thread_rng(), entries.len(), n).into_vec();
        indices.sort_unstable();
        let sample_entries: Vec<CreditEntry> = indices.iter().map(|&i| entries[i].clone()).collect();
        let sample_proofs: Vec<Vec<ProofStepWire>> = indices
            .iter()
            .map(|&i| tree.proof(i).expect("index within range").into_iter().map(ProofStepWire::from).collect())
            .collect();

        Ok(CreditProof {
            peer_id,
            entry_count: entries.len(),
            total_earned: stats.total_earned,
            total_spent: stats.total_spent,
            action_breakdown,
            sample_entries,
            sample_proofs,
            merkle_root: hex::encode(root),
            root_signature,
            public_key,
            request_id: request_id.map(str::to_owned),
        })
    }

    /// Verify a proof received from a peer. Does not require the ledger or
    /// key pair that built it; everything needed travels with the proof.
    #[must_use]
    pub fn verify_proof(proof: &CreditProof) -> VerificationResult {
        if proof.entry_count == 0 {
            return VerificationResult {
                verified: true,
                merkle_root_valid: true,
                detail: "empty_ledger".to_owned(),
                ..Default::default()
            };
        }

        let Some(root_bytes) = hash_from_hex(&proof.merkle_root) else {
            return VerificationResult { verified: false, detail: "invalid_merkle_root_encoding".to_owned(), ..Default::default() };
        };

        let public_key_valid = hex::decode(&proof.public_key)
            .ok()
            .is_some_and(|b| b.len() == 32);
        if !public_key_valid {
            return VerificationResult {
                verified: false,
                detail: format!("invalid_public_key: {}", proof.public_key),
                ..Default::default()
            };
        }

        let root_signature_valid = verify_hex_signature(&proof.public_key, &root_bytes, &proof.root_signature);

        let mut valid_signatures = 0usize;
        let mut invalid_signatures = 0usize;
        let mut valid_proofs = 0usize;
        let mut invalid_proofs = 0usize;
        let mut all_proofs_match_root = true;

        for (entry, steps_wire) in proof.sample_entries.iter().zip(proof.sample_proofs.iter()) {
            let canonical = entry_canonical(
                &entry.action,
                entry.quantity,
                entry.weight,
                entry.multiplier,
                entry.credits,
                entry.timestamp,
                &entry.note,
            );
            let recomputed_hash = infomesh_primitives::hash::sha256_hex(&canonical);
            let hash_valid = recomputed_hash == entry.entry_hash;
            let signature_valid = hash_valid && verify_hex_signature(&proof.public_key, &canonical, &entry.signature);
            if signature_valid {
                valid_signatures += 1;
            } else {
                invalid_signatures += 1;
            }

            let steps: Option<Vec<ProofStep>> = steps_wire.iter().map(ProofStepWire::to_step).collect();
            let leaf = hash_from_hex(&entry.entry_hash);
            let proof_ok = match (leaf, steps) {
                (Some(leaf), Some(steps)) => verify_inclusion(leaf, &steps, root_bytes),
                _ => false,
            };
            if proof_ok {
                valid_proofs += 1;
            } else {
                invalid_proofs += 1;
                all_proofs_match_root = false;
            }
        }

        let merkle_root_valid = root_signature_valid && all_proofs_match_root;
        let verified = merkle_root_valid && invalid_signatures == 0 && invalid_proofs == 0;

        let detail = if verified {
            "ok".to_owned()
        } else if !root_signature_valid {
            "invalid_root_signature".to_owned()
        } else if !all_proofs_match_root {
            "invalid_merkle_proof".to_owned()
        } else {
            "invalid_entry_signature".to_owned()
        };

        VerificationResult {
            verified,
            merkle_root_valid,
            valid_signatures,
            invalid_signatures,
            valid_proofs,
            invalid_proofs,
            detail,
        }
    }
}
