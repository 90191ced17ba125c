//! Signed append-only credit ledger, sampled Merkle proofs, and
//! cross-device credit synchronization (§4.15, §4.16).

pub mod error;
pub mod ledger;
pub mod merkle;
pub mod sync;
pub mod verification;

pub use error::{CreditsError, CreditsResult};
pub use ledger::{entry_canonical, ActionType, CreditEntry, CreditLedger, CreditStats, Tier};
pub use sync::{AggregatedCreditStats, CreditSummary, CreditSyncManager, CreditSyncStore};
pub use verification::{CreditProof, CreditProofBuilder, ProofStepWire, VerificationResult};
