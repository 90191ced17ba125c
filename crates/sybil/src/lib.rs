//! Sybil attack defense: proof-of-work node identity and per-subnet rate
//! limiting for DHT routing buckets (§4.10).

pub mod error;
pub mod pow;
pub mod subnet;
pub mod validator;

pub use error::{SybilError, SybilResult};
pub use pow::{
    compute_pow_hash, derive_node_id, generate_pow, load_or_generate, verify_pow, ProofOfWork,
    DEFAULT_DIFFICULTY_BITS,
};
pub use subnet::{SubnetLimiter, DEFAULT_MAX_PER_SUBNET};
pub use validator::SybilValidator;
