//! Cryptographic primitives used by the quorum-fetch client:
//! payload digests, recoverable ECDSA signatures and signer addresses.

pub use fmt::*;

mod fmt;
pub mod keccak256;
pub mod secp256k1;
pub mod sha256;
