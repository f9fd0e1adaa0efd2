//! # Hashing Utilities
//!
//! Two hash functions, each with a fixed role:
//!
//! - **SHA-256** — externally visible digests: transaction commitments and
//!   nullifiers. These leave the core on the wire and must stay bit-exact
//!   for auditors running their own tooling.
//! - **BLAKE3** — internal structures: Merkle nodes, accumulator chains,
//!   ballot messages and pseudonym derivation, always through
//!   `derive_key` domain separation.
//!
//! [`sha256_framed`] length-prefixes every part so that the concatenation
//! of variable-width fields is unambiguous (`("ab","c")` and `("a","bc")`
//! hash differently).

use ark_bn254::Fr;
use ark_ff::PrimeField;
use sha2::{Digest as _, Sha256};

use crate::types::Digest;

/// SHA-256 of `data` as a [`Digest`].
pub fn sha256(data: &[u8]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(data);
    Digest::new(hasher.finalize().into())
}

/// SHA-256 over a sequence of parts, each prefixed by its length as a
/// big-endian `u32`.
pub fn sha256_framed(parts: &[&[u8]]) -> Digest {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u32).to_be_bytes());
        hasher.update(part);
    }
    Digest::new(hasher.finalize().into())
}

/// BLAKE3 in `derive_key` mode: the context string selects an independent
/// hash function, so digests from different contexts never collide.
pub fn domain_separated_hash(context: &str, data: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(data);
    *hasher.finalize().as_bytes()
}

/// Domain-separated BLAKE3 over several parts fed sequentially.
pub fn domain_separated_hash_multi(context: &str, parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

/// Map bytes to a BN254 scalar: BLAKE3, then reduce mod r.
pub fn hash_to_field(data: &[u8]) -> Fr {
    Fr::from_le_bytes_mod_order(blake3::hash(data).as_bytes())
}
