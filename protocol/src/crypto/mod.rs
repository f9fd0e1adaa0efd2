//! # Cryptographic Primitives
//!
//! Thin, type-safe wrappers over audited implementations:
//!
//! - **SHA-256 / BLAKE3** for digests (`hash`).
//! - **AES-256-GCM** for escrowed payloads and sealed identities (`encryption`).
//! - **Ed25519** for identified signers (`keys`).
//!
//! Nothing in here is novel. The protocol-level constructions built on top
//! (commitments, rosters, access structures) live in their own modules.

pub mod encryption;
pub mod hash;
pub mod keys;

pub use encryption::{open, seal};
pub use hash::{domain_separated_hash, sha256, sha256_framed};
pub use keys::{ShroudKeypair, ShroudPublicKey, ShroudSignature};
