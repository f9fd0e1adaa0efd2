//! # Key Management
//!
//! Ed25519 keypairs for the parties that must be *identified*: share
//! holders signing their submissions, judges signing court requests, and
//! the one-time pseudonym keys inside group-signature rosters.
//!
//! Consortium votes are never signed with a member's long-term key. See
//! [`crate::group`] for how anonymity is preserved.
//!
//! Key bytes are never logged and [`ShroudKeypair`] does not implement
//! `Serialize`.

use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::config::SIGNATURE_LENGTH;

/// Errors that can occur during key operations.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid secret key bytes")]
    InvalidSecretKey,

    #[error("invalid public key bytes: not a valid Ed25519 point")]
    InvalidPublicKey,
}

/// An Ed25519 signing keypair.
pub struct ShroudKeypair {
    signing_key: SigningKey,
}

/// The public half of a [`ShroudKeypair`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShroudPublicKey {
    bytes: [u8; 32],
}

/// A 64-byte Ed25519 signature.
///
/// Held as `Vec<u8>` for serde; a wrong-length value simply fails to verify.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShroudSignature {
    bytes: Vec<u8>,
}

impl ShroudKeypair {
    /// Fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Deterministic keypair from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Load from a hex-encoded 32-byte seed.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_str).map_err(|_| KeyError::InvalidSecretKey)?;
        let seed: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self::from_seed(&seed))
    }

    pub fn public_key(&self) -> ShroudPublicKey {
        ShroudPublicKey {
            bytes: self.signing_key.verifying_key().to_bytes(),
        }
    }

    pub fn sign(&self, message: &[u8]) -> ShroudSignature {
        ShroudSignature {
            bytes: self.signing_key.sign(message).to_bytes().to_vec(),
        }
    }

    pub fn verify(&self, message: &[u8], signature: &ShroudSignature) -> bool {
        self.public_key().verify(message, signature)
    }
}

impl Clone for ShroudKeypair {
    fn clone(&self) -> Self {
        Self::from_seed(&self.signing_key.to_bytes())
    }
}

impl fmt::Debug for ShroudKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShroudKeypair(pub={})", self.public_key().to_hex())
    }
}

impl ShroudPublicKey {
    /// Wrap bytes after checking they decode to a curve point.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, KeyError> {
        VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Strict verification; any malformed input is simply `false`.
    pub fn verify(&self, message: &[u8], signature: &ShroudSignature) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.bytes) else {
            return false;
        };
        let Ok(sig_bytes) = <[u8; SIGNATURE_LENGTH]>::try_from(signature.bytes.as_slice()) else {
            return false;
        };
        let sig = DalekSignature::from_bytes(&sig_bytes);
        verifying_key.verify_strict(message, &sig).is_ok()
    }
}

impl fmt::Debug for ShroudPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShroudPublicKey({})", &self.to_hex()[..16])
    }
}

impl ShroudSignature {
    pub fn from_bytes(bytes: [u8; SIGNATURE_LENGTH]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for ShroudSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShroudSignature({}…)", hex::encode(&self.bytes[..self.bytes.len().min(8)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let kp = ShroudKeypair::generate();
        let sig = kp.sign(b"approve batch 7");
        assert!(kp.verify(b"approve batch 7", &sig));
        assert!(!kp.verify(b"approve batch 8", &sig));
    }

    #[test]
    fn seeded_keys_are_deterministic() {
        let a = ShroudKeypair::from_seed(&[9u8; 32]);
        let b = ShroudKeypair::from_seed(&[9u8; 32]);
        assert_eq!(a.public_key(), b.public_key());
        assert_eq!(a.sign(b"m"), b.sign(b"m"));
    }

    #[test]
    fn foreign_key_rejects() {
        let a = ShroudKeypair::generate();
        let b = ShroudKeypair::generate();
        let sig = a.sign(b"m");
        assert!(!b.public_key().verify(b"m", &sig));
    }

    #[test]
    fn truncated_signature_rejected() {
        let kp = ShroudKeypair::generate();
        let mut sig = kp.sign(b"m");
        sig.bytes.truncate(10);
        assert!(!kp.verify(b"m", &sig));
    }

    #[test]
    fn hex_loading() {
        let kp = ShroudKeypair::from_hex(&"11".repeat(32)).unwrap();
        assert_eq!(kp.public_key(), ShroudKeypair::from_seed(&[0x11; 32]).public_key());
        assert!(ShroudKeypair::from_hex("abcd").is_err());
    }
}
