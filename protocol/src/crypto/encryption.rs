//! # AES-256-GCM Encryption
//!
//! Authenticated encryption for escrowed transaction payloads and for the
//! sealed identities carried in group-signature rosters.
//!
//! Nonces are 96 random bits from `OsRng`. Every escrow key is fresh per
//! payload, so the birthday bound on random nonces is never approached.
//!
//! ## Wire format
//!
//! [`seal`] returns `nonce || ciphertext || tag`; [`open`] expects the same.
//! The AAD is never stored: callers bind the ciphertext to its context (the
//! transaction hash, the pseudonym key) by supplying the same AAD on open.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use thiserror::Error;

use crate::config::{AES_KEY_LENGTH, AES_NONCE_LENGTH, AES_TAG_LENGTH};

/// Encryption failures. Deliberately coarse.
#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("encryption failed")]
    EncryptFailed,

    #[error("decryption failed -- wrong key, wrong context or corrupted ciphertext")]
    DecryptFailed,

    #[error("invalid key length: expected {AES_KEY_LENGTH} bytes")]
    InvalidKeyLength,

    #[error("ciphertext too short: must be at least {} bytes", AES_NONCE_LENGTH + AES_TAG_LENGTH)]
    CiphertextTooShort,
}

/// Generate a fresh random AES-256 key.
pub fn generate_key() -> [u8; AES_KEY_LENGTH] {
    let mut key = [0u8; AES_KEY_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

/// Encrypt `plaintext` under `key`, authenticating `aad`.
pub fn seal(
    key: &[u8; AES_KEY_LENGTH],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, EncryptionError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::EncryptFailed)?;

    let mut nonce_bytes = [0u8; AES_NONCE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| EncryptionError::EncryptFailed)?;

    let mut out = Vec::with_capacity(AES_NONCE_LENGTH + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt data produced by [`seal`] with the same key and AAD.
pub fn open(
    key: &[u8; AES_KEY_LENGTH],
    sealed: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, EncryptionError> {
    if sealed.len() < AES_NONCE_LENGTH + AES_TAG_LENGTH {
        return Err(EncryptionError::CiphertextTooShort);
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(AES_NONCE_LENGTH);
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::DecryptFailed)?;

    cipher
        .decrypt(
            Nonce::from_slice(nonce_bytes),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| EncryptionError::DecryptFailed)
}

/// [`open`] with a key of unchecked length (e.g. fresh out of Shamir
/// reconstruction).
pub fn open_checked(key: &[u8], sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    let key: &[u8; AES_KEY_LENGTH] = key
        .try_into()
        .map_err(|_| EncryptionError::InvalidKeyLength)?;
    open(key, sealed, aad)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> [u8; 32] {
        let mut key = [0u8; 32];
        for (i, byte) in key.iter_mut().enumerate() {
            *byte = i as u8;
        }
        key
    }

    #[test]
    fn seal_open_roundtrip() {
        let key = test_key();
        let sealed = seal(&key, b"private payment data", b"tx:abc").unwrap();
        assert_eq!(open(&key, &sealed, b"tx:abc").unwrap(), b"private payment data");
    }

    #[test]
    fn wrong_aad_fails() {
        let key = test_key();
        let sealed = seal(&key, b"secret", b"correct").unwrap();
        assert!(matches!(
            open(&key, &sealed, b"wrong"),
            Err(EncryptionError::DecryptFailed)
        ));
    }

    #[test]
    fn wrong_key_fails() {
        let key = test_key();
        let sealed = seal(&key, b"secret", b"").unwrap();
        let mut wrong = key;
        wrong[0] ^= 0xFF;
        assert!(open(&wrong, &sealed, b"").is_err());
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let key = test_key();
        let mut sealed = seal(&key, b"secret", b"").unwrap();
        sealed[AES_NONCE_LENGTH] ^= 0x01;
        assert!(open(&key, &sealed, b"").is_err());
    }

    #[test]
    fn sealed_length_is_nonce_plus_tag_plus_body() {
        let sealed = seal(&test_key(), b"0123456789", b"").unwrap();
        assert_eq!(sealed.len(), AES_NONCE_LENGTH + 10 + AES_TAG_LENGTH);
    }

    #[test]
    fn nonces_are_fresh() {
        let key = test_key();
        let a = seal(&key, b"m", b"").unwrap();
        let b = seal(&key, b"m", b"").unwrap();
        assert_ne!(&a[..AES_NONCE_LENGTH], &b[..AES_NONCE_LENGTH]);
    }

    #[test]
    fn short_input_rejected() {
        assert!(matches!(
            open(&test_key(), &[0u8; 4], b""),
            Err(EncryptionError::CiphertextTooShort)
        ));
    }

    #[test]
    fn checked_open_rejects_short_key() {
        let sealed = seal(&test_key(), b"x", b"").unwrap();
        assert!(matches!(
            open_checked(&[0u8; 16], &sealed, b""),
            Err(EncryptionError::InvalidKeyLength)
        ));
    }
}
