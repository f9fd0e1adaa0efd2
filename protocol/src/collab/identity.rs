//! Identity-verification collaborator for court orders.
//!
//! A judge credential is a signature over the transaction hash the order
//! targets. The verifier answers with the authority's identity or nothing.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::DOMAIN_COURT_ORDER;
use crate::crypto::hash::domain_separated_hash_multi;
use crate::crypto::keys::{ShroudKeypair, ShroudPublicKey, ShroudSignature};
use crate::types::{Digest, PartyId};

pub trait CredentialVerifier: Send + Sync {
    /// The authority behind `credential`, if it validly orders access to
    /// `transaction`.
    fn verify(&self, credential: &JudgeCredential, transaction: &Digest) -> Option<PartyId>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeCredential {
    pub judge: PartyId,
    pub signature: ShroudSignature,
}

fn order_message(judge: &PartyId, transaction: &Digest) -> [u8; 32] {
    domain_separated_hash_multi(
        DOMAIN_COURT_ORDER,
        &[
            &(judge.as_str().len() as u32).to_be_bytes(),
            judge.as_str().as_bytes(),
            transaction.as_bytes(),
        ],
    )
}

impl JudgeCredential {
    pub fn sign(judge: PartyId, key: &ShroudKeypair, transaction: &Digest) -> Self {
        let signature = key.sign(&order_message(&judge, transaction));
        Self { judge, signature }
    }
}

/// Checks credentials against a fixed registry of judge keys.
#[derive(Debug, Default, Clone)]
pub struct Ed25519CredentialVerifier {
    judges: HashMap<PartyId, ShroudPublicKey>,
}

impl Ed25519CredentialVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, judge: PartyId, key: ShroudPublicKey) {
        self.judges.insert(judge, key);
    }
}

impl CredentialVerifier for Ed25519CredentialVerifier {
    fn verify(&self, credential: &JudgeCredential, transaction: &Digest) -> Option<PartyId> {
        let key = self.judges.get(&credential.judge)?;
        key.verify(
            &order_message(&credential.judge, transaction),
            &credential.signature,
        )
        .then(|| credential.judge.clone())
    }
}
