//! # Commitment Engine
//!
//! Turns a transfer request into what the ledger is allowed to see:
//!
//! ```text
//! commitment = SHA-256( "commitment" ‖ sender ‖ receiver ‖ amount ‖ salt )
//! nullifier  = SHA-256( "nullifier"  ‖ commitment ‖ sender ‖ secret )
//! ```
//!
//! Every field is length-prefixed (see [`sha256_framed`]) and the amount is
//! a big-endian `u64`. Both digests are deterministic; a fresh random salt
//! makes two transfers with the same parties and amount unlinkable.
//!
//! The range proof is bound to the commitment bytes, so a proof lifted from
//! one transaction never verifies on another.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::config::{DOMAIN_SETTLEMENT_BINDING, MAX_FIELD_LENGTH};
use crate::crypto::hash::{domain_separated_hash_multi, sha256_framed};
use crate::error::{CoreError, CoreResult};
use crate::types::{BatchId, Digest};
use crate::zkp::{RangeProof, RangeProver, RangeVerifier};

/// Length of salts produced by [`random_salt`].
pub const SALT_LENGTH: usize = 32;

fn check_field(name: &str, value: &[u8]) -> CoreResult<()> {
    if value.is_empty() {
        return Err(CoreError::MalformedInput(format!("{name} is empty")));
    }
    if value.len() > MAX_FIELD_LENGTH {
        return Err(CoreError::MalformedInput(format!(
            "{name} is {} bytes, limit is {MAX_FIELD_LENGTH}",
            value.len()
        )));
    }
    Ok(())
}

/// Hiding commitment over the four transfer fields.
pub fn commit(sender: &str, receiver: &str, amount: u64, salt: &[u8]) -> CoreResult<Digest> {
    check_field("sender", sender.as_bytes())?;
    check_field("receiver", receiver.as_bytes())?;
    check_field("salt", salt)?;
    if amount == 0 {
        return Err(CoreError::MalformedInput("amount must be positive".into()));
    }

    Ok(sha256_framed(&[
        b"commitment",
        sender.as_bytes(),
        receiver.as_bytes(),
        &amount.to_be_bytes(),
        salt,
    ]))
}

/// Spend tag for the output behind `commitment`.
pub fn nullifier(commitment: &Digest, sender: &str, secret: &[u8]) -> CoreResult<Digest> {
    check_field("sender", sender.as_bytes())?;
    check_field("spend secret", secret)?;

    Ok(sha256_framed(&[
        b"nullifier",
        commitment.as_bytes(),
        sender.as_bytes(),
        secret,
    ]))
}

/// Fresh salt from the OS RNG.
pub fn random_salt() -> [u8; SALT_LENGTH] {
    let mut salt = [0u8; SALT_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// Private inputs of one transfer. Never leaves the submitting client.
#[derive(Clone)]
pub struct TransferRequest {
    pub sender: String,
    pub receiver: String,
    pub amount: u64,
    /// Hidden upper bound the amount is proven against (balance or limit).
    pub bound: u64,
    pub salt: Vec<u8>,
    pub spend_secret: Vec<u8>,
}

impl std::fmt::Debug for TransferRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TransferRequest(<redacted>)")
    }
}

/// The public face of a transfer, before it is sequenced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedTransaction {
    pub commitment: Digest,
    pub nullifier: Digest,
    pub range_proof: RangeProof,
}

impl CommittedTransaction {
    /// Transaction hash: Merkle leaf, nullifier binding and court-access key.
    pub fn hash(&self) -> Digest {
        sha256_framed(&[
            b"transaction",
            self.commitment.as_bytes(),
            self.nullifier.as_bytes(),
            self.range_proof.as_bytes(),
        ])
    }

    /// Check the range proof against this transaction's commitment.
    pub fn verify_proof(&self, verifier: &dyn RangeVerifier) -> bool {
        verifier.verify(&self.range_proof, self.commitment.as_bytes())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionState {
    Created,
    Batched,
    Voting,
    Approved,
    Rejected,
}

/// A sequenced transaction. Immutable apart from `batch_id` and `state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub sequence_number: u64,
    pub commitment: Digest,
    pub nullifier: Digest,
    pub range_proof: RangeProof,
    pub batch_id: Option<BatchId>,
    pub state: TransactionState,
    pub submitted_at: DateTime<Utc>,
}

impl Transaction {
    pub fn from_committed(
        sequence_number: u64,
        committed: CommittedTransaction,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            sequence_number,
            commitment: committed.commitment,
            nullifier: committed.nullifier,
            range_proof: committed.range_proof,
            batch_id: None,
            state: TransactionState::Created,
            submitted_at: at,
        }
    }

    pub fn hash(&self) -> Digest {
        self.committed().hash()
    }

    /// What a spent nullifier is bound to: the transaction hash plus its
    /// sequence number. Two sequenced copies of identical bytes bind
    /// differently, so the second one is a double spend.
    pub fn settlement_binding(&self) -> Digest {
        Digest::new(domain_separated_hash_multi(
            DOMAIN_SETTLEMENT_BINDING,
            &[self.hash().as_bytes(), &self.sequence_number.to_be_bytes()],
        ))
    }

    pub fn committed(&self) -> CommittedTransaction {
        CommittedTransaction {
            commitment: self.commitment,
            nullifier: self.nullifier,
            range_proof: self.range_proof.clone(),
        }
    }

    pub fn verify_proof(&self, verifier: &dyn RangeVerifier) -> bool {
        verifier.verify(&self.range_proof, self.commitment.as_bytes())
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Builds committed transactions, proofs included.
#[derive(Clone)]
pub struct CommitmentEngine {
    prover: Arc<dyn RangeProver>,
}

impl CommitmentEngine {
    pub fn new(prover: Arc<dyn RangeProver>) -> Self {
        Self { prover }
    }

    pub fn create_transaction(&self, request: &TransferRequest) -> CoreResult<CommittedTransaction> {
        let commitment = commit(
            &request.sender,
            &request.receiver,
            request.amount,
            &request.salt,
        )?;
        let nullifier = nullifier(&commitment, &request.sender, &request.spend_secret)?;
        let range_proof = self
            .prover
            .prove(request.amount, request.bound, commitment.as_bytes())?;

        debug!(%commitment, proof_bytes = range_proof.len(), "transaction committed");
        Ok(CommittedTransaction {
            commitment,
            nullifier,
            range_proof,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zkp::testing::shared_backend;

    fn request(amount: u64, salt: &[u8]) -> TransferRequest {
        TransferRequest {
            sender: "acct-alice".into(),
            receiver: "acct-bob".into(),
            amount,
            bound: 10_000,
            salt: salt.to_vec(),
            spend_secret: b"alice-spend-key".to_vec(),
        }
    }

    #[test]
    fn commit_is_deterministic() {
        let a = commit("alice", "bob", 42, b"salt").unwrap();
        let b = commit("alice", "bob", 42, b"salt").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn salt_unlinks_identical_transfers() {
        let a = commit("alice", "bob", 42, b"salt-1").unwrap();
        let b = commit("alice", "bob", 42, b"salt-2").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn fields_do_not_run_together() {
        let a = commit("ab", "c", 1, b"s").unwrap();
        let b = commit("a", "bc", 1, b"s").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn nullifier_is_deterministic_and_secret_dependent() {
        let c = commit("alice", "bob", 42, b"salt").unwrap();
        let n1 = nullifier(&c, "alice", b"k1").unwrap();
        assert_eq!(n1, nullifier(&c, "alice", b"k1").unwrap());
        assert_ne!(n1, nullifier(&c, "alice", b"k2").unwrap());
        assert_ne!(n1, c);
    }

    #[test]
    fn empty_and_oversized_fields_rejected() {
        assert!(matches!(
            commit("", "bob", 1, b"s"),
            Err(CoreError::MalformedInput(_))
        ));
        assert!(matches!(
            commit("alice", "bob", 1, b""),
            Err(CoreError::MalformedInput(_))
        ));
        let long = "x".repeat(MAX_FIELD_LENGTH + 1);
        assert!(matches!(
            commit("alice", &long, 1, b"s"),
            Err(CoreError::MalformedInput(_))
        ));
        let c = commit("alice", "bob", 1, b"s").unwrap();
        assert!(matches!(
            nullifier(&c, "alice", b""),
            Err(CoreError::MalformedInput(_))
        ));
    }

    #[test]
    fn zero_amount_rejected() {
        assert!(matches!(
            commit("alice", "bob", 0, b"s"),
            Err(CoreError::MalformedInput(_))
        ));
    }

    #[test]
    fn random_salts_differ() {
        assert_ne!(random_salt(), random_salt());
    }

    #[test]
    fn engine_binds_proof_to_commitment() {
        let (prover, verifier) = shared_backend();
        let engine = CommitmentEngine::new(Arc::new(prover.clone()));
        let tx = engine.create_transaction(&request(250, b"salt-a")).unwrap();
        assert!(tx.verify_proof(verifier));

        let other = engine.create_transaction(&request(250, b"salt-b")).unwrap();
        let mut spliced = other.clone();
        spliced.range_proof = tx.range_proof.clone();
        assert!(!spliced.verify_proof(verifier));
    }

    #[test]
    fn reproving_same_inputs_changes_hash_not_nullifier() {
        let (prover, _) = shared_backend();
        let engine = CommitmentEngine::new(Arc::new(prover.clone()));
        let a = engine.create_transaction(&request(7, b"salt")).unwrap();
        let b = engine.create_transaction(&request(7, b"salt")).unwrap();
        assert_eq!(a.commitment, b.commitment);
        assert_eq!(a.nullifier, b.nullifier);
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn out_of_range_amount_fails_to_prove() {
        let (prover, _) = shared_backend();
        let engine = CommitmentEngine::new(Arc::new(prover.clone()));
        let mut req = request(20_000, b"salt");
        req.bound = 10_000;
        assert!(engine.create_transaction(&req).is_err());
    }
}
