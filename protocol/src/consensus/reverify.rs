//! Ground truth for independent re-verification.
//!
//! A sampled batch is re-checked from scratch: every range proof against
//! its commitment, and the Merkle root against the transactions. A batch
//! that passes should have been approved; one that fails should have been
//! rejected. Each member's opened vote is scored against that.

use std::collections::HashSet;
use std::sync::Arc;

use super::slashing::SlashOutcome;
use crate::batch::Batch;
use crate::types::{BatchId, Decision, MemberId};
use crate::zkp::RangeVerifier;

#[derive(Clone)]
pub struct IndependentVerifier {
    verifier: Arc<dyn RangeVerifier>,
}

impl IndependentVerifier {
    pub fn new(verifier: Arc<dyn RangeVerifier>) -> Self {
        Self { verifier }
    }

    /// The decision an honest member should have cast on `batch`.
    pub fn ground_truth(&self, batch: &Batch) -> Decision {
        let proofs_ok = batch
            .transactions
            .iter()
            .all(|tx| tx.verify_proof(self.verifier.as_ref()));
        let mut seen = HashSet::with_capacity(batch.len());
        let nullifiers_unique = batch.transactions.iter().all(|tx| seen.insert(tx.nullifier));

        if proofs_ok && nullifiers_unique && batch.root_matches() {
            Decision::Approve
        } else {
            Decision::Reject
        }
    }
}

/// What re-verifying one batch found.
#[derive(Debug, Clone)]
pub struct BatchReview {
    pub batch: BatchId,
    pub truth: Decision,
    pub honest: Vec<MemberId>,
    pub slashed: Vec<(MemberId, SlashOutcome)>,
}

/// Result of one sampling pass.
#[derive(Debug, Clone, Default)]
pub struct ReverificationReport {
    pub reviews: Vec<BatchReview>,
}

impl ReverificationReport {
    pub fn sampled(&self) -> usize {
        self.reviews.len()
    }

    pub fn slashes(&self) -> impl Iterator<Item = &(MemberId, SlashOutcome)> {
        self.reviews.iter().flat_map(|r| r.slashed.iter())
    }

    pub fn deactivated(&self) -> Vec<MemberId> {
        self.slashes()
            .filter(|(_, o)| o.deactivated)
            .map(|(m, _)| m.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitment::{CommittedTransaction, Transaction};
    use crate::crypto::hash::sha256;
    use crate::zkp::RangeProof;
    use chrono::Utc;

    struct FlagVerifier;

    impl RangeVerifier for FlagVerifier {
        fn verify(&self, proof: &RangeProof, _context: &[u8]) -> bool {
            proof.as_bytes().first() == Some(&1)
        }
    }

    fn sealed_batch(valid: &[bool]) -> Batch {
        let mut batch = Batch::open(BatchId(1), Utc::now());
        for (i, ok) in valid.iter().enumerate() {
            let committed = CommittedTransaction {
                commitment: sha256(format!("c{i}").as_bytes()),
                nullifier: sha256(format!("n{i}").as_bytes()),
                range_proof: RangeProof::from_bytes(vec![*ok as u8, i as u8]),
            };
            batch
                .push(Transaction::from_committed(i as u64, committed, Utc::now()), Utc::now())
                .unwrap();
        }
        batch.seal(Utc::now()).unwrap();
        batch
    }

    #[test]
    fn valid_batch_should_be_approved() {
        let oracle = IndependentVerifier::new(Arc::new(FlagVerifier));
        assert_eq!(oracle.ground_truth(&sealed_batch(&[true, true, true])), Decision::Approve);
    }

    #[test]
    fn one_bad_proof_makes_batch_rejectable() {
        let oracle = IndependentVerifier::new(Arc::new(FlagVerifier));
        assert_eq!(oracle.ground_truth(&sealed_batch(&[true, false])), Decision::Reject);
    }

    #[test]
    fn tampered_root_detected() {
        let oracle = IndependentVerifier::new(Arc::new(FlagVerifier));
        let mut batch = sealed_batch(&[true, true]);
        batch.merkle_root = Some(sha256(b"forged"));
        assert_eq!(oracle.ground_truth(&batch), Decision::Reject);
    }
}
