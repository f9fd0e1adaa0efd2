//! # Batches
//!
//! ```text
//! merkle.rs — integrity tree and inclusion proofs
//! pool.rs   — sequencing, capacity/time sealing, requeue
//! ```
//!
//! ## Lifecycle
//!
//! ```text
//! OPEN ──seal──► SEALED ──► VOTING ──┬──► APPROVED ──► SETTLED
//!                                    │        │
//!                                    └────────┴──► REJECTED
//! ```
//!
//! `APPROVED → REJECTED` only happens when settlement finds a double spend.
//! A rejected batch is terminal; its transactions live on in a new batch
//! with their original sequence numbers.

pub mod merkle;
pub mod pool;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::commitment::{Transaction, TransactionState};
use crate::consensus::vote::Ballot;
use crate::error::{CoreError, CoreResult};
use crate::types::{BatchId, Digest};

pub use merkle::{verify_inclusion, InclusionProof, MerkleTree};
pub use pool::{Submission, TransactionPool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatchState {
    Open,
    Sealed,
    Voting,
    Approved,
    Rejected,
    Settled,
}

impl BatchState {
    fn can_move_to(self, next: BatchState) -> bool {
        use BatchState::*;
        matches!(
            (self, next),
            (Open, Sealed)
                | (Sealed, Voting)
                | (Voting, Approved)
                | (Voting, Rejected)
                | (Approved, Settled)
                | (Approved, Rejected)
        )
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Open => "OPEN",
            Self::Sealed => "SEALED",
            Self::Voting => "VOTING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Settled => "SETTLED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub state: BatchState,
    pub transactions: Vec<Transaction>,
    /// Inclusive `[first, last]` sequence numbers, set on sealing.
    pub sequence_range: Option<(u64, u64)>,
    pub merkle_root: Option<Digest>,
    pub ballot: Option<Ballot>,
    pub opened_at: DateTime<Utc>,
    pub sealed_at: Option<DateTime<Utc>>,
    pub settled_at: Option<DateTime<Utc>>,
    /// Set when settlement found a double spend.
    pub flagged: bool,
    /// Set once the batch has been sampled by independent re-verification.
    pub reverified: bool,
}

impl Batch {
    pub(crate) fn open(id: BatchId, at: DateTime<Utc>) -> Self {
        Self {
            id,
            state: BatchState::Open,
            transactions: Vec::new(),
            sequence_range: None,
            merkle_root: None,
            ballot: None,
            opened_at: at,
            sealed_at: None,
            settled_at: None,
            flagged: false,
            reverified: false,
        }
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Transaction hashes in batch order.
    pub fn leaves(&self) -> Vec<Digest> {
        self.transactions.iter().map(Transaction::hash).collect()
    }

    /// Rebuild the tree. Always reproduces `merkle_root` for a sealed batch.
    pub fn tree(&self) -> CoreResult<MerkleTree> {
        MerkleTree::seal(&self.leaves())
    }

    pub fn prove_inclusion(&self, index: usize) -> CoreResult<InclusionProof> {
        self.tree()?.prove_inclusion(index)
    }

    pub(crate) fn push(&mut self, mut tx: Transaction, at: DateTime<Utc>) -> CoreResult<()> {
        if self.state != BatchState::Open {
            return Err(CoreError::InvalidState(format!(
                "{} is {}, not accepting transactions",
                self.id, self.state
            )));
        }
        if self.transactions.is_empty() {
            self.opened_at = at;
        }
        tx.batch_id = Some(self.id);
        tx.state = TransactionState::Batched;
        self.transactions.push(tx);
        Ok(())
    }

    pub(crate) fn seal(&mut self, at: DateTime<Utc>) -> CoreResult<()> {
        self.transactions.sort_by_key(|tx| tx.sequence_number);
        let tree = self.tree()?;
        self.transition(BatchState::Sealed)?;
        self.merkle_root = Some(tree.root());
        self.sequence_range = match (self.transactions.first(), self.transactions.last()) {
            (Some(first), Some(last)) => Some((first.sequence_number, last.sequence_number)),
            _ => None,
        };
        self.sealed_at = Some(at);
        Ok(())
    }

    /// Move along a lifecycle edge, keeping transaction states in step.
    pub(crate) fn transition(&mut self, next: BatchState) -> CoreResult<()> {
        if !self.state.can_move_to(next) {
            return Err(CoreError::InvalidState(format!(
                "{} cannot move from {} to {}",
                self.id, self.state, next
            )));
        }
        self.state = next;
        let tx_state = match next {
            BatchState::Voting => Some(TransactionState::Voting),
            BatchState::Approved => Some(TransactionState::Approved),
            BatchState::Rejected => Some(TransactionState::Rejected),
            _ => None,
        };
        if let Some(tx_state) = tx_state {
            for tx in &mut self.transactions {
                tx.state = tx_state;
            }
        }
        Ok(())
    }

    /// Recompute the root and compare with the sealed one.
    pub fn root_matches(&self) -> bool {
        match (self.merkle_root, self.tree()) {
            (Some(root), Ok(tree)) => tree.root() == root,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitment::CommittedTransaction;
    use crate::crypto::hash::sha256;
    use crate::zkp::RangeProof;

    fn tx(seq: u64) -> Transaction {
        let committed = CommittedTransaction {
            commitment: sha256(format!("c{seq}").as_bytes()),
            nullifier: sha256(format!("n{seq}").as_bytes()),
            range_proof: RangeProof::from_bytes(vec![seq as u8; 8]),
        };
        Transaction::from_committed(seq, committed, Utc::now())
    }

    #[test]
    fn sealing_orders_by_sequence_and_sets_range() {
        let mut batch = Batch::open(BatchId(0), Utc::now());
        for seq in [5, 2, 9] {
            batch.push(tx(seq), Utc::now()).unwrap();
        }
        batch.seal(Utc::now()).unwrap();
        let order: Vec<_> = batch.transactions.iter().map(|t| t.sequence_number).collect();
        assert_eq!(order, vec![2, 5, 9]);
        assert_eq!(batch.sequence_range, Some((2, 9)));
        assert!(batch.root_matches());
        assert!(batch
            .transactions
            .iter()
            .all(|t| t.batch_id == Some(BatchId(0)) && t.state == TransactionState::Batched));
    }

    #[test]
    fn sealed_batch_refuses_new_transactions() {
        let mut batch = Batch::open(BatchId(0), Utc::now());
        batch.push(tx(1), Utc::now()).unwrap();
        batch.seal(Utc::now()).unwrap();
        assert!(matches!(
            batch.push(tx(2), Utc::now()),
            Err(CoreError::InvalidState(_))
        ));
    }

    #[test]
    fn illegal_edges_refused() {
        let mut batch = Batch::open(BatchId(0), Utc::now());
        assert!(batch.transition(BatchState::Approved).is_err());
        batch.push(tx(1), Utc::now()).unwrap();
        batch.seal(Utc::now()).unwrap();
        assert!(batch.transition(BatchState::Settled).is_err());
        batch.transition(BatchState::Voting).unwrap();
        batch.transition(BatchState::Rejected).unwrap();
        assert!(batch.transition(BatchState::Settled).is_err());
    }

    #[test]
    fn transaction_states_follow_batch() {
        let mut batch = Batch::open(BatchId(0), Utc::now());
        batch.push(tx(1), Utc::now()).unwrap();
        batch.seal(Utc::now()).unwrap();
        batch.transition(BatchState::Voting).unwrap();
        assert_eq!(batch.transactions[0].state, TransactionState::Voting);
        batch.transition(BatchState::Approved).unwrap();
        assert_eq!(batch.transactions[0].state, TransactionState::Approved);
    }

    #[test]
    fn inclusion_proofs_verify_against_sealed_root() {
        let mut batch = Batch::open(BatchId(3), Utc::now());
        for seq in 0..7 {
            batch.push(tx(seq), Utc::now()).unwrap();
        }
        batch.seal(Utc::now()).unwrap();
        let root = batch.merkle_root.unwrap();
        for (i, t) in batch.transactions.iter().enumerate() {
            let proof = batch.prove_inclusion(i).unwrap();
            assert!(verify_inclusion(&t.hash(), &proof, &root));
        }
    }
}
