//! # Transaction Pool
//!
//! Sequencing and batch formation. The pool owns the single open batch and
//! the two counters that must never skip or repeat: the next sequence
//! number and the next batch id. All three sit behind one mutex so
//! concurrent submitters get gap-free, strictly increasing numbers.
//!
//! A transaction is assigned a number only after its range proof verifies;
//! a rejected submission consumes nothing. The open batch seals when it
//! reaches capacity or, via [`TransactionPool::seal_due`], when its time
//! window has elapsed since its first transaction.
//!
//! Every batch the pool changes is handed to the checkpoint hook while the
//! pool lock is still held, so a persisted open batch is never older than
//! an acknowledged submission and snapshots reach the hook in order.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::Batch;
use crate::commitment::{CommittedTransaction, Transaction, TransactionState};
use crate::error::{CoreError, CoreResult};
use crate::types::{BatchId, Digest};
use crate::zkp::RangeVerifier;

/// Result of a successful submission.
#[derive(Debug)]
pub struct Submission {
    pub sequence_number: u64,
    pub transaction_hash: Digest,
    /// The batch this submission filled up, if any.
    pub sealed: Option<Batch>,
}

/// Called with every batch the pool changes, under the pool lock.
pub type Checkpoint = Box<dyn Fn(&Batch) + Send + Sync>;

struct PoolInner {
    next_sequence: u64,
    next_batch: u64,
    open: Batch,
}

impl PoolInner {
    /// Seal the open batch and start a fresh one.
    fn rotate(&mut self, now: DateTime<Utc>) -> CoreResult<Batch> {
        let id = BatchId(self.next_batch);
        self.next_batch += 1;
        let mut sealed = std::mem::replace(&mut self.open, Batch::open(id, now));
        sealed.seal(now)?;
        info!(
            batch = %sealed.id,
            transactions = sealed.len(),
            root = ?sealed.merkle_root,
            "batch sealed"
        );
        Ok(sealed)
    }
}

pub struct TransactionPool {
    capacity: usize,
    window: chrono::Duration,
    inner: Mutex<PoolInner>,
    checkpoint: Option<Checkpoint>,
}

impl TransactionPool {
    pub fn new(capacity: usize, window: std::time::Duration, now: DateTime<Utc>) -> Self {
        Self::resume(capacity, window, 0, 0, None, now)
    }

    /// Continue numbering from persisted counters. `next_batch` is the
    /// lowest id no persisted batch uses; a restored `open` batch keeps its
    /// own id and transactions.
    pub fn resume(
        capacity: usize,
        window: std::time::Duration,
        next_sequence: u64,
        next_batch: u64,
        open: Option<Batch>,
        now: DateTime<Utc>,
    ) -> Self {
        let window = chrono::Duration::milliseconds(window.as_millis().min(i64::MAX as u128) as i64);
        let inner = match open {
            Some(open) => {
                info!(batch = %open.id, transactions = open.len(), "open batch restored");
                PoolInner {
                    next_sequence,
                    next_batch: next_batch.max(open.id.0 + 1),
                    open,
                }
            }
            None => PoolInner {
                next_sequence,
                next_batch: next_batch + 1,
                open: Batch::open(BatchId(next_batch), now),
            },
        };
        Self {
            capacity: capacity.max(1),
            window,
            inner: Mutex::new(inner),
            checkpoint: None,
        }
    }

    /// Install the hook that persists batches as the pool changes them.
    pub fn with_checkpoint(mut self, checkpoint: Checkpoint) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    fn save(&self, batch: &Batch) {
        if let Some(checkpoint) = &self.checkpoint {
            checkpoint(batch);
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of transactions in the open batch.
    pub fn pending(&self) -> usize {
        self.inner.lock().open.len()
    }

    pub fn next_sequence(&self) -> u64 {
        self.inner.lock().next_sequence
    }

    /// Verify, sequence and enqueue one transaction.
    pub fn submit(
        &self,
        committed: CommittedTransaction,
        verifier: &dyn RangeVerifier,
        now: DateTime<Utc>,
    ) -> CoreResult<Submission> {
        if !committed.verify_proof(verifier) {
            warn!(commitment = %committed.commitment, "range proof rejected at submission");
            return Err(CoreError::ProofVerificationFailure(format!(
                "range proof for commitment {}",
                committed.commitment
            )));
        }
        let transaction_hash = committed.hash();

        let mut inner = self.inner.lock();
        let sequence_number = inner.next_sequence;
        let tx = Transaction::from_committed(sequence_number, committed, now);
        inner.open.push(tx, now)?;
        inner.next_sequence += 1;
        debug!(sequence_number, hash = %transaction_hash, "transaction sequenced");

        let sealed = if inner.open.len() >= self.capacity {
            let sealed = inner.rotate(now)?;
            self.save(&sealed);
            Some(sealed)
        } else {
            self.save(&inner.open);
            None
        };
        Ok(Submission {
            sequence_number,
            transaction_hash,
            sealed,
        })
    }

    /// Seal the open batch if it is non-empty and its window has elapsed.
    pub fn seal_due(&self, now: DateTime<Utc>) -> CoreResult<Option<Batch>> {
        let mut inner = self.inner.lock();
        if inner.open.is_empty() || now - inner.open.opened_at < self.window {
            return Ok(None);
        }
        let sealed = inner.rotate(now)?;
        self.save(&sealed);
        Ok(Some(sealed))
    }

    /// Seal whatever is open, regardless of the window.
    pub fn flush(&self, now: DateTime<Utc>) -> CoreResult<Option<Batch>> {
        let mut inner = self.inner.lock();
        if inner.open.is_empty() {
            return Ok(None);
        }
        let sealed = inner.rotate(now)?;
        self.save(&sealed);
        Ok(Some(sealed))
    }

    /// Return transactions of a rejected batch to the open pool. Sequence
    /// numbers are kept. Returns any batches that filled up on the way.
    pub fn requeue(
        &self,
        transactions: Vec<Transaction>,
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<Batch>> {
        let count = transactions.len();
        let mut inner = self.inner.lock();
        let mut sealed = Vec::new();
        for mut tx in transactions {
            tx.batch_id = None;
            tx.state = TransactionState::Created;
            inner.open.push(tx, now)?;
            if inner.open.len() >= self.capacity {
                let batch = inner.rotate(now)?;
                self.save(&batch);
                sealed.push(batch);
            }
        }
        if !inner.open.is_empty() {
            self.save(&inner.open);
        }
        info!(count, open_batch = %inner.open.id, "transactions requeued");
        Ok(sealed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchState;
    use crate::crypto::hash::sha256;
    use crate::zkp::RangeProof;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    /// Accepts any proof whose first byte is 1.
    struct FlagVerifier;

    impl RangeVerifier for FlagVerifier {
        fn verify(&self, proof: &RangeProof, _context: &[u8]) -> bool {
            proof.as_bytes().first() == Some(&1)
        }
    }

    fn committed(tag: u32, valid: bool) -> CommittedTransaction {
        CommittedTransaction {
            commitment: sha256(format!("c{tag}").as_bytes()),
            nullifier: sha256(format!("n{tag}").as_bytes()),
            range_proof: RangeProof::from_bytes(vec![valid as u8, tag as u8]),
        }
    }

    #[test]
    fn seals_at_capacity() {
        let now = Utc::now();
        let pool = TransactionPool::new(3, Duration::from_secs(30), now);
        assert!(pool.submit(committed(0, true), &FlagVerifier, now).unwrap().sealed.is_none());
        assert!(pool.submit(committed(1, true), &FlagVerifier, now).unwrap().sealed.is_none());
        let third = pool.submit(committed(2, true), &FlagVerifier, now).unwrap();
        let batch = third.sealed.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.sequence_range, Some((0, 2)));
        assert_eq!(pool.pending(), 0);
    }

    #[test]
    fn invalid_proof_consumes_no_sequence_number() {
        let now = Utc::now();
        let pool = TransactionPool::new(10, Duration::from_secs(30), now);
        pool.submit(committed(0, true), &FlagVerifier, now).unwrap();
        assert!(matches!(
            pool.submit(committed(1, false), &FlagVerifier, now),
            Err(CoreError::ProofVerificationFailure(_))
        ));
        let next = pool.submit(committed(2, true), &FlagVerifier, now).unwrap();
        assert_eq!(next.sequence_number, 1);
    }

    #[test]
    fn time_window_seals_partial_batch() {
        let now = Utc::now();
        let pool = TransactionPool::new(100, Duration::from_secs(30), now);
        pool.submit(committed(0, true), &FlagVerifier, now).unwrap();
        assert!(pool.seal_due(now + chrono::Duration::seconds(29)).unwrap().is_none());
        let batch = pool.seal_due(now + chrono::Duration::seconds(30)).unwrap().unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn empty_batch_never_seals() {
        let now = Utc::now();
        let pool = TransactionPool::new(100, Duration::from_secs(1), now);
        assert!(pool.seal_due(now + chrono::Duration::hours(1)).unwrap().is_none());
        assert!(pool.flush(now).unwrap().is_none());
    }

    #[test]
    fn batch_ids_increase() {
        let now = Utc::now();
        let pool = TransactionPool::new(1, Duration::from_secs(30), now);
        let a = pool.submit(committed(0, true), &FlagVerifier, now).unwrap().sealed.unwrap();
        let b = pool.submit(committed(1, true), &FlagVerifier, now).unwrap().sealed.unwrap();
        assert!(b.id > a.id);
    }

    #[test]
    fn requeue_keeps_sequence_numbers() {
        let now = Utc::now();
        let pool = TransactionPool::new(3, Duration::from_secs(30), now);
        let mut sealed = None;
        for i in 0..3 {
            sealed = pool.submit(committed(i, true), &FlagVerifier, now).unwrap().sealed;
        }
        let rejected = sealed.unwrap();
        pool.submit(committed(9, true), &FlagVerifier, now).unwrap();

        let refilled = pool.requeue(rejected.transactions.clone(), now).unwrap();
        assert_eq!(refilled.len(), 1);
        let seqs: Vec<_> = refilled[0].transactions.iter().map(|t| t.sequence_number).collect();
        assert_eq!(seqs, vec![0, 1, 3]);
        assert_ne!(refilled[0].id, rejected.id);
        assert_eq!(pool.next_sequence(), 4);
    }

    #[test]
    fn checkpoint_sees_open_and_sealed_batches() {
        let now = Utc::now();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let log = seen.clone();
        let pool = TransactionPool::new(2, Duration::from_secs(30), now).with_checkpoint(
            Box::new(move |b: &Batch| log.lock().push((b.id, b.state, b.len()))),
        );
        pool.submit(committed(0, true), &FlagVerifier, now).unwrap();
        pool.submit(committed(1, true), &FlagVerifier, now).unwrap();
        pool.submit(committed(2, true), &FlagVerifier, now).unwrap();

        assert_eq!(
            *seen.lock(),
            vec![
                (BatchId(0), BatchState::Open, 1),
                (BatchId(0), BatchState::Sealed, 2),
                (BatchId(1), BatchState::Open, 1),
            ]
        );
    }

    #[test]
    fn resumed_open_batch_keeps_its_transactions() {
        let now = Utc::now();
        let first = TransactionPool::new(10, Duration::from_secs(30), now);
        first.submit(committed(0, true), &FlagVerifier, now).unwrap();
        let snapshot = first.inner.lock().open.clone();

        let pool = TransactionPool::resume(10, Duration::from_secs(30), 1, 1, Some(snapshot), now);
        assert_eq!(pool.pending(), 1);
        let next = pool.submit(committed(1, true), &FlagVerifier, now).unwrap();
        assert_eq!(next.sequence_number, 1);

        let batch = pool.flush(now).unwrap().unwrap();
        assert_eq!(batch.id, BatchId(0));
        assert_eq!(batch.sequence_range, Some((0, 1)));
        let after = pool.submit(committed(2, true), &FlagVerifier, now).unwrap();
        assert_eq!(after.sequence_number, 2);
        assert_eq!(pool.flush(now).unwrap().unwrap().id, BatchId(1));
    }

    #[test]
    fn concurrent_submitters_get_gap_free_numbers() {
        let now = Utc::now();
        let pool = Arc::new(TransactionPool::new(1_000, Duration::from_secs(30), now));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    (0..25)
                        .map(|i| {
                            pool.submit(committed(t * 100 + i, true), &FlagVerifier, now)
                                .unwrap()
                                .sequence_number
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let seen: HashSet<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(seen.len(), 200);
        assert_eq!(seen.iter().max(), Some(&199));
    }
}
