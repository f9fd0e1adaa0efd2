//! # Consensus Engine
//!
//! Drives batches and freeze proposals through their state machines,
//! tallies anonymous ballots, settles nullifiers, executes freezes and runs
//! the slashing/treasury economy.
//!
//! ## Locking
//!
//! Every batch and every proposal sits behind its own mutex; every account
//! gets a mutex the first time a proposal targets it. Nothing locks across
//! unrelated batches or accounts. Shared sets are taken strictly inside
//! those scopes and always in this order:
//!
//! ```text
//! batch     → nullifiers | members → treasury
//! proposal  → account → frozen
//! ```
//!
//! ## Side effects
//!
//! Persistence and audit calls never roll back a decision. A failed write
//! is logged and the in-memory state stays authoritative; [`recover`]
//! rebuilds from whatever did reach the store.
//!
//! [`recover`]: ConsensusEngine::recover

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::freeze::{FreezeAction, FreezeApproval, FreezeProposal, ProposalState};
use super::member::ConsortiumMember;
use super::reverify::{BatchReview, IndependentVerifier, ReverificationReport};
use super::slashing::{SlashOutcome, Treasury, TreasuryEntry};
use super::vote::{Ballot, BallotSubject, OpenBallot, Tally, Vote};
use crate::accumulator::{
    Accumulator, AccumulatorKind, AccumulatorState, Admission, FreezeAccumulator,
    NullifierAccumulator,
};
use crate::batch::{Batch, BatchState, Submission, TransactionPool};
use crate::collab::{AuditSink, Clock, Entity, Persistence};
use crate::commitment::{CommittedTransaction, Transaction};
use crate::config::{quorum_threshold, ProtocolConfig, MAX_FIELD_LENGTH};
use crate::error::{CoreError, CoreResult};
use crate::group::{self, GroupAuthority, OpenerKey, RoundId};
use crate::types::{AccountId, BatchId, Digest, MemberId, ProposalId};
use crate::zkp::RangeVerifier;

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// External collaborators the engine reports to.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn Persistence>,
    pub audit: Arc<dyn AuditSink>,
    pub clock: Arc<dyn Clock>,
}

/// A transaction held back for investigation after a double spend.
#[derive(Debug, Clone)]
pub struct Investigation {
    pub batch: BatchId,
    pub transaction: Transaction,
    pub flagged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub batch: BatchId,
    /// Nullifiers newly admitted by this call.
    pub admitted: usize,
    pub already_settled: bool,
}

/// Indices of transactions whose nullifier is already spent by another
/// transaction, or repeats inside the batch.
fn colliding(
    transactions: &[Transaction],
    bindings: &[Digest],
    spent: &NullifierAccumulator,
) -> Vec<usize> {
    let mut counts: HashMap<Digest, usize> = HashMap::new();
    for tx in transactions {
        *counts.entry(tx.nullifier).or_default() += 1;
    }
    transactions
        .iter()
        .zip(bindings)
        .enumerate()
        .filter(|(_, (tx, binding))| {
            counts[&tx.nullifier] > 1 || spent.check(&tx.nullifier, binding).is_err()
        })
        .map(|(i, _)| i)
        .collect()
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct ConsensusEngine {
    config: ProtocolConfig,
    group: Arc<GroupAuthority>,
    verifier: Arc<dyn RangeVerifier>,
    store: Arc<dyn Persistence>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    pool: TransactionPool,
    batches: DashMap<BatchId, Arc<Mutex<Batch>>>,
    proposals: DashMap<ProposalId, Arc<Mutex<FreezeProposal>>>,
    account_locks: DashMap<AccountId, Arc<Mutex<()>>>,
    members: RwLock<BTreeMap<MemberId, ConsortiumMember>>,
    nullifiers: Mutex<NullifierAccumulator>,
    frozen: Mutex<FreezeAccumulator>,
    treasury: Mutex<Treasury>,
    investigations: Mutex<Vec<Investigation>>,
    next_round: AtomicU64,
    next_proposal: AtomicU64,
}

impl ConsensusEngine {
    /// Start a fresh consortium. Every member must be enrolled in `group`.
    pub fn new(
        config: ProtocolConfig,
        members: Vec<ConsortiumMember>,
        group: Arc<GroupAuthority>,
        verifier: Arc<dyn RangeVerifier>,
        collab: Collaborators,
    ) -> CoreResult<Self> {
        if members.is_empty() {
            return Err(CoreError::MalformedInput("consortium has no members".into()));
        }
        if let Some(stranger) = members.iter().find(|m| !group.is_enrolled(&m.id)) {
            return Err(CoreError::MalformedInput(format!(
                "{} is not enrolled in the group",
                stranger.id
            )));
        }

        let now = collab.clock.now();
        let engine = Self::assemble(
            config,
            group,
            verifier,
            collab,
            members,
            NullifierAccumulator::new(),
            FreezeAccumulator::new(),
            Treasury::new(),
            (0, 0),
            None,
            now,
        );
        for member in engine.members.read().values() {
            engine.persist(Entity::Member(member.clone()));
        }
        info!(
            members = engine.members.read().len(),
            quorum = quorum_threshold(engine.active_count()),
            batch_capacity = engine.config.batch_capacity,
            "consensus engine started"
        );
        Ok(engine)
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        config: ProtocolConfig,
        group: Arc<GroupAuthority>,
        verifier: Arc<dyn RangeVerifier>,
        collab: Collaborators,
        members: Vec<ConsortiumMember>,
        nullifiers: NullifierAccumulator,
        frozen: FreezeAccumulator,
        treasury: Treasury,
        (next_sequence, next_batch): (u64, u64),
        open: Option<Batch>,
        now: DateTime<Utc>,
    ) -> Self {
        let store = collab.store.clone();
        let pool = TransactionPool::resume(
            config.batch_capacity,
            config.batch_window(),
            next_sequence,
            next_batch,
            open,
            now,
        )
        .with_checkpoint(Box::new(move |batch: &Batch| {
            if let Err(e) = store.persist(&Entity::Batch(batch.clone())) {
                error!(batch = %batch.id, error = %e, "pool checkpoint failed; continuing");
            }
        }));
        Self {
            config,
            group,
            verifier,
            store: collab.store,
            audit: collab.audit,
            clock: collab.clock,
            pool,
            batches: DashMap::new(),
            proposals: DashMap::new(),
            account_locks: DashMap::new(),
            members: RwLock::new(members.into_iter().map(|m| (m.id.clone(), m)).collect()),
            nullifiers: Mutex::new(nullifiers),
            frozen: Mutex::new(frozen),
            treasury: Mutex::new(treasury),
            investigations: Mutex::new(Vec::new()),
            next_round: AtomicU64::new(1),
            next_proposal: AtomicU64::new(1),
        }
    }

    /// Rebuild from the persistence collaborator and replay settlement for
    /// every batch that reached APPROVED but not SETTLED.
    pub fn recover(
        config: ProtocolConfig,
        group: Arc<GroupAuthority>,
        verifier: Arc<dyn RangeVerifier>,
        collab: Collaborators,
    ) -> CoreResult<Self> {
        let store = collab.store.clone();
        let members = store.load_members()?;
        if members.is_empty() {
            return Err(CoreError::NotFound("persisted consortium members".into()));
        }

        let nullifiers = NullifierAccumulator::restore(
            store
                .load_accumulator_state(AccumulatorKind::Nullifier)?
                .unwrap_or_else(|| AccumulatorState::genesis(AccumulatorKind::Nullifier)),
            &store.load_accumulator_log(AccumulatorKind::Nullifier)?,
        )?;
        let frozen = FreezeAccumulator::restore(
            store
                .load_accumulator_state(AccumulatorKind::Freeze)?
                .unwrap_or_else(|| AccumulatorState::genesis(AccumulatorKind::Freeze)),
            &store.load_accumulator_log(AccumulatorKind::Freeze)?,
        )?;
        let treasury = Treasury::from_entries(store.load_treasury()?);
        let mut batches = store.load_batches()?;
        let proposals = store.load_proposals()?;

        let next_sequence = batches
            .iter()
            .flat_map(|b| b.transactions.iter())
            .map(|tx| tx.sequence_number + 1)
            .max()
            .unwrap_or(0);
        let next_batch = batches.iter().map(|b| b.id.0 + 1).max().unwrap_or(0);
        let last_round = batches
            .iter()
            .filter_map(|b| b.ballot.as_ref())
            .chain(proposals.iter().filter_map(|p| p.ballot.as_ref()))
            .map(|b| b.round.0)
            .max()
            .unwrap_or(0);
        let last_proposal = proposals.iter().map(|p| p.id.0).max().unwrap_or(0);

        // Only the newest open batch goes back to the pool. An older one can
        // only be left by a failed checkpoint; its transactions are requeued
        // like a rejected batch's.
        let open_id = batches
            .iter()
            .filter(|b| b.state == BatchState::Open)
            .map(|b| b.id)
            .max();
        let open = open_id
            .and_then(|id| batches.iter().position(|b| b.id == id))
            .map(|i| batches.swap_remove(i));

        let now = collab.clock.now();
        let engine = Self::assemble(
            config,
            group,
            verifier,
            collab,
            members,
            nullifiers,
            frozen,
            treasury,
            (next_sequence, next_batch),
            open.clone(),
            now,
        );
        engine.next_round.store(last_round + 1, Ordering::SeqCst);
        engine.next_proposal.store(last_proposal + 1, Ordering::SeqCst);

        for member in engine.members.read().values().filter(|m| !m.active) {
            if let Err(e) = engine.group.revoke(&member.id) {
                warn!(member = %member.id, error = %e, "inactive member not known to group");
            }
        }

        let mut live: HashSet<u64> = open
            .iter()
            .flat_map(|b| b.transactions.iter().map(|tx| tx.sequence_number))
            .collect();
        let mut orphans: BTreeMap<u64, (BatchId, Transaction)> = BTreeMap::new();
        let mut approved = Vec::new();
        let (stale, batches): (Vec<Batch>, Vec<Batch>) = batches
            .into_iter()
            .partition(|b| b.state == BatchState::Open);
        for batch in &stale {
            for tx in &batch.transactions {
                orphans.insert(tx.sequence_number, (batch.id, tx.clone()));
            }
        }
        for batch in &batches {
            if batch.state == BatchState::Rejected {
                for tx in &batch.transactions {
                    orphans.insert(tx.sequence_number, (batch.id, tx.clone()));
                }
            } else {
                live.extend(batch.transactions.iter().map(|tx| tx.sequence_number));
            }
            if batch.state == BatchState::Approved {
                approved.push(batch.id);
            }
            if let Some(ballot) = batch.ballot.as_ref().filter(|_| batch.state == BatchState::Voting) {
                engine.group.open_round(ballot.round)?;
            }
        }
        for batch in batches {
            engine
                .batches
                .insert(batch.id, Arc::new(Mutex::new(batch)));
        }
        for proposal in proposals {
            if let Some(ballot) = proposal
                .ballot
                .as_ref()
                .filter(|_| proposal.state == ProposalState::Voting)
            {
                engine.group.open_round(ballot.round)?;
            }
            engine
                .proposals
                .insert(proposal.id, Arc::new(Mutex::new(proposal)));
        }

        orphans.retain(|seq, _| !live.contains(seq));
        if !orphans.is_empty() {
            let (ids, txs): (Vec<BatchId>, Vec<Transaction>) = orphans.into_values().unzip();
            let bindings: Vec<Digest> = txs.iter().map(Transaction::settlement_binding).collect();
            let flagged: HashSet<usize> =
                colliding(&txs, &bindings, &engine.nullifiers.lock()).into_iter().collect();
            let mut clean = Vec::new();
            let mut held = engine.investigations.lock();
            for (i, (tx, batch)) in txs.into_iter().zip(ids).enumerate() {
                if flagged.contains(&i) {
                    held.push(Investigation {
                        batch,
                        transaction: tx,
                        flagged_at: now,
                    });
                } else {
                    clean.push(tx);
                }
            }
            drop(held);
            info!(requeued = clean.len(), "requeueing transactions of rejected batches");
            for sealed in engine.pool.requeue(clean, now)? {
                engine.register(sealed);
            }
        }

        for id in approved {
            match engine.settle(id) {
                Ok(s) => info!(batch = %id, admitted = s.admitted, "settlement replayed"),
                Err(e) => warn!(batch = %id, error = %e, "settlement replay failed"),
            }
        }

        info!(
            batches = engine.batches.len(),
            proposals = engine.proposals.len(),
            nullifiers = engine.nullifiers.lock().len(),
            frozen = engine.frozen.lock().len(),
            "consensus engine recovered"
        );
        Ok(engine)
    }

    // -----------------------------------------------------------------------
    // Side effects
    // -----------------------------------------------------------------------

    fn persist(&self, entity: Entity) {
        if let Err(e) = self.store.persist(&entity) {
            error!(key = %entity.key(), error = %e, "persistence failed; continuing");
        }
    }

    fn record(&self, event_type: &str, data: serde_json::Value) {
        self.audit.record(event_type, data, self.clock.now());
    }

    fn register(&self, batch: Batch) -> BatchId {
        let id = batch.id;
        self.persist(Entity::Batch(batch.clone()));
        self.batches.insert(id, Arc::new(Mutex::new(batch)));
        id
    }

    fn batch_handle(&self, id: BatchId) -> CoreResult<Arc<Mutex<Batch>>> {
        self.batches
            .get(&id)
            .map(|b| b.clone())
            .ok_or_else(|| CoreError::NotFound(id.to_string()))
    }

    fn proposal_handle(&self, id: ProposalId) -> CoreResult<Arc<Mutex<FreezeProposal>>> {
        self.proposals
            .get(&id)
            .map(|p| p.clone())
            .ok_or_else(|| CoreError::NotFound(id.to_string()))
    }

    fn account_lock(&self, account: &AccountId) -> Arc<Mutex<()>> {
        self.account_locks
            .entry(account.clone())
            .or_default()
            .clone()
    }

    fn open_ballot(&self, subject: BallotSubject) -> CoreResult<(Ballot, OpenBallot)> {
        let round = RoundId(self.next_round.fetch_add(1, Ordering::SeqCst));
        let roster = self.group.open_round(round)?;
        let now = self.clock.now();
        let window = chrono::Duration::milliseconds(self.config.vote_window_ms as i64);
        let ballot = Ballot::new(round, subject.clone(), now, now + window);
        let open = OpenBallot {
            round,
            subject,
            roster,
            closes_at: ballot.closes_at,
        };
        Ok((ballot, open))
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn group(&self) -> &Arc<GroupAuthority> {
        &self.group
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn active_count(&self) -> usize {
        self.members.read().values().filter(|m| m.active).count()
    }

    pub fn active_members(&self) -> Vec<MemberId> {
        self.members
            .read()
            .values()
            .filter(|m| m.active)
            .map(|m| m.id.clone())
            .collect()
    }

    pub fn member(&self, id: &MemberId) -> Option<ConsortiumMember> {
        self.members.read().get(id).cloned()
    }

    pub fn members(&self) -> Vec<ConsortiumMember> {
        self.members.read().values().cloned().collect()
    }

    pub fn batch(&self, id: BatchId) -> Option<Batch> {
        self.batches.get(&id).map(|b| b.lock().clone())
    }

    /// Ids of every known batch, ascending.
    pub fn batch_ids(&self) -> Vec<BatchId> {
        let mut ids: Vec<_> = self.batches.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    pub fn proposal(&self, id: ProposalId) -> Option<FreezeProposal> {
        self.proposals.get(&id).map(|p| p.lock().clone())
    }

    pub fn pending(&self) -> usize {
        self.pool.pending()
    }

    pub fn is_spent(&self, nullifier: &Digest) -> bool {
        self.nullifiers.lock().contains(nullifier)
    }

    pub fn nullifier_state(&self) -> AccumulatorState {
        self.nullifiers.lock().state()
    }

    pub fn freeze_state(&self) -> AccumulatorState {
        self.frozen.lock().state()
    }

    pub fn is_frozen(&self, account: &AccountId) -> bool {
        self.frozen.lock().is_frozen(account)
    }

    pub fn treasury_balance(&self) -> u64 {
        self.treasury.lock().balance()
    }

    pub fn treasury_entries(&self) -> Vec<TreasuryEntry> {
        self.treasury.lock().entries().to_vec()
    }

    pub fn investigations(&self) -> Vec<Investigation> {
        self.investigations.lock().clone()
    }

    // -----------------------------------------------------------------------
    // Intake
    // -----------------------------------------------------------------------

    /// Verify and sequence a transaction; registers the batch it seals.
    pub fn submit(&self, committed: CommittedTransaction) -> CoreResult<Submission> {
        let submission = self
            .pool
            .submit(committed, self.verifier.as_ref(), self.clock.now())?;
        if let Some(batch) = &submission.sealed {
            self.register(batch.clone());
        }
        Ok(submission)
    }

    /// Seal the open batch if its time window has elapsed.
    pub fn seal_due(&self) -> CoreResult<Option<BatchId>> {
        Ok(self
            .pool
            .seal_due(self.clock.now())?
            .map(|b| self.register(b)))
    }

    /// Seal whatever is open.
    pub fn flush(&self) -> CoreResult<Option<BatchId>> {
        Ok(self.pool.flush(self.clock.now())?.map(|b| self.register(b)))
    }

    // -----------------------------------------------------------------------
    // Batch voting
    // -----------------------------------------------------------------------

    /// SEALED → VOTING. Publishes a fresh roster for the ballot.
    pub fn begin_voting(&self, id: BatchId) -> CoreResult<OpenBallot> {
        let handle = self.batch_handle(id)?;
        let mut batch = handle.lock();
        let merkle_root = batch
            .merkle_root
            .ok_or_else(|| CoreError::InvalidState(format!("{id} has no merkle root")))?;
        batch.transition(BatchState::Voting)?;

        let (ballot, open) = self.open_ballot(BallotSubject::Batch { id, merkle_root })?;
        batch.ballot = Some(ballot);
        self.persist(Entity::Batch(batch.clone()));
        debug!(batch = %id, round = %open.round, roster = open.roster.len(), "batch voting opened");
        Ok(open)
    }

    pub fn cast_vote(&self, id: BatchId, vote: Vote) -> CoreResult<()> {
        let handle = self.batch_handle(id)?;
        let mut batch = handle.lock();
        if batch.state != BatchState::Voting {
            return Err(CoreError::InvalidState(format!(
                "{id} is {}, not voting",
                batch.state
            )));
        }
        let now = self.clock.now();
        let ballot = batch
            .ballot
            .as_mut()
            .ok_or_else(|| CoreError::InvalidState(format!("{id} has no ballot")))?;
        ballot.cast(vote, &self.group, now)
    }

    /// Close the ballot. APPROVED on quorum; otherwise REJECTED, the
    /// transactions go back to the pool and `QuorumNotReached` is returned.
    pub fn tally(&self, id: BatchId) -> CoreResult<Tally> {
        let handle = self.batch_handle(id)?;
        let mut batch = handle.lock();
        if batch.state != BatchState::Voting {
            return Err(CoreError::InvalidState(format!(
                "{id} is {}, not voting",
                batch.state
            )));
        }
        let active = self.active_count();
        let tally = batch
            .ballot
            .as_ref()
            .ok_or_else(|| CoreError::InvalidState(format!("{id} has no ballot")))?
            .tally(&self.group, active, quorum_threshold(active));

        let payload = json!({
            "batch": id.0,
            "approvals": tally.approvals,
            "rejections": tally.rejections,
            "abstentions": tally.abstentions,
            "required": tally.required,
        });

        if tally.approved() {
            batch.transition(BatchState::Approved)?;
            self.persist(Entity::Batch(batch.clone()));
            self.record("batch_approved", payload);
            info!(batch = %id, approvals = tally.approvals, required = tally.required, "batch approved");
            return Ok(tally);
        }

        batch.transition(BatchState::Rejected)?;
        self.persist(Entity::Batch(batch.clone()));
        let requeue = batch.transactions.clone();
        drop(batch);

        for sealed in self.pool.requeue(requeue, self.clock.now())? {
            self.register(sealed);
        }
        self.record("batch_rejected", payload);
        warn!(batch = %id, approvals = tally.approvals, required = tally.required, "quorum not reached");
        Err(CoreError::QuorumNotReached {
            approvals: tally.approvals,
            required: tally.required,
        })
    }

    // -----------------------------------------------------------------------
    // Settlement
    // -----------------------------------------------------------------------

    /// APPROVED → SETTLED: admit every nullifier, or none.
    ///
    /// Idempotent: settling a settled batch is a no-op. On any collision the
    /// batch becomes REJECTED and flagged, colliding transactions go to the
    /// investigation queue, the rest are requeued.
    pub fn settle(&self, id: BatchId) -> CoreResult<Settlement> {
        let handle = self.batch_handle(id)?;
        let mut batch = handle.lock();
        match batch.state {
            BatchState::Settled => {
                debug!(batch = %id, "already settled");
                return Ok(Settlement {
                    batch: id,
                    admitted: 0,
                    already_settled: true,
                });
            }
            BatchState::Approved => {}
            other => {
                return Err(CoreError::InvalidState(format!(
                    "{id} is {other}, only APPROVED batches settle"
                )))
            }
        }

        let now = self.clock.now();
        let bindings: Vec<Digest> = batch
            .transactions
            .iter()
            .map(Transaction::settlement_binding)
            .collect();
        let mut nullifiers = self.nullifiers.lock();
        let collisions = colliding(&batch.transactions, &bindings, &nullifiers);
        if !collisions.is_empty() {
            drop(nullifiers);
            let first = batch.transactions[collisions[0]].nullifier;
            self.quarantine(&mut batch, &collisions, now)?;
            return Err(CoreError::DoubleSpendDetected { nullifier: first });
        }

        let mut ops = Vec::new();
        for (tx, binding) in batch.transactions.iter().zip(&bindings) {
            if let Admission::Admitted(op) = nullifiers.admit(tx.nullifier, *binding)? {
                ops.push(op);
            }
        }
        let state = nullifiers.state();
        drop(nullifiers);

        let admitted = ops.len();
        for op in ops {
            self.persist(Entity::AccumulatorOp(op));
        }
        self.persist(Entity::AccumulatorState(state));

        batch.transition(BatchState::Settled)?;
        batch.settled_at = Some(now);
        self.persist(Entity::Batch(batch.clone()));
        self.record(
            "batch_settled",
            json!({
                "batch": id.0,
                "admitted": admitted,
                "accumulator_version": state.version,
                "merkle_root": batch.merkle_root.map(|r| r.to_hex()),
            }),
        );
        info!(batch = %id, admitted, version = state.version, "batch settled");
        Ok(Settlement {
            batch: id,
            admitted,
            already_settled: false,
        })
    }

    fn quarantine(
        &self,
        batch: &mut Batch,
        collisions: &[usize],
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        batch.transition(BatchState::Rejected)?;
        batch.flagged = true;
        self.persist(Entity::Batch(batch.clone()));

        let flagged: HashSet<usize> = collisions.iter().copied().collect();
        let mut clean = Vec::new();
        let mut nullifiers = Vec::new();
        {
            let mut held = self.investigations.lock();
            for (i, tx) in batch.transactions.iter().enumerate() {
                if flagged.contains(&i) {
                    nullifiers.push(tx.nullifier.to_hex());
                    held.push(Investigation {
                        batch: batch.id,
                        transaction: tx.clone(),
                        flagged_at: now,
                    });
                } else {
                    clean.push(tx.clone());
                }
            }
        }

        let requeued = clean.len();
        for sealed in self.pool.requeue(clean, now)? {
            self.register(sealed);
        }
        self.record(
            "double_spend_detected",
            json!({
                "batch": batch.id.0,
                "nullifiers": nullifiers,
                "quarantined": collisions.len(),
                "requeued": requeued,
            }),
        );
        warn!(
            batch = %batch.id,
            quarantined = collisions.len(),
            requeued,
            "double spend detected; batch rejected and flagged"
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Freeze proposals
    // -----------------------------------------------------------------------

    pub fn propose_freeze(
        &self,
        account: AccountId,
        action: FreezeAction,
        reason: impl Into<String>,
    ) -> CoreResult<ProposalId> {
        if account.as_str().is_empty() || account.as_str().len() > MAX_FIELD_LENGTH {
            return Err(CoreError::MalformedInput(format!(
                "account id must be 1..={MAX_FIELD_LENGTH} bytes"
            )));
        }
        let id = ProposalId(self.next_proposal.fetch_add(1, Ordering::SeqCst));
        let proposal = FreezeProposal::new(id, account, action, reason.into(), self.clock.now());

        self.persist(Entity::FreezeProposal(proposal.clone()));
        self.record(
            "freeze_proposed",
            json!({
                "proposal": id.0,
                "account": proposal.account.as_str(),
                "action": action.to_string(),
                "reason": proposal.reason,
            }),
        );
        info!(proposal = %id, account = %proposal.account, %action, "freeze proposal created");
        self.proposals.insert(id, Arc::new(Mutex::new(proposal)));
        Ok(id)
    }

    /// PROPOSED → VOTING.
    pub fn begin_proposal_voting(&self, id: ProposalId) -> CoreResult<OpenBallot> {
        let handle = self.proposal_handle(id)?;
        let mut proposal = handle.lock();
        if proposal.state != ProposalState::Proposed {
            return Err(CoreError::InvalidState(format!(
                "{id} is {:?}, not proposed",
                proposal.state
            )));
        }
        let (ballot, open) = self.open_ballot(BallotSubject::Proposal {
            id,
            account: proposal.account.clone(),
            action: proposal.action,
        })?;
        proposal.ballot = Some(ballot);
        proposal.state = ProposalState::Voting;
        self.persist(Entity::FreezeProposal(proposal.clone()));
        Ok(open)
    }

    pub fn cast_proposal_vote(&self, id: ProposalId, vote: Vote) -> CoreResult<()> {
        let handle = self.proposal_handle(id)?;
        let mut proposal = handle.lock();
        if proposal.state != ProposalState::Voting {
            return Err(CoreError::InvalidState(format!("{id} is not voting")));
        }
        let now = self.clock.now();
        let ballot = proposal
            .ballot
            .as_mut()
            .ok_or_else(|| CoreError::InvalidState(format!("{id} has no ballot")))?;
        ballot.cast(vote, &self.group, now)
    }

    /// VOTING → APPROVED | REJECTED, same quorum as batches.
    pub fn tally_proposal(&self, id: ProposalId) -> CoreResult<Tally> {
        let handle = self.proposal_handle(id)?;
        let mut proposal = handle.lock();
        if proposal.state != ProposalState::Voting {
            return Err(CoreError::InvalidState(format!("{id} is not voting")));
        }
        let active = self.active_count();
        let tally = proposal
            .ballot
            .as_ref()
            .ok_or_else(|| CoreError::InvalidState(format!("{id} has no ballot")))?
            .tally(&self.group, active, quorum_threshold(active));

        proposal.state = if tally.approved() {
            ProposalState::Approved
        } else {
            ProposalState::Rejected
        };
        self.persist(Entity::FreezeProposal(proposal.clone()));
        self.record(
            if tally.approved() {
                "freeze_proposal_approved"
            } else {
                "freeze_proposal_rejected"
            },
            json!({
                "proposal": id.0,
                "approvals": tally.approvals,
                "required": tally.required,
            }),
        );

        if tally.approved() {
            info!(proposal = %id, approvals = tally.approvals, "freeze proposal approved");
            Ok(tally)
        } else {
            warn!(proposal = %id, approvals = tally.approvals, required = tally.required, "freeze proposal rejected");
            Err(CoreError::QuorumNotReached {
                approvals: tally.approvals,
                required: tally.required,
            })
        }
    }

    /// APPROVED → EXECUTED: the only path that mutates the freeze set.
    pub fn execute_proposal(&self, id: ProposalId) -> CoreResult<()> {
        let handle = self.proposal_handle(id)?;
        let mut proposal = handle.lock();
        if proposal.state != ProposalState::Approved {
            return Err(CoreError::InvalidState(format!(
                "{id} is {:?}, only approved proposals execute",
                proposal.state
            )));
        }

        let account_lock = self.account_lock(&proposal.account);
        let _account = account_lock.lock();

        let approval = FreezeApproval::issue(id, proposal.account.clone(), proposal.action);
        let (op, state) = {
            let mut frozen = self.frozen.lock();
            let op = match approval.action() {
                FreezeAction::Freeze => frozen.admit(&approval)?,
                FreezeAction::Unfreeze => frozen.revoke(&approval)?,
            };
            (op, frozen.state())
        };
        if let Some(op) = op {
            self.persist(Entity::AccumulatorOp(op));
            self.persist(Entity::AccumulatorState(state));
        } else {
            debug!(proposal = %id, "freeze set already in requested state");
        }

        let now = self.clock.now();
        proposal.state = ProposalState::Executed;
        proposal.executed_at = Some(now);
        self.persist(Entity::FreezeProposal(proposal.clone()));
        self.record(
            "freeze_executed",
            json!({
                "proposal": id.0,
                "account": proposal.account.as_str(),
                "action": proposal.action.to_string(),
                "accumulator_version": state.version,
            }),
        );
        info!(proposal = %id, account = %proposal.account, action = %proposal.action, "freeze executed");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Re-verification and economics
    // -----------------------------------------------------------------------

    /// Sample settled, not yet reviewed batches at the configured rate and
    /// review each one.
    pub fn reverify_settled<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        opener: &OpenerKey,
        oracle: &IndependentVerifier,
    ) -> CoreResult<ReverificationReport> {
        let rate = self.config.reverification_rate.clamp(0.0, 1.0);
        let candidates: Vec<BatchId> = self
            .batch_ids()
            .into_iter()
            .filter(|id| {
                self.batch(*id)
                    .map(|b| b.state == BatchState::Settled && !b.reverified)
                    .unwrap_or(false)
            })
            .collect();

        let mut report = ReverificationReport::default();
        for id in candidates {
            if rng.gen_bool(rate) {
                report.reviews.push(self.reverify_batch(id, opener, oracle)?);
            }
        }
        info!(
            sampled = report.sampled(),
            slashes = report.slashes().count(),
            "re-verification pass complete"
        );
        Ok(report)
    }

    /// Open every vote on a settled batch and score it against ground truth.
    pub fn reverify_batch(
        &self,
        id: BatchId,
        opener: &OpenerKey,
        oracle: &IndependentVerifier,
    ) -> CoreResult<BatchReview> {
        let handle = self.batch_handle(id)?;
        let mut batch = handle.lock();
        if batch.state != BatchState::Settled {
            return Err(CoreError::InvalidState(format!(
                "{id} is {}, only settled batches are re-verified",
                batch.state
            )));
        }

        let truth = oracle.ground_truth(&batch);
        let now = self.clock.now();
        let mut review = BatchReview {
            batch: id,
            truth,
            honest: Vec::new(),
            slashed: Vec::new(),
        };
        if batch.reverified {
            return Ok(review);
        }

        let votes = batch
            .ballot
            .as_ref()
            .map(|b| b.votes.clone())
            .unwrap_or_default();
        for vote in votes {
            let member = group::open(&vote.signature, opener, self.audit.as_ref(), now)?;
            if vote.decision == truth {
                self.credit_honest(&member)?;
                review.honest.push(member);
            } else {
                let outcome = self.slash(&member)?;
                review.slashed.push((member, outcome));
            }
        }

        batch.reverified = true;
        self.persist(Entity::Batch(batch.clone()));
        self.record(
            "batch_reverified",
            json!({
                "batch": id.0,
                "truth": truth.to_string(),
                "honest": review.honest.len(),
                "slashed": review.slashed.len(),
            }),
        );
        Ok(review)
    }

    fn credit_honest(&self, id: &MemberId) -> CoreResult<()> {
        let snapshot = {
            let mut members = self.members.write();
            let member = members
                .get_mut(id)
                .ok_or_else(|| CoreError::NotFound(format!("member {id}")))?;
            member.honest_count += 1;
            member.clone()
        };
        self.persist(Entity::Member(snapshot));
        Ok(())
    }

    /// Apply the next penalty in the schedule to `id`.
    pub fn slash(&self, id: &MemberId) -> CoreResult<SlashOutcome> {
        let now = self.clock.now();
        let (outcome, snapshot) = {
            let mut members = self.members.write();
            let member = members
                .get_mut(id)
                .ok_or_else(|| CoreError::NotFound(format!("member {id}")))?;
            let outcome = self
                .treasury
                .lock()
                .slash(member, &self.config.slashing, now);
            (outcome, member.clone())
        };

        self.persist(Entity::TreasuryEntry(outcome.entry.clone()));
        self.persist(Entity::Member(snapshot));
        self.record(
            "member_slashed",
            json!({
                "member": id.as_str(),
                "offense": outcome.entry.reference,
                "penalty_bps": outcome.penalty_bps,
                "amount": outcome.entry.amount,
                "stake_after": outcome.stake_after,
            }),
        );
        if outcome.deactivated {
            self.group.revoke(id)?;
            self.record(
                "member_deactivated",
                json!({ "member": id.as_str(), "stake": outcome.stake_after }),
            );
        }
        Ok(outcome)
    }

    /// Governance action: reactivate `id`. Its current stake becomes the new
    /// baseline for the deactivation floor.
    pub fn reinstate(&self, id: &MemberId) -> CoreResult<()> {
        let snapshot = {
            let mut members = self.members.write();
            let member = members
                .get_mut(id)
                .ok_or_else(|| CoreError::NotFound(format!("member {id}")))?;
            if member.active {
                return Err(CoreError::InvalidState(format!("{id} is already active")));
            }
            member.active = true;
            member.initial_stake = member.stake;
            member.clone()
        };
        self.group.reinstate(id)?;
        self.persist(Entity::Member(snapshot.clone()));
        self.record(
            "member_reinstated",
            json!({ "member": id.as_str(), "stake": snapshot.stake }),
        );
        info!(member = %id, stake = snapshot.stake, "member reinstated");
        Ok(())
    }

    /// Fiscal-year payout of the treasury to active members, proportional
    /// to their honest-verification counts.
    pub fn distribute_treasury(&self, fiscal_year: u64) -> Vec<TreasuryEntry> {
        let now = self.clock.now();
        let (rewards, updated) = {
            let mut members = self.members.write();
            let mut list: Vec<ConsortiumMember> = members.values().cloned().collect();
            let rewards = self.treasury.lock().distribute(&mut list, fiscal_year, now);
            let rewarded: HashSet<&MemberId> = rewards.iter().map(|r| &r.member).collect();
            let updated: Vec<ConsortiumMember> = list
                .into_iter()
                .filter(|m| rewarded.contains(&m.id))
                .collect();
            for m in &updated {
                members.insert(m.id.clone(), m.clone());
            }
            (rewards, updated)
        };

        for entry in &rewards {
            self.persist(Entity::TreasuryEntry(entry.clone()));
        }
        for member in updated {
            self.persist(Entity::Member(member));
        }
        self.record(
            "treasury_distributed",
            json!({
                "fiscal_year": fiscal_year,
                "recipients": rewards.len(),
                "paid": rewards.iter().map(|r| r.amount).sum::<u64>(),
                "retained": self.treasury_balance(),
            }),
        );
        rewards
    }
}
