//! # Accumulator Registry
//!
//! Two sets with O(1) membership checks:
//!
//! - [`NullifierAccumulator`]: append-only. Each nullifier is bound to the
//!   hash of the transaction that spent it, which makes re-admission by the
//!   same transaction a no-op and admission by any other transaction a
//!   double spend. `revoke` always fails.
//! - [`FreezeAccumulator`]: frozen accounts. Both mutators demand a
//!   [`FreezeApproval`], which only the consensus engine can mint after a
//!   proposal reaches quorum. There is no other way to mutate it.
//!
//! Each set carries an [`AccumulatorState`]: a hash chain
//! `value' = H(value ‖ kind ‖ op ‖ element)` plus a version counter. The
//! chain commits to the full mutation history; [`NullifierAccumulator::restore`]
//! and [`FreezeAccumulator::restore`] replay a persisted log and refuse it
//! unless the replay passes through the persisted state.
//!
//! Neither type locks internally. The consensus engine keeps each behind
//! its own mutex so mutations on the same set never overlap.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::config::DOMAIN_ACCUMULATOR;
use crate::consensus::freeze::{FreezeAction, FreezeApproval};
use crate::crypto::hash::{domain_separated_hash_multi, sha256_framed};
use crate::error::{CoreError, CoreResult};
use crate::types::{AccountId, Digest};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccumulatorKind {
    Nullifier,
    Freeze,
}

impl AccumulatorKind {
    fn tag(self) -> u8 {
        match self {
            Self::Nullifier => 1,
            Self::Freeze => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Nullifier => "nullifier",
            Self::Freeze => "freeze",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccumulatorOpKind {
    Admit,
    Revoke,
}

impl AccumulatorOpKind {
    fn tag(self) -> u8 {
        match self {
            Self::Admit => 1,
            Self::Revoke => 2,
        }
    }
}

/// Fixed-width accumulator value plus a monotonically increasing version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulatorState {
    pub kind: AccumulatorKind,
    pub value: Digest,
    pub version: u64,
}

impl AccumulatorState {
    pub fn genesis(kind: AccumulatorKind) -> Self {
        Self {
            kind,
            value: Digest::ZERO,
            version: 0,
        }
    }

    fn advance(&mut self, op: AccumulatorOpKind, element: &Digest) {
        self.value = Digest::new(domain_separated_hash_multi(
            DOMAIN_ACCUMULATOR,
            &[
                self.value.as_bytes(),
                &[self.kind.tag(), op.tag()],
                element.as_bytes(),
            ],
        ));
        self.version += 1;
    }
}

/// One entry of the mutation log. `version` is the state version *after*
/// the operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulatorOp {
    pub kind: AccumulatorKind,
    pub version: u64,
    pub op: AccumulatorOpKind,
    pub element: Digest,
    /// Transaction hash for nullifiers.
    pub binding: Option<Digest>,
}

/// Read side shared by both variants.
pub trait Accumulator {
    fn contains(&self, element: &Digest) -> bool;
    fn state(&self) -> AccumulatorState;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn replay_mismatch(kind: AccumulatorKind, detail: &str) -> CoreError {
    warn!(accumulator = kind.label(), detail, "accumulator log rejected");
    CoreError::InvalidState(format!("{} accumulator log: {detail}", kind.label()))
}

// ---------------------------------------------------------------------------
// Nullifiers
// ---------------------------------------------------------------------------

/// Outcome of [`NullifierAccumulator::admit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Admitted(AccumulatorOp),
    /// Already admitted under the same binding (a settlement replay).
    AlreadyPresent,
}

#[derive(Debug, Clone)]
pub struct NullifierAccumulator {
    state: AccumulatorState,
    spent: HashMap<Digest, Digest>,
}

impl Default for NullifierAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl NullifierAccumulator {
    pub fn new() -> Self {
        Self {
            state: AccumulatorState::genesis(AccumulatorKind::Nullifier),
            spent: HashMap::new(),
        }
    }

    /// Would admitting `nullifier` under `binding` succeed? Never mutates.
    pub fn check(&self, nullifier: &Digest, binding: &Digest) -> CoreResult<()> {
        match self.spent.get(nullifier) {
            Some(bound) if bound != binding => Err(CoreError::DoubleSpendDetected {
                nullifier: *nullifier,
            }),
            _ => Ok(()),
        }
    }

    /// Admit `nullifier` as spent under `binding`, the settlement binding
    /// of one sequenced transaction. Idempotent per binding.
    pub fn admit(&mut self, nullifier: Digest, binding: Digest) -> CoreResult<Admission> {
        self.check(&nullifier, &binding)?;
        if self.spent.contains_key(&nullifier) {
            debug!(%nullifier, "nullifier re-admitted under the same binding");
            return Ok(Admission::AlreadyPresent);
        }

        self.spent.insert(nullifier, binding);
        self.state.advance(AccumulatorOpKind::Admit, &nullifier);
        Ok(Admission::Admitted(AccumulatorOp {
            kind: AccumulatorKind::Nullifier,
            version: self.state.version,
            op: AccumulatorOpKind::Admit,
            element: nullifier,
            binding: Some(binding),
        }))
    }

    /// Nullifiers are never un-spent.
    pub fn revoke(&mut self, _nullifier: &Digest) -> CoreResult<()> {
        Err(CoreError::UnsupportedOperation(
            "nullifier accumulator is append-only",
        ))
    }

    /// Settlement binding that spent `nullifier`, if any.
    pub fn spent_by(&self, nullifier: &Digest) -> Option<&Digest> {
        self.spent.get(nullifier)
    }

    /// Rebuild from a persisted log. The replay must pass through
    /// `expected`; it may run past it when a crash hit between writing an
    /// op and writing the state.
    pub fn restore(expected: AccumulatorState, log: &[AccumulatorOp]) -> CoreResult<Self> {
        let mut acc = Self::new();
        let mut reached = acc.state == expected;
        for entry in log {
            let (AccumulatorOpKind::Admit, Some(binding)) = (entry.op, entry.binding) else {
                return Err(replay_mismatch(
                    AccumulatorKind::Nullifier,
                    "entry is not a bound admission",
                ));
            };
            acc.admit(entry.element, binding)?;
            if acc.state.version != entry.version {
                return Err(replay_mismatch(AccumulatorKind::Nullifier, "version gap"));
            }
            reached |= acc.state == expected;
        }
        if !reached {
            return Err(replay_mismatch(
                AccumulatorKind::Nullifier,
                "replay never reaches the persisted state",
            ));
        }
        if acc.state != expected {
            debug!(
                persisted = expected.version,
                replayed = acc.state.version,
                "nullifier log runs ahead of persisted state"
            );
        }
        Ok(acc)
    }
}

impl Accumulator for NullifierAccumulator {
    fn contains(&self, element: &Digest) -> bool {
        self.spent.contains_key(element)
    }

    fn state(&self) -> AccumulatorState {
        self.state
    }

    fn len(&self) -> usize {
        self.spent.len()
    }
}

// ---------------------------------------------------------------------------
// Frozen accounts
// ---------------------------------------------------------------------------

/// Accumulator element for an account identifier.
pub fn account_element(account: &AccountId) -> Digest {
    sha256_framed(&[b"account", account.as_str().as_bytes()])
}

#[derive(Debug, Clone)]
pub struct FreezeAccumulator {
    state: AccumulatorState,
    frozen: HashSet<Digest>,
}

impl Default for FreezeAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl FreezeAccumulator {
    pub fn new() -> Self {
        Self {
            state: AccumulatorState::genesis(AccumulatorKind::Freeze),
            frozen: HashSet::new(),
        }
    }

    pub fn is_frozen(&self, account: &AccountId) -> bool {
        self.frozen.contains(&account_element(account))
    }

    /// Freeze the approved account. `None` if it was already frozen.
    pub fn admit(&mut self, approval: &FreezeApproval) -> CoreResult<Option<AccumulatorOp>> {
        if approval.action() != FreezeAction::Freeze {
            return Err(CoreError::InvalidState(format!(
                "{} approves an unfreeze, not a freeze",
                approval.proposal()
            )));
        }
        let element = account_element(approval.account());
        Ok(self.apply(AccumulatorOpKind::Admit, element))
    }

    /// Unfreeze the approved account. `None` if it was not frozen.
    pub fn revoke(&mut self, approval: &FreezeApproval) -> CoreResult<Option<AccumulatorOp>> {
        if approval.action() != FreezeAction::Unfreeze {
            return Err(CoreError::InvalidState(format!(
                "{} approves a freeze, not an unfreeze",
                approval.proposal()
            )));
        }
        let element = account_element(approval.account());
        Ok(self.apply(AccumulatorOpKind::Revoke, element))
    }

    fn apply(&mut self, op: AccumulatorOpKind, element: Digest) -> Option<AccumulatorOp> {
        let changed = match op {
            AccumulatorOpKind::Admit => self.frozen.insert(element),
            AccumulatorOpKind::Revoke => self.frozen.remove(&element),
        };
        if !changed {
            return None;
        }
        self.state.advance(op, &element);
        Some(AccumulatorOp {
            kind: AccumulatorKind::Freeze,
            version: self.state.version,
            op,
            element,
            binding: None,
        })
    }

    /// Rebuild from a persisted log of quorum-approved operations. Same
    /// prefix rule as [`NullifierAccumulator::restore`].
    pub fn restore(expected: AccumulatorState, log: &[AccumulatorOp]) -> CoreResult<Self> {
        let mut acc = Self::new();
        let mut reached = acc.state == expected;
        for entry in log {
            if acc.apply(entry.op, entry.element).is_none() {
                return Err(replay_mismatch(AccumulatorKind::Freeze, "no-op entry in log"));
            }
            if acc.state.version != entry.version {
                return Err(replay_mismatch(AccumulatorKind::Freeze, "version gap"));
            }
            reached |= acc.state == expected;
        }
        if !reached {
            return Err(replay_mismatch(
                AccumulatorKind::Freeze,
                "replay never reaches the persisted state",
            ));
        }
        Ok(acc)
    }
}

impl Accumulator for FreezeAccumulator {
    fn contains(&self, element: &Digest) -> bool {
        self.frozen.contains(element)
    }

    fn state(&self) -> AccumulatorState {
        self.state
    }

    fn len(&self) -> usize {
        self.frozen.len()
    }
}
