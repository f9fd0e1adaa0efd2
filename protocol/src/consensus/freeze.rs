//! Freeze proposals and the approval token that gates the freeze
//! accumulator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::vote::Ballot;
use crate::types::{AccountId, ProposalId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FreezeAction {
    Freeze,
    Unfreeze,
}

impl FreezeAction {
    pub(crate) fn tag(self) -> u8 {
        match self {
            Self::Freeze => 1,
            Self::Unfreeze => 2,
        }
    }
}

impl fmt::Display for FreezeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Freeze => write!(f, "freeze"),
            Self::Unfreeze => write!(f, "unfreeze"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalState {
    Proposed,
    Voting,
    Approved,
    Rejected,
    Executed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreezeProposal {
    pub id: ProposalId,
    pub account: AccountId,
    pub action: FreezeAction,
    pub reason: String,
    pub state: ProposalState,
    pub ballot: Option<Ballot>,
    pub proposed_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
}

impl FreezeProposal {
    pub fn new(
        id: ProposalId,
        account: AccountId,
        action: FreezeAction,
        reason: String,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            account,
            action,
            reason,
            state: ProposalState::Proposed,
            ballot: None,
            proposed_at: at,
            executed_at: None,
        }
    }
}

/// Proof that a freeze or unfreeze proposal reached quorum.
///
/// Only the consensus module can mint one, and the freeze accumulator's
/// mutators accept nothing else.
#[derive(Debug)]
pub struct FreezeApproval {
    proposal: ProposalId,
    account: AccountId,
    action: FreezeAction,
}

impl FreezeApproval {
    pub(in crate::consensus) fn issue(
        proposal: ProposalId,
        account: AccountId,
        action: FreezeAction,
    ) -> Self {
        Self {
            proposal,
            account,
            action,
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests(proposal: ProposalId, account: AccountId, action: FreezeAction) -> Self {
        Self::issue(proposal, account, action)
    }

    pub fn proposal(&self) -> ProposalId {
        self.proposal
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }

    pub fn action(&self) -> FreezeAction {
        self.action
    }
}
