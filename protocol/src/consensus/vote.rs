//! Anonymous ballots.
//!
//! A [`Ballot`] belongs to one voting round and one subject (a batch or a
//! freeze proposal). Each [`Vote`] carries a group signature over
//! `H(subject ‖ round ‖ decision)`. The engine only ever learns that *some*
//! roster member signed; two votes with the same round pseudonym are the
//! same member and the second is refused.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::freeze::FreezeAction;
use crate::config::DOMAIN_BALLOT;
use crate::crypto::hash::domain_separated_hash_multi;
use crate::error::{CoreError, CoreResult};
use crate::group::{sign, GroupAuthority, GroupSignature, MemberSecret, Roster, RoundId};
use crate::types::{AccountId, BatchId, Decision, Digest, ProposalId};

/// What a ballot decides on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BallotSubject {
    Batch {
        id: BatchId,
        merkle_root: Digest,
    },
    Proposal {
        id: ProposalId,
        account: AccountId,
        action: FreezeAction,
    },
}

impl BallotSubject {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64);
        match self {
            Self::Batch { id, merkle_root } => {
                out.push(1);
                out.extend_from_slice(&id.0.to_be_bytes());
                out.extend_from_slice(merkle_root.as_bytes());
            }
            Self::Proposal {
                id,
                account,
                action,
            } => {
                out.push(2);
                out.extend_from_slice(&id.0.to_be_bytes());
                out.push(action.tag());
                out.extend_from_slice(&(account.as_str().len() as u32).to_be_bytes());
                out.extend_from_slice(account.as_str().as_bytes());
            }
        }
        out
    }
}

/// The message a member signs to cast `decision`.
pub fn ballot_message(subject: &BallotSubject, round: RoundId, decision: Decision) -> [u8; 32] {
    domain_separated_hash_multi(
        DOMAIN_BALLOT,
        &[
            &subject.encode(),
            &round.0.to_be_bytes(),
            &[decision.tag()],
        ],
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub decision: Decision,
    pub signature: GroupSignature,
}

/// What voters need to cast a vote: the round's roster and the subject.
#[derive(Debug, Clone)]
pub struct OpenBallot {
    pub round: RoundId,
    pub subject: BallotSubject,
    pub roster: Arc<Roster>,
    pub closes_at: DateTime<Utc>,
}

impl OpenBallot {
    /// Sign `decision` anonymously as the holder of `secret`.
    pub fn vote(&self, secret: &MemberSecret, decision: Decision) -> CoreResult<Vote> {
        let message = ballot_message(&self.subject, self.round, decision);
        Ok(Vote {
            decision,
            signature: sign(&message, secret, &self.roster)?,
        })
    }
}

/// Counted outcome of a ballot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub approvals: usize,
    pub rejections: usize,
    pub abstentions: usize,
    pub required: usize,
}

impl Tally {
    pub fn approved(&self) -> bool {
        self.approvals >= self.required
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ballot {
    pub round: RoundId,
    pub subject: BallotSubject,
    pub votes: Vec<Vote>,
    pub opened_at: DateTime<Utc>,
    pub closes_at: DateTime<Utc>,
}

impl Ballot {
    pub fn new(
        round: RoundId,
        subject: BallotSubject,
        opened_at: DateTime<Utc>,
        closes_at: DateTime<Utc>,
    ) -> Self {
        Self {
            round,
            subject,
            votes: Vec::new(),
            opened_at,
            closes_at,
        }
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        now < self.closes_at
    }

    /// Accept `vote` if its signature verifies for this round and subject
    /// and its pseudonym has not voted yet.
    pub fn cast(
        &mut self,
        vote: Vote,
        group: &GroupAuthority,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        if !self.is_open(now) {
            return Err(CoreError::InvalidState(format!(
                "voting window for {} closed at {}",
                self.round, self.closes_at
            )));
        }
        if vote.signature.round != self.round {
            return Err(CoreError::GroupSignature(format!(
                "vote signed for {}, ballot is {}",
                vote.signature.round, self.round
            )));
        }
        let message = ballot_message(&self.subject, self.round, vote.decision);
        if !group.verify(&message, &vote.signature) {
            return Err(CoreError::GroupSignature(
                "vote signature does not verify".into(),
            ));
        }
        if !group.is_active_pseudonym(self.round, &vote.signature.pseudonym) {
            return Err(CoreError::GroupSignature(format!(
                "voter revoked since {} opened",
                self.round
            )));
        }
        if self
            .votes
            .iter()
            .any(|v| v.signature.pseudonym == vote.signature.pseudonym)
        {
            return Err(CoreError::InvalidState(format!(
                "duplicate vote in {}",
                self.round
            )));
        }
        self.votes.push(vote);
        Ok(())
    }

    /// Count votes against `active_members`; anyone who did not vote abstains.
    /// Votes cast by a member revoked after casting are not counted.
    pub fn tally(&self, group: &GroupAuthority, active_members: usize, required: usize) -> Tally {
        let counted: Vec<&Vote> = self
            .votes
            .iter()
            .filter(|v| group.is_active_pseudonym(self.round, &v.signature.pseudonym))
            .collect();
        let approvals = counted
            .iter()
            .filter(|v| v.decision == Decision::Approve)
            .count();
        Tally {
            approvals,
            rejections: counted.len() - approvals,
            abstentions: active_members.saturating_sub(counted.len()),
            required,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::quorum_threshold;
    use crate::types::MemberId;

    fn setup(n: usize) -> (GroupAuthority, Vec<MemberSecret>) {
        let ids: Vec<_> = (0..n).map(|i| MemberId::new(format!("m{i}"))).collect();
        let (authority, secrets, _) = GroupAuthority::setup(&ids).unwrap();
        (authority, secrets)
    }

    fn subject() -> BallotSubject {
        BallotSubject::Batch {
            id: BatchId(1),
            merkle_root: Digest::new([9; 32]),
        }
    }

    fn vote(
        group: &GroupAuthority,
        secret: &MemberSecret,
        ballot: &Ballot,
        decision: Decision,
    ) -> Vote {
        let roster = group.open_round(ballot.round).unwrap();
        let msg = ballot_message(&ballot.subject, ballot.round, decision);
        Vote {
            decision,
            signature: sign(&msg, secret, &roster).unwrap(),
        }
    }

    fn open_ballot() -> Ballot {
        let now = Utc::now();
        Ballot::new(RoundId(1), subject(), now, now + chrono::Duration::seconds(10))
    }

    #[test]
    fn nine_of_twelve_approves() {
        let (group, secrets) = setup(12);
        let mut ballot = open_ballot();
        for (i, s) in secrets.iter().enumerate() {
            let d = if i < 9 { Decision::Approve } else { Decision::Reject };
            ballot.cast(vote(&group, s, &ballot, d), &group, Utc::now()).unwrap();
        }
        let tally = ballot.tally(&group, 12, quorum_threshold(12));
        assert_eq!(tally.approvals, 9);
        assert!(tally.approved());
    }

    #[test]
    fn seven_of_twelve_fails() {
        let (group, secrets) = setup(12);
        let mut ballot = open_ballot();
        for (i, s) in secrets.iter().enumerate() {
            let d = if i < 7 { Decision::Approve } else { Decision::Reject };
            ballot.cast(vote(&group, s, &ballot, d), &group, Utc::now()).unwrap();
        }
        assert!(!ballot.tally(&group, 12, quorum_threshold(12)).approved());
    }

    #[test]
    fn abstentions_counted_from_missing_votes() {
        let (group, secrets) = setup(4);
        let mut ballot = open_ballot();
        ballot
            .cast(vote(&group, &secrets[0], &ballot, Decision::Approve), &group, Utc::now())
            .unwrap();
        let tally = ballot.tally(&group, 4, quorum_threshold(4));
        assert_eq!(tally.abstentions, 3);
        assert_eq!(tally.rejections, 0);
    }

    #[test]
    fn revoked_voter_is_refused_and_not_counted() {
        let (group, secrets) = setup(4);
        let mut ballot = open_ballot();
        for s in &secrets[..2] {
            ballot
                .cast(vote(&group, s, &ballot, Decision::Approve), &group, Utc::now())
                .unwrap();
        }
        let late = vote(&group, &secrets[2], &ballot, Decision::Approve);

        group.revoke(secrets[1].member()).unwrap();
        group.revoke(secrets[2].member()).unwrap();
        assert!(matches!(
            ballot.cast(late, &group, Utc::now()),
            Err(CoreError::GroupSignature(_))
        ));

        let tally = ballot.tally(&group, 2, quorum_threshold(2));
        assert_eq!(ballot.votes.len(), 2);
        assert_eq!(tally.approvals, 1);
        assert_eq!(tally.abstentions, 1);
        assert!(!tally.approved());
    }

    #[test]
    fn duplicate_pseudonym_refused() {
        let (group, secrets) = setup(3);
        let mut ballot = open_ballot();
        ballot
            .cast(vote(&group, &secrets[0], &ballot, Decision::Approve), &group, Utc::now())
            .unwrap();
        let again = vote(&group, &secrets[0], &ballot, Decision::Reject);
        assert!(ballot.cast(again, &group, Utc::now()).is_err());
        assert_eq!(ballot.votes.len(), 1);
    }

    #[test]
    fn decision_cannot_be_flipped_in_transit() {
        let (group, secrets) = setup(3);
        let mut ballot = open_ballot();
        let mut v = vote(&group, &secrets[1], &ballot, Decision::Reject);
        v.decision = Decision::Approve;
        assert!(matches!(
            ballot.cast(v, &group, Utc::now()),
            Err(CoreError::GroupSignature(_))
        ));
    }

    #[test]
    fn vote_for_other_subject_refused() {
        let (group, secrets) = setup(3);
        let mut ballot = open_ballot();
        let mut other = open_ballot();
        other.subject = BallotSubject::Batch {
            id: BatchId(2),
            merkle_root: Digest::new([9; 32]),
        };
        let v = vote(&group, &secrets[0], &other, Decision::Approve);
        assert!(ballot.cast(v, &group, Utc::now()).is_err());
    }

    #[test]
    fn closed_window_refuses_votes() {
        let (group, secrets) = setup(2);
        let mut ballot = open_ballot();
        let v = vote(&group, &secrets[0], &ballot, Decision::Approve);
        let late = ballot.closes_at;
        assert!(matches!(
            ballot.cast(v, &group, late),
            Err(CoreError::InvalidState(_))
        ));
    }

    #[test]
    fn ballot_survives_bincode() {
        let (group, secrets) = setup(2);
        let mut ballot = open_ballot();
        ballot
            .cast(vote(&group, &secrets[0], &ballot, Decision::Approve), &group, Utc::now())
            .unwrap();
        let bytes = bincode::serialize(&ballot).unwrap();
        let back: Ballot = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back.votes, ballot.votes);
        assert_eq!(back.subject, ballot.subject);
    }
}
