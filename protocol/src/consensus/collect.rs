//! Concurrent vote collection.
//!
//! Every active member is asked for its vote in parallel. A member that
//! does not answer inside the voting window abstains; the round closes on
//! the deadline no matter who is still thinking.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::engine::ConsensusEngine;
use super::vote::{OpenBallot, Tally, Vote};
use crate::error::CoreResult;
use crate::types::{BatchId, ProposalId};

/// One consortium member's voting endpoint.
#[async_trait]
pub trait VoteSource: Send + Sync {
    /// `None` means the member abstains.
    async fn vote(&self, ballot: &OpenBallot) -> Option<Vote>;
}

/// Ask every source concurrently and keep what arrives before `window`.
pub async fn collect_votes(
    sources: &[Arc<dyn VoteSource>],
    ballot: &OpenBallot,
    window: Duration,
) -> Vec<Vote> {
    let mut tasks = JoinSet::new();
    for source in sources {
        let source = Arc::clone(source);
        let ballot = ballot.clone();
        tasks.spawn(async move { tokio::time::timeout(window, source.vote(&ballot)).await });
    }

    let mut votes = Vec::with_capacity(sources.len());
    let mut abstained = 0usize;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(Some(vote))) => votes.push(vote),
            Ok(Ok(None)) => abstained += 1,
            Ok(Err(_elapsed)) => {
                abstained += 1;
                debug!(round = %ballot.round, "member timed out; counted as abstention");
            }
            Err(e) => {
                abstained += 1;
                warn!(round = %ballot.round, error = %e, "vote task failed");
            }
        }
    }
    debug!(round = %ballot.round, received = votes.len(), abstained, "votes collected");
    votes
}

/// Open voting on a sealed batch, collect, cast and tally.
pub async fn run_batch_vote(
    engine: &ConsensusEngine,
    id: BatchId,
    sources: &[Arc<dyn VoteSource>],
) -> CoreResult<Tally> {
    let ballot = engine.begin_voting(id)?;
    let votes = collect_votes(sources, &ballot, engine.config().vote_window()).await;
    for vote in votes {
        if let Err(e) = engine.cast_vote(id, vote) {
            warn!(batch = %id, error = %e, "vote refused");
        }
    }
    engine.tally(id)
}

/// Same flow for a freeze proposal.
pub async fn run_proposal_vote(
    engine: &ConsensusEngine,
    id: ProposalId,
    sources: &[Arc<dyn VoteSource>],
) -> CoreResult<Tally> {
    let ballot = engine.begin_proposal_voting(id)?;
    let votes = collect_votes(sources, &ballot, engine.config().vote_window()).await;
    for vote in votes {
        if let Err(e) = engine.cast_proposal_vote(id, vote) {
            warn!(proposal = %id, error = %e, "vote refused");
        }
    }
    engine.tally_proposal(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::vote::BallotSubject;
    use crate::group::{GroupAuthority, MemberSecret, RoundId};
    use crate::types::{Decision, Digest, MemberId};

    struct Honest(MemberSecret);

    #[async_trait]
    impl VoteSource for Honest {
        async fn vote(&self, ballot: &OpenBallot) -> Option<Vote> {
            ballot.vote(&self.0, Decision::Approve).ok()
        }
    }

    struct Asleep;

    #[async_trait]
    impl VoteSource for Asleep {
        async fn vote(&self, _ballot: &OpenBallot) -> Option<Vote> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            None
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_members_abstain() {
        let ids: Vec<_> = (0..3).map(|i| MemberId::new(format!("m{i}"))).collect();
        let (group, mut secrets, _) = GroupAuthority::setup(&ids).unwrap();
        let roster = group.open_round(RoundId(1)).unwrap();
        let ballot = OpenBallot {
            round: RoundId(1),
            subject: BallotSubject::Batch {
                id: BatchId(0),
                merkle_root: Digest::new([1; 32]),
            },
            roster,
            closes_at: chrono::Utc::now(),
        };

        let sources: Vec<Arc<dyn VoteSource>> = vec![
            Arc::new(Honest(secrets.remove(0))),
            Arc::new(Asleep),
            Arc::new(Honest(secrets.remove(0))),
        ];
        let votes = collect_votes(&sources, &ballot, Duration::from_secs(10)).await;
        assert_eq!(votes.len(), 2);
        assert!(votes.iter().all(|v| v.decision == Decision::Approve));
    }
}
