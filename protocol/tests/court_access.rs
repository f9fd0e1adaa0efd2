//! Court access end to end: escrow at submission, consortium freeze, judge
//! grant, threshold decryption, and the hard 24-hour expiry.

use std::sync::Arc;

use chrono::{Duration, Utc};

use shroud_protocol::collab::{
    Ed25519CredentialVerifier, JudgeCredential, ManualClock, MemoryAuditLog, MemoryStore,
};
use shroud_protocol::commitment::CommittedTransaction;
use shroud_protocol::config::ProtocolConfig;
use shroud_protocol::consensus::{
    Collaborators, ConsensusEngine, ConsortiumMember, FreezeAction,
};
use shroud_protocol::court::CourtAccessOrchestrator;
use shroud_protocol::crypto::hash::sha256;
use shroud_protocol::crypto::keys::ShroudKeypair;
use shroud_protocol::group::{GroupAuthority, MemberSecret};
use shroud_protocol::threshold::{AccessPolicy, ShareSubmission, ThresholdShare};
use shroud_protocol::zkp::{RangeProof, RangeVerifier};
use shroud_protocol::{AccountId, CoreError, Decision, MemberId, PartyId};

/// Accepts every proof; range proofs are covered by the lifecycle tests.
struct AcceptAll;

impl RangeVerifier for AcceptAll {
    fn verify(&self, _proof: &RangeProof, _context: &[u8]) -> bool {
        true
    }
}

const HOLDERS: [&str; 5] = [
    "supreme-court",
    "data-protection-authority",
    "central-bank",
    "financial-intelligence-unit",
    "external-auditor",
];

struct World {
    engine: Arc<ConsensusEngine>,
    court: CourtAccessOrchestrator,
    secrets: Vec<MemberSecret>,
    holder_keys: Vec<ShroudKeypair>,
    shares: Vec<ThresholdShare>,
    judge: ShroudKeypair,
    audit: Arc<MemoryAuditLog>,
    clock: Arc<ManualClock>,
    tx: shroud_protocol::Digest,
    subject: AccountId,
}

impl World {
    fn submissions(&self, which: &[usize]) -> Vec<ShareSubmission> {
        which
            .iter()
            .map(|&i| ShareSubmission::sign(self.shares[i].clone(), &self.holder_keys[i]))
            .collect()
    }

    fn credential(&self) -> JudgeCredential {
        JudgeCredential::sign(PartyId::new("district-court-3"), &self.judge, &self.tx)
    }

    fn freeze_subject(&self) {
        let id = self
            .engine
            .propose_freeze(self.subject.clone(), FreezeAction::Freeze, "court order 2026/118")
            .unwrap();
        let ballot = self.engine.begin_proposal_voting(id).unwrap();
        for secret in &self.secrets {
            let vote = ballot.vote(secret, Decision::Approve).unwrap();
            self.engine.cast_proposal_vote(id, vote).unwrap();
        }
        self.engine.tally_proposal(id).unwrap();
        self.engine.execute_proposal(id).unwrap();
    }
}

fn world() -> World {
    let ids: Vec<MemberId> = (0..3).map(|i| MemberId::new(format!("bank-{i}"))).collect();
    let (group, secrets, _) = GroupAuthority::setup(&ids).unwrap();
    let audit = Arc::new(MemoryAuditLog::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let config = ProtocolConfig::default();

    let engine = Arc::new(
        ConsensusEngine::new(
            config.clone(),
            ids.iter().map(|id| ConsortiumMember::new(id.clone(), 1_000)).collect(),
            Arc::new(group),
            Arc::new(AcceptAll),
            Collaborators {
                store: Arc::new(MemoryStore::new()),
                audit: audit.clone(),
                clock: clock.clone(),
            },
        )
        .unwrap(),
    );

    let judge = ShroudKeypair::generate();
    let mut credentials = Ed25519CredentialVerifier::new();
    credentials.register(PartyId::new("district-court-3"), judge.public_key());

    let court = CourtAccessOrchestrator::new(
        &config,
        Arc::new(credentials),
        engine.clone(),
        audit.clone(),
        clock.clone(),
    );

    let holder_keys: Vec<ShroudKeypair> = (0..5).map(|_| ShroudKeypair::generate()).collect();
    let holder = |i: usize| (PartyId::new(HOLDERS[i]), holder_keys[i].public_key());
    let policy = AccessPolicy::escrow(
        vec![holder(0), holder(1)],
        vec![holder(2), holder(3), holder(4)],
    )
    .unwrap();

    let submitted = engine
        .submit(CommittedTransaction {
            commitment: sha256(b"commitment"),
            nullifier: sha256(b"nullifier"),
            range_proof: RangeProof::from_bytes(vec![0; 8]),
        })
        .unwrap();
    let subject = AccountId::new("acct-5531");
    let shares = court
        .escrow_payload(
            submitted.transaction_hash,
            subject.clone(),
            b"from=acct-5531 to=acct-0042 amount=125000",
            policy,
        )
        .unwrap();

    World {
        engine,
        court,
        secrets,
        holder_keys,
        shares,
        judge,
        audit,
        clock,
        tx: submitted.transaction_hash,
        subject,
    }
}

#[test]
fn frozen_subject_decrypts_with_mandatory_pair_and_named_alternate() {
    let w = world();
    w.freeze_subject();

    let grant = w
        .court
        .request_grant(w.tx, &w.credential(), PartyId::new(HOLDERS[3]))
        .unwrap();
    let plaintext = w.court.decrypt(&grant, &w.submissions(&[0, 1, 3])).unwrap();
    assert_eq!(plaintext, b"from=acct-5531 to=acct-0042 amount=125000");

    let issued = w.audit.events_of("court_grant_issued");
    assert_eq!(issued.len(), 1);
    assert_eq!(issued[0].data["alternate"], HOLDERS[3]);
}

#[test]
fn grant_refused_until_consortium_freezes_subject() {
    let w = world();
    assert!(w
        .court
        .request_grant(w.tx, &w.credential(), PartyId::new(HOLDERS[2]))
        .is_err());
    w.freeze_subject();
    assert!(w
        .court
        .request_grant(w.tx, &w.credential(), PartyId::new(HOLDERS[2]))
        .is_ok());
}

#[test]
fn one_second_past_expiry_fails_even_with_valid_shares() {
    let w = world();
    w.freeze_subject();
    let grant = w
        .court
        .request_grant(w.tx, &w.credential(), PartyId::new(HOLDERS[4]))
        .unwrap();

    w.clock.set(grant.expires_at + Duration::seconds(1));
    let err = w.court.decrypt(&grant, &w.submissions(&[0, 1, 4])).unwrap_err();
    assert!(matches!(err, CoreError::GrantExpired { .. }));
}

#[test]
fn three_alternates_never_unlock() {
    let w = world();
    w.freeze_subject();
    let grant = w
        .court
        .request_grant(w.tx, &w.credential(), PartyId::new(HOLDERS[2]))
        .unwrap();
    let err = w.court.decrypt(&grant, &w.submissions(&[2, 3, 4])).unwrap_err();
    assert!(matches!(err, CoreError::AccessStructureViolation(_)));

    let attempts = w.audit.events_of("court_decrypt_attempt");
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].data["success"], false);
}
