//! # Devnet Simulation
//!
//! Builds a consortium in-process and drives it through the whole life of
//! a private ledger: proved transfers, anonymous batch votes, settlement,
//! a deliberate double spend, sampled re-verification with slashing, the
//! fiscal-year treasury payout, a consortium freeze and finally a
//! court-ordered decryption of one transfer's payload.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{Datelike, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use shroud_protocol::collab::{
    Ed25519CredentialVerifier, JudgeCredential, Persistence, SystemClock, TracingAuditSink,
};
use shroud_protocol::commitment::{random_salt, CommitmentEngine, TransferRequest};
use shroud_protocol::config::ProtocolConfig;
use shroud_protocol::consensus::{
    run_batch_vote, run_proposal_vote, Collaborators, ConsensusEngine, ConsortiumMember,
    FreezeAction, IndependentVerifier, OpenBallot, Vote, VoteSource,
};
use shroud_protocol::court::CourtAccessOrchestrator;
use shroud_protocol::crypto::keys::ShroudKeypair;
use shroud_protocol::group::{GroupAuthority, MemberSecret};
use shroud_protocol::storage::SledStore;
use shroud_protocol::threshold::{AccessPolicy, ShareSubmission};
use shroud_protocol::zkp::RangeProofProver;
use shroud_protocol::{AccountId, BatchId, CoreError, Decision, MemberId, PartyId};

use crate::cli::SimulateArgs;
use crate::metrics::NodeMetrics;

const MEMBER_STAKE: u64 = 1_000;
const TRANSFER_BOUND: u64 = 100_000;
const ACCOUNTS: u64 = 64;
/// Final flushes attempted before leftover transactions are reported.
const DRAIN_ATTEMPTS: usize = 3;

const KEY_HOLDERS: [&str; 5] = [
    "supreme-court",
    "data-protection-authority",
    "central-bank",
    "financial-intelligence-unit",
    "external-auditor",
];

// ---------------------------------------------------------------------------
// Simulated members
// ---------------------------------------------------------------------------

/// An in-process member answering ballots after a fixed latency.
struct SimulatedMember {
    secret: MemberSecret,
    dishonest: bool,
    latency: Duration,
}

#[async_trait]
impl VoteSource for SimulatedMember {
    async fn vote(&self, ballot: &OpenBallot) -> Option<Vote> {
        tokio::time::sleep(self.latency).await;
        let decision = if self.dishonest {
            Decision::Reject
        } else {
            Decision::Approve
        };
        match ballot.vote(&self.secret, decision) {
            Ok(vote) => Some(vote),
            Err(e) => {
                warn!(member = %self.secret.member(), error = %e, "could not sign ballot");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

fn load_config(path: Option<&Path>) -> Result<ProtocolConfig> {
    let Some(path) = path else {
        return Ok(ProtocolConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

fn open_store(data_dir: Option<&Path>) -> Result<SledStore> {
    match data_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create data directory {}", dir.display()))?;
            SledStore::open(dir.join("db")).context("failed to open sled store")
        }
        None => SledStore::open_temporary().context("failed to open temporary sled store"),
    }
}

/// Counters the summary prints alongside the Prometheus dump.
#[derive(Debug, Default)]
struct Outcome {
    settled_batches: u64,
    rejected_batches: u64,
    admitted: usize,
    double_spends: u64,
}

/// Vote on a sealed batch and settle it when approved.
async fn process_batch(
    engine: &ConsensusEngine,
    id: BatchId,
    sources: &[Arc<dyn VoteSource>],
    metrics: &NodeMetrics,
    outcome: &mut Outcome,
) -> Result<()> {
    let timer = metrics.vote_round_seconds.start_timer();
    let voted = run_batch_vote(engine, id, sources).await;
    timer.observe_duration();

    match voted {
        Ok(tally) => {
            metrics.batches_approved_total.inc();
            info!(batch = %id, approvals = tally.approvals, required = tally.required, "batch approved");
        }
        Err(CoreError::QuorumNotReached { .. }) => {
            metrics.batches_rejected_total.inc();
            outcome.rejected_batches += 1;
            return Ok(());
        }
        Err(e) => return Err(e).with_context(|| format!("vote on {id} failed")),
    }

    match engine.settle(id) {
        Ok(settlement) => {
            metrics.batches_settled_total.inc();
            outcome.settled_batches += 1;
            outcome.admitted += settlement.admitted;
        }
        Err(CoreError::DoubleSpendDetected { .. }) => {
            metrics.double_spends_total.inc();
            outcome.double_spends += 1;
        }
        Err(e) => return Err(e).with_context(|| format!("settlement of {id} failed")),
    }
    Ok(())
}

fn random_transfer(rng: &mut StdRng) -> TransferRequest {
    let sender = format!("acct-{:04}", rng.gen_range(0..ACCOUNTS));
    TransferRequest {
        spend_secret: format!("{sender} wallet key").into_bytes(),
        sender,
        receiver: format!("acct-{:04}", rng.gen_range(0..ACCOUNTS)),
        amount: rng.gen_range(1..=TRANSFER_BOUND),
        bound: TRANSFER_BOUND,
        salt: random_salt().to_vec(),
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run(args: SimulateArgs, metrics: &NodeMetrics) -> Result<()> {
    if args.members == 0 {
        bail!("a consortium needs at least one member");
    }
    if args.dishonest > args.members {
        bail!(
            "--dishonest ({}) exceeds --members ({})",
            args.dishonest,
            args.members
        );
    }

    let config = load_config(args.config.as_deref())?;
    let store = Arc::new(open_store(args.data_dir.as_deref())?);
    let mut rng = StdRng::seed_from_u64(args.seed);

    info!(
        members = args.members,
        dishonest = args.dishonest,
        transactions = args.transactions,
        batch_capacity = config.batch_capacity,
        "setting up consortium"
    );

    let (prover, verifier) =
        RangeProofProver::setup(&mut rng).context("range-proof circuit setup failed")?;
    let verifier = Arc::new(verifier);
    let commitments = CommitmentEngine::new(Arc::new(prover));
    let oracle = IndependentVerifier::new(verifier.clone());

    let ids: Vec<MemberId> = (0..args.members)
        .map(|i| MemberId::new(format!("bank-{i:02}")))
        .collect();
    let (group, secrets, opener) = GroupAuthority::setup(&ids).context("group setup failed")?;

    let audit = Arc::new(TracingAuditSink);
    let clock = Arc::new(SystemClock);
    let engine = Arc::new(
        ConsensusEngine::new(
            config.clone(),
            ids.iter()
                .map(|id| ConsortiumMember::new(id.clone(), MEMBER_STAKE))
                .collect(),
            Arc::new(group),
            verifier,
            Collaborators {
                store: store.clone() as Arc<dyn Persistence>,
                audit: audit.clone(),
                clock: clock.clone(),
            },
        )
        .context("failed to start consensus engine")?,
    );
    metrics.active_members.set(engine.active_count() as i64);

    let vote_ceiling = (config.vote_window().as_millis() as u64 / 4).clamp(1, 25);
    let sources: Vec<Arc<dyn VoteSource>> = secrets
        .into_iter()
        .enumerate()
        .map(|(i, secret)| {
            Arc::new(SimulatedMember {
                secret,
                dishonest: i >= args.members - args.dishonest,
                latency: Duration::from_millis(rng.gen_range(0..vote_ceiling)),
            }) as Arc<dyn VoteSource>
        })
        .collect();

    let holder_keys: Vec<ShroudKeypair> =
        (0..KEY_HOLDERS.len()).map(|_| ShroudKeypair::generate()).collect();
    let holder = |i: usize| (PartyId::new(KEY_HOLDERS[i]), holder_keys[i].public_key());
    let policy = AccessPolicy::escrow(
        vec![holder(0), holder(1)],
        vec![holder(2), holder(3), holder(4)],
    )
    .context("invalid access policy")?;

    let judge_id = PartyId::new("district-court-7");
    let judge = ShroudKeypair::generate();
    let mut credentials = Ed25519CredentialVerifier::new();
    credentials.register(judge_id.clone(), judge.public_key());
    let court = CourtAccessOrchestrator::new(
        &config,
        Arc::new(credentials),
        engine.clone(),
        audit,
        clock,
    );

    // -- transfers -----------------------------------------------------------

    let mut outcome = Outcome::default();
    let mut escrowed = None;
    let mut first_coin = None;

    for n in 0..args.transactions {
        let request = random_transfer(&mut rng);
        let committed = commitments
            .create_transaction(&request)
            .context("failed to commit transfer")?;
        let submission = engine.submit(committed).context("submission refused")?;
        metrics.transactions_submitted_total.inc();

        if n == 0 {
            let subject = AccountId::new(request.sender.clone());
            let payload = format!(
                "from={} to={} amount={}",
                request.sender, request.receiver, request.amount
            );
            let shares = court
                .escrow_payload(
                    submission.transaction_hash,
                    subject.clone(),
                    payload.as_bytes(),
                    policy.clone(),
                )
                .context("payload escrow failed")?;
            escrowed = Some((submission.transaction_hash, subject, shares));
            first_coin = Some(request);
        }

        if let Some(batch) = submission.sealed {
            process_batch(&engine, batch.id, &sources, metrics, &mut outcome).await?;
        }
    }

    // A wallet replaying its first coin: same nullifier, fresh proof.
    if let Some(coin) = &first_coin {
        let respend = commitments
            .create_transaction(coin)
            .context("failed to commit respend")?;
        engine.submit(respend).context("submission refused")?;
        metrics.transactions_submitted_total.inc();
    }

    for _ in 0..DRAIN_ATTEMPTS {
        match engine.flush().context("flush failed")? {
            Some(id) => process_batch(&engine, id, &sources, metrics, &mut outcome).await?,
            None => break,
        }
    }
    if engine.pending() > 0 {
        warn!(pending = engine.pending(), "transactions left in the pool");
    }

    // -- re-verification and economics --------------------------------------

    let report = engine
        .reverify_settled(&mut rng, &opener, &oracle)
        .context("re-verification failed")?;
    metrics.slashes_total.inc_by(report.slashes().count() as u64);
    metrics.active_members.set(engine.active_count() as i64);
    let slashed_into_treasury = engine.treasury_balance();

    let payouts = engine.distribute_treasury(Utc::now().year() as u64);
    metrics.treasury_balance.set(engine.treasury_balance() as i64);

    // -- freeze and court access --------------------------------------------

    let mut court_ok = false;
    if let Some((transaction, subject, shares)) = escrowed {
        let proposal = engine
            .propose_freeze(subject.clone(), FreezeAction::Freeze, "court order 2026/441")
            .context("freeze proposal refused")?;
        let freeze = run_proposal_vote(&engine, proposal, &sources).await;
        match freeze {
            Ok(_) => engine
                .execute_proposal(proposal)
                .context("freeze execution failed")?,
            Err(e) => warn!(account = %subject, error = %e, "freeze not approved"),
        }

        let credential = JudgeCredential::sign(judge_id.clone(), &judge, &transaction);
        match court.request_grant(transaction, &credential, PartyId::new(KEY_HOLDERS[3])) {
            Ok(grant) => {
                let submissions: Vec<ShareSubmission> = [0usize, 1, 3]
                    .iter()
                    .map(|&i| ShareSubmission::sign(shares[i].clone(), &holder_keys[i]))
                    .collect();
                metrics.court_decrypt_attempts_total.inc();
                match court.decrypt(&grant, &submissions) {
                    Ok(plaintext) => {
                        court_ok = true;
                        info!(grant = %grant.id, bytes = plaintext.len(), "court decryption succeeded");
                    }
                    Err(e) => warn!(grant = %grant.id, error = %e, "court decryption failed"),
                }
            }
            Err(e) => warn!(error = %e, "court grant refused"),
        }
    }

    store.flush().context("final store flush failed")?;

    // -- summary --------------------------------------------------------------

    println!("Shroud devnet simulation");
    println!("  members:              {} ({} dishonest)", args.members, args.dishonest);
    println!("  active after review:  {}", engine.active_count());
    println!("  batches settled:      {}", outcome.settled_batches);
    println!("  batches rejected:     {}", outcome.rejected_batches);
    println!("  transactions settled: {}", outcome.admitted);
    println!("  double spends caught: {}", outcome.double_spends);
    println!("  batches re-verified:  {}", report.sampled());
    println!("  slashed into treasury {}", slashed_into_treasury);
    println!("  treasury payouts:     {}", payouts.len());
    println!("  court decryption:     {}", if court_ok { "ok" } else { "failed" });
    println!("  nullifier version:    {}", engine.nullifier_state().version);
    println!();
    print!("{}", metrics.encode().context("failed to encode metrics")?);
    Ok(())
}
