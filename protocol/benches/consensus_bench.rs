// Benchmarks for the Shroud core hot paths.
//
// Covers Merkle sealing at batch capacity, threshold key reconstruction
// through the policy gate, anonymous ballot casting and tallying, and
// range-proof verification.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::SeedableRng;

use chrono::{Duration, Utc};
use shroud_protocol::batch::MerkleTree;
use shroud_protocol::config::quorum_threshold;
use shroud_protocol::consensus::{ballot_message, Ballot, BallotSubject, Vote};
use shroud_protocol::crypto::hash::sha256;
use shroud_protocol::crypto::keys::ShroudKeypair;
use shroud_protocol::group::{sign, GroupAuthority, RoundId};
use shroud_protocol::threshold::{reconstruct, split, AccessPolicy, ShareSubmission};
use shroud_protocol::zkp::{RangeProofProver, RangeProver, RangeVerifier};
use shroud_protocol::{BatchId, Decision, Digest, MemberId, PartyId};

fn bench_merkle_seal(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch/merkle_seal");
    for n in [10usize, 100, 1_000] {
        let leaves: Vec<Digest> = (0..n as u64).map(|i| sha256(&i.to_be_bytes())).collect();
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &leaves, |b, leaves| {
            b.iter(|| MerkleTree::seal(leaves).unwrap());
        });
    }
    group.finish();
}

fn bench_reconstruct(c: &mut Criterion) {
    let keys: Vec<ShroudKeypair> = (0..5u8)
        .map(|i| ShroudKeypair::from_seed(&[i + 1; 32]))
        .collect();
    let holder = |i: usize| (PartyId::new(format!("holder-{i}")), keys[i].public_key());
    let policy = AccessPolicy::escrow(
        vec![holder(0), holder(1)],
        vec![holder(2), holder(3), holder(4)],
    )
    .unwrap();
    let shares = split(&[0x5a; 32], &policy).unwrap();
    let submissions: Vec<ShareSubmission> = [0usize, 1, 3]
        .iter()
        .map(|&i| ShareSubmission::sign(shares[i].clone(), &keys[i]))
        .collect();

    c.bench_function("threshold/reconstruct_2_plus_1", |b| {
        b.iter(|| reconstruct(&policy, &submissions).unwrap());
    });
}

fn bench_tally(c: &mut Criterion) {
    let mut group = c.benchmark_group("consensus/cast_and_tally");
    for n in [4usize, 12, 32] {
        let ids: Vec<MemberId> = (0..n).map(|i| MemberId::new(format!("m{i}"))).collect();
        let (authority, secrets, _) = GroupAuthority::setup(&ids).unwrap();
        let round = RoundId(1);
        let roster = authority.open_round(round).unwrap();
        let subject = BallotSubject::Batch {
            id: BatchId(1),
            merkle_root: sha256(b"root"),
        };
        let message = ballot_message(&subject, round, Decision::Approve);
        let votes: Vec<Vote> = secrets
            .iter()
            .map(|s| Vote {
                decision: Decision::Approve,
                signature: sign(&message, s, &roster).unwrap(),
            })
            .collect();

        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &votes, |b, votes| {
            b.iter(|| {
                let now = Utc::now();
                let mut ballot = Ballot::new(round, subject.clone(), now, now + Duration::hours(1));
                for vote in votes {
                    ballot.cast(vote.clone(), &authority, now).unwrap();
                }
                ballot.tally(&authority, n, quorum_threshold(n))
            });
        });
    }
    group.finish();
}

fn bench_range_verify(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    let (prover, verifier) = RangeProofProver::setup(&mut rng).unwrap();
    let proof = prover.prove(1_500, 10_000, b"bench context").unwrap();

    c.bench_function("zkp/range_verify", |b| {
        b.iter(|| assert!(verifier.verify(&proof, b"bench context")));
    });
}

criterion_group!(
    benches,
    bench_merkle_seal,
    bench_reconstruct,
    bench_tally,
    bench_range_verify,
);
criterion_main!(benches);
