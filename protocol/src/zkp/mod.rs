//! # Range Proofs
//!
//! Every transaction carries a proof that its hidden amount lies in
//! `(0, bound]`, where the bound (a balance or limit) is hidden too. The
//! rest of the core only sees the [`RangeProver`] / [`RangeVerifier`] seam;
//! the shipped backend is Groth16 over BN254.
//!
//! ```text
//! pedersen.rs  — scalar commitments to value and bound
//! circuit.rs   — R1CS: two openings + two 64-bit decompositions
//! prover.rs    — setup and proof generation (RangeProofProver)
//! verifier.rs  — proof verification (RangeProofVerifier)
//! ```
//!
//! Each proof uses fresh blindings and fresh Groth16 randomness, so two
//! proofs of the same `(value, bound)` share no bytes. Verification takes
//! only the proof and a public context; hidden values never reach it.

pub mod circuit;
pub mod pedersen;
pub mod prover;
pub mod verifier;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreResult;

pub use circuit::RangeProofCircuit;
pub use pedersen::PedersenParams;
pub use prover::RangeProofProver;
pub use verifier::RangeProofVerifier;

// ---------------------------------------------------------------------------
// Interface
// ---------------------------------------------------------------------------

/// Produces range proofs for `0 < value ≤ bound`.
///
/// `context` is public data the proof is bound to (the transaction
/// commitment); a proof never verifies under a different context.
pub trait RangeProver: Send + Sync {
    fn prove(&self, value: u64, bound: u64, context: &[u8]) -> CoreResult<RangeProof>;
}

/// Checks range proofs. Malformed proofs are `false`, never an error.
pub trait RangeVerifier: Send + Sync {
    fn verify(&self, proof: &RangeProof, context: &[u8]) -> bool;
}

// ---------------------------------------------------------------------------
// RangeProof
// ---------------------------------------------------------------------------

/// Opaque proof blob carried on a transaction.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeProof {
    bytes: Vec<u8>,
}

impl RangeProof {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for RangeProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RangeProof({} bytes)", self.bytes.len())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use ark_std::rand::{rngs::StdRng, SeedableRng};
    use std::sync::OnceLock;

    /// One CRS per test binary; setup dominates proving time in debug builds.
    pub(crate) fn shared_backend() -> &'static (RangeProofProver, RangeProofVerifier) {
        static BACKEND: OnceLock<(RangeProofProver, RangeProofVerifier)> = OnceLock::new();
        BACKEND.get_or_init(|| {
            let mut rng = StdRng::seed_from_u64(42);
            RangeProofProver::setup(&mut rng).unwrap()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::testing::shared_backend;
    use super::*;

    #[test]
    fn end_to_end_range_proof() {
        let (prover, verifier) = shared_backend();
        let proof = prover.prove(250, 1_000, b"tx-commitment").unwrap();
        assert!(verifier.verify(&proof, b"tx-commitment"));
    }

    #[test]
    fn proofs_of_same_statement_are_unlinkable() {
        let (prover, verifier) = shared_backend();
        let a = prover.prove(42, 100, b"ctx").unwrap();
        let b = prover.prove(42, 100, b"ctx").unwrap();
        assert_ne!(a, b);
        assert!(verifier.verify(&a, b"ctx"));
        assert!(verifier.verify(&b, b"ctx"));
    }

    #[test]
    fn proof_does_not_transfer_to_other_context() {
        let (prover, verifier) = shared_backend();
        let proof = prover.prove(5, 10, b"tx-a").unwrap();
        assert!(!verifier.verify(&proof, b"tx-b"));
    }

    #[test]
    fn out_of_range_statement_refused() {
        let (prover, _) = shared_backend();
        assert!(prover.prove(0, 10, b"ctx").is_err());
        assert!(prover.prove(11, 10, b"ctx").is_err());
    }

    #[test]
    fn garbage_blob_is_false() {
        let (_, verifier) = shared_backend();
        assert!(!verifier.verify(&RangeProof::from_bytes(vec![1, 2, 3]), b"ctx"));
        assert!(!verifier.verify(&RangeProof::from_bytes(Vec::new()), b"ctx"));
    }
}
